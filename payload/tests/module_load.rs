use payload::{
    Arity, ExceptionClass, FrameKind, Heap, HeapCreateInfo, Host, Runtime,
    RuntimeCreateInfo, SharedRuntime, Value, backtrace, expand_splat,
    raise_extra_keywords, string_interpolate,
};

fn runtime() -> Runtime<Heap> {
    payload::init_logging();
    Runtime::with_heap(RuntimeCreateInfo {
        heap: HeapCreateInfo {
            // small enough that most steps below trigger a collection
            collect_threshold: Some(4),
            ..Default::default()
        },
        trace_frames: true,
    })
}

fn rooted_string(runtime: &mut Runtime<Heap>, text: &str) -> Value {
    let heap = runtime.host_mut();
    let value = heap.new_string(text);
    heap.register_root(value);
    value
}

#[test]
fn load_a_compiled_module() {
    let mut runtime = runtime();

    let real_path = runtime.host_mut().new_string("/app/lib/greeter.rb");
    let load = runtime.begin_load(real_path).expect("load");

    // constants
    let greeting = runtime.host_mut().new_string("hello");
    let greeting_index = runtime.register_constant(greeting);
    let heap = runtime.host_mut();
    let key = Value::symbol(heap.intern("greeting"));
    let template = heap.new_hash(&[(key, Value::from_fixnum(1))]);
    let template_index = runtime.register_constant(template);

    // frames
    let path = rooted_string(&mut runtime, "lib/greeter.rb");
    let top_name = rooted_string(&mut runtime, "<top (required)>");
    let method_name = rooted_string(&mut runtime, "greet");
    let rescue_name = rooted_string(&mut runtime, "rescue in greet");
    let heap = runtime.host_mut();
    let top_symbol = heap.intern("<top (required)>");
    let method_symbol = heap.intern("Greeter#greet");
    let locals = [heap.intern("name"), heap.intern("punctuation")];

    let top = runtime
        .allocate_frame(&load.frame_info(
            FrameKind::Top,
            top_name,
            top_symbol,
            path,
            1..=20,
        ))
        .expect("top");
    let method = runtime
        .allocate_frame(
            &load
                .frame_info(
                    FrameKind::Method,
                    method_name,
                    method_symbol,
                    path,
                    4..=12,
                )
                .with_parent(top)
                .with_locals(&locals)
                .with_stack_max(3),
        )
        .expect("method");
    let rescue = runtime
        .allocate_frame(
            &load
                .frame_info(
                    FrameKind::Rescue,
                    rescue_name,
                    method_symbol,
                    path,
                    9..=11,
                )
                .with_parent(method)
                .with_locals(&locals),
        )
        .expect("rescue");
    drop(load);

    // calls into the loaded code
    Arity::range(1, 2).check(1).expect("arity");
    let world = runtime.host_mut().new_string("world");
    let fetched = runtime.fetch_constant(greeting_index).expect("constant");
    let heap = runtime.host_mut();
    let parts = [fetched, world, Value::from_fixnum(3)];
    let message = string_interpolate(heap, &parts);
    heap.register_root(message);

    let copy = runtime.duplicate_hash(template_index).expect("hash");
    let heap = runtime.host_mut();
    heap.hash_insert(copy, key, Value::from_fixnum(2));
    let splat = expand_splat(heap, copy, 1, 1);
    heap.register_root(splat);

    heap.collect();

    // everything reachable from roots survived
    assert_eq!(heap.string_value(message), Some("helloworld3"));
    assert_eq!(heap.hash_get(template, key), Some(Value::from_fixnum(1)));
    insta::assert_snapshot!(heap.inspect(splat), @"[{:greeting=>2}, nil]");
    assert_eq!(heap.string_value(real_path), Some("/app/lib/greeter.rb"));

    let locals = &heap.frame(method).expect("method").locals;
    assert_eq!(locals.len(), 2);
    assert_eq!(heap.frame(rescue).expect("rescue").locals.len(), 1);

    let trace: Vec<String> = backtrace(&*heap, rescue, 1)
        .iter()
        .map(ToString::to_string)
        .collect();
    insta::assert_snapshot!(trace.join("\n"), @r"
    /app/lib/greeter.rb:10:in 'rescue in greet'
    /app/lib/greeter.rb:4:in 'greet'
    /app/lib/greeter.rb:1:in '<top (required)>'
    ");

    let stats = runtime.stats();
    assert_eq!(stats.constants, 2);
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.frame_lines, 20 + 9 + 3);
}

#[test]
fn failures_become_host_exceptions() {
    let mut runtime = runtime();
    let heap = runtime.host_mut();
    let stray = Value::symbol(heap.intern("colour"));
    let extra = heap.new_hash(&[(stray, Value::TRUE)]);

    let errors = [
        Arity::exact(2).check(0).unwrap_err(),
        raise_extra_keywords(heap, extra).unwrap_err(),
        runtime.begin_load(Value::NIL).unwrap_err(),
        runtime.fetch_constant(0).unwrap_err(),
    ];

    let heap = runtime.host_mut();
    let rendered: Vec<String> = errors
        .iter()
        .map(|error| {
            let exception = error.to_exception(heap);
            heap.inspect(exception)
        })
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    #<ArgumentError: wrong number of arguments (given 0, expected 2)>
    #<ArgumentError: unknown keywords: [:colour]>
    #<RuntimeError: Invalid realpath when loading compiled module>
    #<IndexError: 0 is out of bounds for the constant table (0)>
    ");
    assert_eq!(errors[0].exception_class(), ExceptionClass::ArgumentError);
}

#[test]
fn concurrent_loads_finish_in_any_order() {
    let shared = SharedRuntime::new(runtime());

    let begin = |path: &str| {
        shared.with(|runtime| {
            let real_path = runtime.host_mut().new_string(path);
            runtime.begin_load(real_path).expect("load")
        })
    };
    let first = begin("/app/lib/first.rb");
    let second = begin("/app/lib/second.rb");
    let first_path = first.real_path();

    drop(first);
    shared.with(|runtime| {
        let heap = runtime.host_mut();
        heap.collect();
        assert!(!heap.is_live(first_path));
        assert_eq!(
            heap.string_value(second.real_path()),
            Some("/app/lib/second.rb")
        );
    });

    let second_path = second.real_path();
    drop(second);
    shared.with(|runtime| {
        let heap = runtime.host_mut();
        heap.collect();
        assert!(!heap.is_live(second_path));
        assert_eq!(heap.handles().pinned_len(), 0);
    });
}
