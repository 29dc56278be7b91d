//! In-process host heap.
//!
//! A small mark-and-sweep object store implementing [`Host`]. Embedders
//! without an external VM use it directly; everything else uses it to
//! exercise the runtime against a collector that actually frees objects.
use std::{fmt::Write as _, sync::Arc};

use bitflags::bitflags;
use log::{debug, trace};

use crate::{
    ExceptionClass, FrameDescriptor, FrameHeader, HandleSet, Host,
    InternedStrings, LineTable, SymbolId, Value, Visitable, Visitor,
    visitor::Marker,
};

// TODO: add generational settings once frames and constants move to a
// pinned region, they dominate every mark phase
#[derive(Debug, Clone)]
pub struct HeapCreateInfo {
    /// Object slots reserved up front.
    pub initial_capacity: usize,
    /// Collect before an allocation once this many objects were allocated
    /// since the last collection. `None` collects only on request.
    pub collect_threshold: Option<usize>,
}

impl Default for HeapCreateInfo {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            collect_threshold: None,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        const MARK = 1 << 0;
        const ROOT = 1 << 1;
    }
}

/// A plain object with scripted conversion behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub class: SymbolId,
    /// What `to_s` returns, the default rendering when absent.
    pub to_s: Option<Value>,
    /// What implicit array conversion returns, no conversion when absent.
    pub to_ary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapObject {
    String(String),
    Array(Vec<Value>),
    /// Insertion ordered.
    Hash(Vec<(Value, Value)>),
    Exception { class: ExceptionClass, message: Value },
    Frame(Box<FrameDescriptor>),
    Instance(Instance),
}

#[derive(Debug)]
struct HeapEntry {
    object: HeapObject,
    flags: ObjectFlags,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: usize,
    pub collections: usize,
    pub freed: usize,
    pub to_s_calls: usize,
}

#[derive(Debug)]
pub struct Heap {
    entries: Vec<Option<HeapEntry>>,
    free_list: Vec<u32>,
    roots: Vec<Value>,
    handles: HandleSet,
    strings: InternedStrings,
    collect_threshold: Option<usize>,
    since_collection: usize,
    stats: HeapStats,
}

impl Visitable for HeapObject {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        match self {
            HeapObject::String(_) => (),
            HeapObject::Array(elements) => {
                elements.iter().for_each(|&value| visitor.visit(value))
            }
            HeapObject::Hash(pairs) => pairs.iter().for_each(|&(k, v)| {
                visitor.visit(k);
                visitor.visit(v);
            }),
            HeapObject::Exception { message, .. } => visitor.visit(*message),
            HeapObject::Frame(frame) => frame.visit_edges(visitor),
            HeapObject::Instance(instance) => {
                if let Some(to_s) = instance.to_s {
                    visitor.visit(to_s);
                }
                if let Some(to_ary) = instance.to_ary {
                    visitor.visit(to_ary);
                }
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapCreateInfo::default())
    }
}

impl Heap {
    pub fn new(info: HeapCreateInfo) -> Self {
        Self::with_strings(info, InternedStrings::new())
    }

    /// Heap sharing an existing symbol table.
    pub fn with_strings(
        info: HeapCreateInfo,
        strings: InternedStrings,
    ) -> Self {
        Self {
            entries: Vec::with_capacity(info.initial_capacity),
            free_list: Vec::new(),
            roots: Vec::new(),
            handles: HandleSet::new(),
            strings,
            collect_threshold: info.collect_threshold,
            since_collection: 0,
            stats: HeapStats::default(),
        }
    }

    pub fn strings(&self) -> &InternedStrings {
        &self.strings
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub fn allocate(&mut self, object: HeapObject) -> Value {
        if self
            .collect_threshold
            .is_some_and(|threshold| self.since_collection >= threshold)
        {
            // the new object is not reachable yet, its edges are
            self.collect_inner(Some(&object));
        }

        self.since_collection += 1;
        self.stats.allocations += 1;

        let entry = HeapEntry {
            object,
            flags: ObjectFlags::empty(),
        };

        if let Some(index) = self.free_list.pop() {
            self.entries[index as usize] = Some(entry);
            Value::from_index(index)
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Some(entry));
            Value::from_index(index)
        }
    }

    pub fn get(&self, value: Value) -> Option<&HeapObject> {
        let index = value.as_index()?;
        self.entries
            .get(index)?
            .as_ref()
            .map(|entry| &entry.object)
    }

    pub fn get_mut(&mut self, value: Value) -> Option<&mut HeapObject> {
        let index = value.as_index()?;
        self.entries
            .get_mut(index)?
            .as_mut()
            .map(|entry| &mut entry.object)
    }

    /// Immediates are always live, references until they are swept.
    pub fn is_live(&self, value: Value) -> bool {
        !value.is_reference() || self.get(value).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Full stop-the-world collection. Roots are the registered permanent
    /// roots and every value in a live handle scope.
    pub fn collect(&mut self) {
        self.collect_inner(None);
    }

    fn collect_inner(&mut self, pending: Option<&HeapObject>) {
        let mut marker = Marker::default();
        for &root in &self.roots {
            marker.visit(root);
        }
        self.handles.visit_edges(&mut marker);
        if let Some(object) = pending {
            object.visit_edges(&mut marker);
        }

        while let Some(value) = marker.worklist.pop() {
            let Some(index) = value.as_index() else {
                continue;
            };
            let Some(Some(entry)) = self.entries.get_mut(index) else {
                continue;
            };
            if entry.flags.contains(ObjectFlags::MARK) {
                continue;
            }
            entry.flags.insert(ObjectFlags::MARK);
            entry.object.visit_edges(&mut marker);
        }

        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            match slot {
                Some(entry) if entry.flags.contains(ObjectFlags::MARK) => {
                    entry.flags.remove(ObjectFlags::MARK);
                }
                Some(_) => {
                    *slot = None;
                    self.free_list.push(index as u32);
                    freed += 1;
                }
                None => (),
            }
        }

        self.since_collection = 0;
        self.stats.collections += 1;
        self.stats.freed += freed;
        debug!(
            "collection #{} freed {} objects, {} live, {} roots",
            self.stats.collections,
            freed,
            self.live_count(),
            self.roots.len()
        );
    }

    pub fn new_hash(&mut self, pairs: &[(Value, Value)]) -> Value {
        self.allocate(HeapObject::Hash(pairs.to_vec()))
    }

    /// Insert or replace `key`. Does nothing if `hash` is not a hash.
    pub fn hash_insert(&mut self, hash: Value, key: Value, value: Value) {
        let existing = self.hash_position(hash, key);
        let Some(HeapObject::Hash(pairs)) = self.get_mut(hash) else {
            debug_assert!(false, "hash_insert on a non-hash");
            return;
        };
        match existing {
            Some(index) => pairs[index].1 = value,
            None => pairs.push((key, value)),
        }
    }

    pub fn hash_get(&self, hash: Value, key: Value) -> Option<Value> {
        let index = self.hash_position(hash, key)?;
        match self.get(hash) {
            Some(HeapObject::Hash(pairs)) => Some(pairs[index].1),
            _ => None,
        }
    }

    pub fn hash_len(&self, hash: Value) -> Option<usize> {
        match self.get(hash) {
            Some(HeapObject::Hash(pairs)) => Some(pairs.len()),
            _ => None,
        }
    }

    fn hash_position(&self, hash: Value, key: Value) -> Option<usize> {
        match self.get(hash) {
            Some(HeapObject::Hash(pairs)) => {
                pairs.iter().position(|&(k, _)| self.keys_eql(k, key))
            }
            _ => None,
        }
    }

    fn keys_eql(&self, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        match (self.string_value(a), self.string_value(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn new_instance(&mut self, class: &str) -> Value {
        let class = self.strings.add(class);
        self.allocate(HeapObject::Instance(Instance {
            class,
            to_s: None,
            to_ary: None,
        }))
    }

    pub fn set_to_s(&mut self, instance: Value, to_s: Value) {
        if let Some(HeapObject::Instance(instance)) = self.get_mut(instance) {
            instance.to_s = Some(to_s);
        }
    }

    pub fn set_to_ary(&mut self, instance: Value, to_ary: Value) {
        if let Some(HeapObject::Instance(instance)) = self.get_mut(instance) {
            instance.to_ary = Some(to_ary);
        }
    }

    pub fn exception_class(&self, value: Value) -> Option<ExceptionClass> {
        match self.get(value) {
            Some(HeapObject::Exception { class, .. }) => Some(*class),
            _ => None,
        }
    }

    pub fn exception_message(&self, value: Value) -> Option<&str> {
        match self.get(value) {
            Some(HeapObject::Exception { message, .. }) => {
                self.string_value(*message)
            }
            _ => None,
        }
    }

    fn frame_mut(&mut self, frame: Value) -> Option<&mut FrameDescriptor> {
        match self.get_mut(frame) {
            Some(HeapObject::Frame(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    fn symbol_text(&self, id: SymbolId) -> Arc<str> {
        self.strings.get(id).unwrap_or_else(|| Arc::from(""))
    }

    fn to_s_text(&self, value: Value) -> String {
        if let Some(n) = value.as_fixnum() {
            return n.to_string();
        }
        if let Some(id) = value.as_symbol() {
            return self.symbol_text(id).to_string();
        }
        match value {
            Value::NIL => return String::new(),
            Value::TRUE => return "true".to_string(),
            Value::FALSE => return "false".to_string(),
            Value::UNDEF => return "undef".to_string(),
            _ => (),
        }
        match self.get(value) {
            Some(HeapObject::String(text)) => text.clone(),
            Some(HeapObject::Exception { message, .. }) => {
                self.to_s_text(*message)
            }
            Some(HeapObject::Instance(_)) => {
                format!("#<{}>", self.class_name(value))
            }
            _ => self.inspect(value),
        }
    }

    fn inspect_into(
        &self,
        value: Value,
        out: &mut String,
        seen: &mut Vec<Value>,
    ) {
        if let Some(n) = value.as_fixnum() {
            let _ = write!(out, "{n}");
            return;
        }
        if let Some(id) = value.as_symbol() {
            let _ = write!(out, ":{}", self.symbol_text(id));
            return;
        }
        match value {
            Value::NIL => return out.push_str("nil"),
            Value::TRUE => return out.push_str("true"),
            Value::FALSE => return out.push_str("false"),
            Value::UNDEF => return out.push_str("undef"),
            _ => (),
        }

        let Some(object) = self.get(value) else {
            return out.push_str("#<freed>");
        };
        match object {
            HeapObject::String(text) => {
                let _ = write!(out, "{text:?}");
            }
            HeapObject::Array(elements) => {
                if seen.contains(&value) {
                    return out.push_str("[...]");
                }
                seen.push(value);
                out.push('[');
                for (i, &element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.inspect_into(element, out, seen);
                }
                out.push(']');
                seen.pop();
            }
            HeapObject::Hash(pairs) => {
                if seen.contains(&value) {
                    return out.push_str("{...}");
                }
                seen.push(value);
                out.push('{');
                for (i, &(k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.inspect_into(k, out, seen);
                    out.push_str("=>");
                    self.inspect_into(v, out, seen);
                }
                out.push('}');
                seen.pop();
            }
            HeapObject::Exception { class, message } => {
                let _ = write!(out, "#<{class}: {}>", self.to_s_text(*message));
            }
            HeapObject::Frame(frame) => {
                let _ = write!(
                    out,
                    "<InstructionSequence:{}@{}:{}>",
                    self.to_s_text(frame.header.name),
                    self.to_s_text(frame.header.path),
                    frame.lines.first_line().unwrap_or(0)
                );
            }
            HeapObject::Instance(instance) => {
                let _ = write!(out, "#<{}>", self.symbol_text(instance.class));
            }
        }
    }
}

impl Host for Heap {
    fn handles(&self) -> &HandleSet {
        &self.handles
    }

    fn register_root(&mut self, value: Value) {
        let Some(index) = value.as_index() else {
            return;
        };
        let Some(Some(entry)) = self.entries.get_mut(index) else {
            debug_assert!(false, "registering a dead object as root");
            return;
        };
        if entry.flags.contains(ObjectFlags::ROOT) {
            return;
        }
        entry.flags.insert(ObjectFlags::ROOT);
        self.roots.push(value);
        trace!("registered root {value:?}");
    }

    fn intern(&self, name: &str) -> SymbolId {
        self.strings.add(name)
    }

    fn symbol_name(&self, id: SymbolId) -> Option<Arc<str>> {
        self.strings.get(id)
    }

    fn construct_frame(&mut self, header: FrameHeader) -> Value {
        self.allocate(HeapObject::Frame(Box::new(FrameDescriptor::new(header))))
    }

    fn set_line_table(&mut self, frame: Value, table: LineTable) {
        if let Some(descriptor) = self.frame_mut(frame) {
            descriptor.lines = table;
        }
    }

    fn set_local_table(&mut self, frame: Value, locals: Vec<SymbolId>) {
        if let Some(descriptor) = self.frame_mut(frame) {
            descriptor.locals = locals;
        }
    }

    fn set_stack_max(&mut self, frame: Value, stack_max: usize) {
        if let Some(descriptor) = self.frame_mut(frame) {
            descriptor.stack_max = stack_max;
        }
    }

    fn frame(&self, frame: Value) -> Option<&FrameDescriptor> {
        match self.get(frame) {
            Some(HeapObject::Frame(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    fn new_array(&mut self, elements: &[Value]) -> Value {
        self.allocate(HeapObject::Array(elements.to_vec()))
    }

    fn array_push(&mut self, array: Value, value: Value) {
        match self.get_mut(array) {
            Some(HeapObject::Array(elements)) => elements.push(value),
            _ => debug_assert!(false, "array_push on a non-array"),
        }
    }

    fn array_elements(&self, value: Value) -> Option<&[Value]> {
        match self.get(value) {
            Some(HeapObject::Array(elements)) => Some(elements),
            _ => None,
        }
    }

    fn check_array_type(&mut self, value: Value) -> Option<Value> {
        match self.get(value)? {
            HeapObject::Array(_) => Some(value),
            HeapObject::Instance(Instance {
                to_ary: Some(converted),
                ..
            }) => {
                let converted = *converted;
                self.is_array(converted).then_some(converted)
            }
            _ => None,
        }
    }

    fn is_hash(&self, value: Value) -> bool {
        matches!(self.get(value), Some(HeapObject::Hash(_)))
    }

    fn hash_dup(&mut self, hash: Value) -> Option<Value> {
        let pairs = match self.get(hash) {
            Some(HeapObject::Hash(pairs)) => pairs.clone(),
            _ => return None,
        };
        Some(self.allocate(HeapObject::Hash(pairs)))
    }

    fn hash_keys(&mut self, hash: Value) -> Option<Value> {
        let keys = match self.get(hash) {
            Some(HeapObject::Hash(pairs)) => {
                pairs.iter().map(|&(k, _)| k).collect()
            }
            _ => return None,
        };
        Some(self.allocate(HeapObject::Array(keys)))
    }

    fn new_string(&mut self, text: &str) -> Value {
        self.allocate(HeapObject::String(text.to_owned()))
    }

    fn string_value(&self, value: Value) -> Option<&str> {
        match self.get(value) {
            Some(HeapObject::String(text)) => Some(text),
            _ => None,
        }
    }

    fn string_concat(&mut self, parts: &[Value]) -> Value {
        let mut text = String::new();
        for &part in parts {
            match self.string_value(part) {
                Some(part) => text.push_str(part),
                None => text.push_str(&self.to_s_text(part)),
            }
        }
        self.new_string(&text)
    }

    fn call_to_s(&mut self, value: Value) -> Value {
        self.stats.to_s_calls += 1;
        match self.get(value) {
            Some(HeapObject::String(_)) => return value,
            Some(HeapObject::Instance(Instance {
                to_s: Some(result), ..
            })) => return *result,
            _ => (),
        }
        let text = self.to_s_text(value);
        self.new_string(&text)
    }

    fn any_to_s(&mut self, value: Value) -> Value {
        let text = format!("#<{}>", self.class_name(value));
        self.new_string(&text)
    }

    fn class_name(&self, value: Value) -> String {
        if value.is_fixnum() {
            return "Integer".to_string();
        }
        if value.is_symbol() {
            return "Symbol".to_string();
        }
        match value {
            Value::NIL => return "NilClass".to_string(),
            Value::TRUE => return "TrueClass".to_string(),
            Value::FALSE => return "FalseClass".to_string(),
            Value::UNDEF => return "undef".to_string(),
            _ => (),
        }
        match self.get(value) {
            Some(HeapObject::String(_)) => "String".to_string(),
            Some(HeapObject::Array(_)) => "Array".to_string(),
            Some(HeapObject::Hash(_)) => "Hash".to_string(),
            Some(HeapObject::Exception { class, .. }) => {
                class.name().to_string()
            }
            Some(HeapObject::Frame(_)) => "InstructionSequence".to_string(),
            Some(HeapObject::Instance(instance)) => {
                self.symbol_text(instance.class).to_string()
            }
            None => "freed".to_string(),
        }
    }

    fn inspect(&self, value: Value) -> String {
        let mut out = String::new();
        self.inspect_into(value, &mut out, &mut Vec::new());
        out
    }

    fn new_exception(&mut self, class: ExceptionClass, message: &str) -> Value {
        let mut scope = self.handles.scope();
        let message = scope.promote(self.new_string(message));
        self.allocate(HeapObject::Exception { class, message })
    }
}
