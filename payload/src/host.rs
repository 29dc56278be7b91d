use std::sync::Arc;

use crate::{
    ExceptionClass, FrameDescriptor, FrameHeader, HandleScope, HandleSet,
    LineTable, Pinned, SymbolId, Value,
};

/// Capabilities this layer needs from the host VM.
///
/// Everything the frame synthesizer writes and everything the adapters read
/// goes through this trait, so no knowledge of the host's object layouts is
/// required beyond implementing it. [`crate::Heap`] is the in-process
/// implementation.
///
/// Methods that allocate may trigger a collection. Values the caller holds
/// only in native locals must be promoted into a [`HandleScope`] or
/// [`Pinned`] first.
pub trait Host {
    // roots

    /// Stack of keep-alive slots the collector traces.
    fn handles(&self) -> &HandleSet;

    /// Register `value` as a permanent root. Registering twice is a no-op.
    fn register_root(&mut self, value: Value);

    // symbols

    fn intern(&self, name: &str) -> SymbolId;
    fn symbol_name(&self, id: SymbolId) -> Option<Arc<str>>;

    // frames

    /// Allocate an empty frame object (no lines, no locals).
    fn construct_frame(&mut self, header: FrameHeader) -> Value;
    fn set_line_table(&mut self, frame: Value, table: LineTable);
    fn set_local_table(&mut self, frame: Value, locals: Vec<SymbolId>);
    fn set_stack_max(&mut self, frame: Value, stack_max: usize);
    fn frame(&self, frame: Value) -> Option<&FrameDescriptor>;

    // arrays

    fn new_array(&mut self, elements: &[Value]) -> Value;
    fn array_push(&mut self, array: Value, value: Value);
    fn array_elements(&self, value: Value) -> Option<&[Value]>;

    /// Implicit sequence conversion: the array `value` converts to, if any.
    fn check_array_type(&mut self, value: Value) -> Option<Value>;

    // hashes

    fn is_hash(&self, value: Value) -> bool;
    /// Shallow copy, `None` when `hash` is not a hash.
    fn hash_dup(&mut self, hash: Value) -> Option<Value>;
    /// New array of the keys in insertion order.
    fn hash_keys(&mut self, hash: Value) -> Option<Value>;

    // strings

    fn new_string(&mut self, text: &str) -> Value;
    fn string_value(&self, value: Value) -> Option<&str>;
    /// New string made of `parts`, which must all be strings.
    fn string_concat(&mut self, parts: &[Value]) -> Value;

    // conversion protocol

    /// Dispatch the host's `to_s`. The result is not guaranteed to be a string.
    fn call_to_s(&mut self, value: Value) -> Value;
    /// Default rendering, `#<ClassName>`.
    fn any_to_s(&mut self, value: Value) -> Value;
    fn class_name(&self, value: Value) -> String;
    fn inspect(&self, value: Value) -> String;

    // exceptions

    fn new_exception(&mut self, class: ExceptionClass, message: &str) -> Value;

    fn handle_scope(&self) -> HandleScope {
        self.handles().scope()
    }

    fn pin(&self, value: Value) -> Pinned {
        self.handles().pin(value)
    }

    fn is_array(&self, value: Value) -> bool {
        self.array_elements(value).is_some()
    }

    fn is_string(&self, value: Value) -> bool {
        self.string_value(value).is_some()
    }

    /// `to_s` with the host's fallback for results that are not strings.
    fn as_string(&mut self, value: Value) -> Value {
        if self.is_string(value) {
            return value;
        }
        let rendered = self.call_to_s(value);
        if self.is_string(rendered) {
            rendered
        } else {
            self.any_to_s(value)
        }
    }

    /// Rendered form of `value` as a native string.
    fn render(&mut self, value: Value) -> String {
        let rendered = self.as_string(value);
        self.string_value(rendered).unwrap_or_default().to_owned()
    }
}
