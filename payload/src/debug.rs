//! Renderers for log lines and interactive debugging sessions.
use crate::{Host, SymbolId, Value};

/// Name of `id`, or a placeholder if the host does not know it.
pub fn debug_symbol<H: Host>(host: &H, id: SymbolId) -> String {
    match host.symbol_name(id) {
        Some(name) => name.to_string(),
        None => format!("<unknown symbol {}>", id.index()),
    }
}

/// `to_s` rendering of `value`. May call back into the host.
pub fn debug_value<H: Host>(host: &mut H, value: Value) -> String {
    let mut scope = host.handle_scope();
    scope.promote(value);
    host.render(value)
}
