//! Runtime support for natively compiled code running on a garbage
//! collected host VM.
//!
//! Compiled code calls into this crate to register its literal constants,
//! to give the host a frame descriptor for every method, block and
//! exception region, and to adapt the host's calling convention at argument
//! checks, casts, destructuring and string interpolation. All host access
//! goes through [`Host`]; [`Heap`] is the in-process implementation.
mod calling;
mod debug;
mod error;
mod frame;
mod handles;
mod heap;
mod host;
mod interning;
mod load;
mod root_table;
mod runtime;
mod tagged;
mod visitor;

pub use calling::*;
pub use debug::{debug_symbol, debug_value};
pub use error::{Error, ExceptionClass, Result};
pub use frame::*;
pub use handles::{HandleScope, HandleSet, Pinned};
pub use heap::{
    Heap, HeapCreateInfo, HeapObject, HeapStats, Instance, ObjectFlags,
};
pub use host::Host;
pub use interning::{InternedStrings, SymbolId};
pub use load::ModuleLoad;
pub use root_table::RootTable;
pub use runtime::{Runtime, RuntimeCreateInfo, RuntimeStats, SharedRuntime};
pub use tagged::*;
pub use visitor::{Visitable, Visitor};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "PAYLOAD_LOG";

/// Install the `env_logger` backend, filtered by `PAYLOAD_LOG` and
/// defaulting to `warn`. Calling it again is harmless.
pub fn init_logging() {
    let env = env_logger::Env::new().filter_or(LOG_ENV, "warn");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
