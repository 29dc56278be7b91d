use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::{
    FrameCreateInfo, FrameRegistry, Heap, HeapCreateInfo, Host, ModuleLoad,
    Result, RootTable, Value, allocate_frame, backtrace,
};

#[derive(Debug, Clone, Default)]
pub struct RuntimeCreateInfo {
    /// Only used by [`Runtime::with_heap`].
    pub heap: HeapCreateInfo,
    /// Log a backtrace line for every synthesized frame.
    pub trace_frames: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RuntimeStats {
    pub constants: usize,
    pub frames: usize,
    pub frame_lines: usize,
}

/// Everything compiled code needs from this crate, bound to one host.
///
/// Replaces process globals: the constant table and frame bookkeeping live
/// here, so independent runtimes never share state.
#[derive(Debug)]
pub struct Runtime<H: Host> {
    host: H,
    roots: RootTable,
    frames: FrameRegistry,
    info: RuntimeCreateInfo,
}

impl Runtime<Heap> {
    /// Runtime over a fresh in-process heap.
    pub fn with_heap(info: RuntimeCreateInfo) -> Self {
        let heap = Heap::new(info.heap.clone());
        Self::new(heap, info)
    }
}

impl<H: Host> Runtime<H> {
    pub fn new(host: H, info: RuntimeCreateInfo) -> Self {
        debug!("creating runtime {info:?}");
        Self {
            host,
            roots: RootTable::new(),
            frames: FrameRegistry::new(),
            info,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn register_constant(&mut self, value: Value) -> usize {
        self.roots.register(&mut self.host, value)
    }

    pub fn fetch_constant(&self, index: usize) -> Result<Value> {
        self.roots.fetch(&self.host, index)
    }

    pub fn duplicate_hash(&mut self, index: usize) -> Result<Value> {
        self.roots.duplicate_hash(&mut self.host, index)
    }

    pub fn allocate_frame(
        &mut self,
        info: &FrameCreateInfo<'_>,
    ) -> Result<Value> {
        let frame = allocate_frame(&mut self.host, info)?;
        self.frames.record(info.kind, info.line_count());

        if self.info.trace_frames {
            if let Some(entry) = backtrace(&self.host, frame, 0).first() {
                trace!("frame {entry}");
            }
        }
        Ok(frame)
    }

    pub fn frame_registry(&self) -> &FrameRegistry {
        &self.frames
    }

    /// Start loading a compiled module whose real path is `real_path`.
    pub fn begin_load(&mut self, real_path: Value) -> Result<ModuleLoad> {
        ModuleLoad::begin(&mut self.host, real_path)
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            constants: self.roots.len(&self.host),
            frames: self.frames.frames(),
            frame_lines: self.frames.lines(),
        }
    }
}

/// Runtime shared between loader threads. Registration is serialized by
/// the lock.
#[derive(Debug)]
pub struct SharedRuntime<H: Host> {
    inner: Arc<Mutex<Runtime<H>>>,
}

impl<H: Host> Clone for SharedRuntime<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Host> SharedRuntime<H> {
    pub fn new(runtime: Runtime<H>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(runtime)),
        }
    }

    pub fn register_constant(&self, value: Value) -> usize {
        self.inner.lock().register_constant(value)
    }

    pub fn fetch_constant(&self, index: usize) -> Result<Value> {
        self.inner.lock().fetch_constant(index)
    }

    /// Run `f` with exclusive access to the runtime.
    pub fn with<R>(&self, f: impl FnOnce(&mut Runtime<H>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
