use std::ops::RangeInclusive;

use log::debug;

use crate::{
    Error, FrameCreateInfo, FrameKind, Host, Pinned, Result, SymbolId, Value,
};

/// State of one compiled module while its body is being loaded.
///
/// Holds the module's real path, validated and pinned until the load is
/// dropped. Loads may overlap and end in any order. Every frame created
/// through [`ModuleLoad::frame_info`] records the path.
#[must_use]
pub struct ModuleLoad {
    real_path: Pinned,
}

impl ModuleLoad {
    pub fn begin<H: Host>(host: &mut H, real_path: Value) -> Result<Self> {
        let Some(text) = host.string_value(real_path) else {
            return Err(Error::Runtime(
                "Invalid realpath when loading compiled module".to_string(),
            ));
        };
        debug!("loading compiled module {text}");

        Ok(Self {
            real_path: host.pin(real_path),
        })
    }

    pub fn real_path(&self) -> Value {
        self.real_path.value()
    }

    /// Frame arguments for a frame defined by this module.
    pub fn frame_info<'a>(
        &self,
        kind: FrameKind,
        name: Value,
        qualified: SymbolId,
        path: Value,
        lines: RangeInclusive<u32>,
    ) -> FrameCreateInfo<'a> {
        FrameCreateInfo::new(
            kind,
            name,
            qualified,
            path,
            self.real_path(),
            lines,
        )
    }
}

impl std::fmt::Debug for ModuleLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoad")
            .field("real_path", &self.real_path())
            .finish_non_exhaustive()
    }
}
