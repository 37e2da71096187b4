//! Runtime configuration

use wgfx_build::{CodegenOptions, LogConfig};

/// Options for an [`crate::EffectRuntime`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeOptions {
    /// Logging for the resource and pipeline managers
    pub log: LogConfig,
    /// Code generation options
    ///
    /// `output_format` is overridden with the format of the `OUTPUT` texture at
    /// every compile.
    pub codegen: CodegenOptions,
}

impl RuntimeOptions {
    /// Uses `log` for the runtime and the code generator alike
    pub fn with_log(log: LogConfig) -> Self {
        Self {
            log,
            codegen: CodegenOptions { log, ..Default::default() },
        }
    }
}
