//! Runtime error taxonomy

use wgfx_build::{CompileError, CompileErrorKind};

/// Broad category of a [`WgfxError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Resolution,
    Layout,
    Device,
    State,
    DimensionMismatch,
}

impl ErrorKind {
    /// Returns true if retrying without changing the input cannot succeed
    pub fn is_permanent(self) -> bool {
        match self {
            Self::Syntax | Self::Resolution | Self::Layout => true,
            Self::Device | Self::State | Self::DimensionMismatch => false,
        }
    }
}

impl From<CompileErrorKind> for ErrorKind {
    fn from(kind: CompileErrorKind) -> Self {
        match kind {
            CompileErrorKind::Syntax => Self::Syntax,
            CompileErrorKind::Resolution => Self::Resolution,
            CompileErrorKind::Layout => Self::Layout,
            // naga rejected generated code; the device would have done the same
            CompileErrorKind::Validation => Self::Device,
        }
    }
}

fn fmt_pass(pass: &Option<u32>) -> String {
    pass.map(|p| format!(" in pass {p}")).unwrap_or_default()
}

/// Errors raised by the effect runtime
#[derive(Debug, thiserror::Error)]
pub enum WgfxError {
    /// The effect failed to parse or generate
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The device rejected a shader, pipeline or resource
    #[error("device error{}: {message}", fmt_pass(.pass))]
    Device { pass: Option<u32>, message: String },
    /// The operation is not valid in the runtime's current state
    #[error("invalid state: expected {expected}, found {actual}")]
    State { expected: String, actual: String },
    /// An upload or resize does not match the texture it targets
    #[error("dimension mismatch for '{name}': expected {}x{}, got {}x{}", .expected.0, .expected.1, .actual.0, .actual.1)]
    DimensionMismatch { name: String, expected: (u32, u32), actual: (u32, u32) },
}

impl WgfxError {
    /// Returns the category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compile(e) => e.kind().into(),
            Self::Device { .. } => ErrorKind::Device,
            Self::State { .. } => ErrorKind::State,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
        }
    }

    pub(crate) fn state(expected: impl Into<String>, actual: impl std::fmt::Display) -> Self {
        Self::State {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn device(pass: Option<u32>, message: impl Into<String>) -> Self {
        Self::Device { pass, message: message.into() }
    }
}
