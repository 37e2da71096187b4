//! Compile-time error taxonomy
//!
//! Every failure raised while turning effect source into generated modules is a
//! [`CompileError`]. The runtime crate wraps it and adds the device-side categories.

use std::fmt;

/// Machine-readable category of a compile failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    /// Malformed directive, non-sequential pass index or unterminated block
    Syntax,
    /// Unknown identifier or unresolvable size expression
    Resolution,
    /// Resource usage that cannot be mapped onto binding slots
    Layout,
    /// The offline WGSL validator rejected a generated module
    Validation,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Resolution => write!(f, "resolution"),
            Self::Layout => write!(f, "layout"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Errors produced by the parser, code generator and offline tooling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Source text does not follow the effect grammar
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        /// 1-based source line
        line: usize,
        /// 1-based source column
        column: usize,
        /// Human-readable description
        message: String,
    },
    /// An identifier or size expression could not be resolved
    #[error("cannot resolve '{identifier}'{}: {message}", pass_suffix(.pass))]
    Resolution {
        /// Pass the reference appeared in, if any
        pass: Option<u32>,
        /// The offending identifier or expression
        identifier: String,
        /// Human-readable description
        message: String,
    },
    /// Binding slot or workgroup layout could not be derived
    #[error("layout error in pass {pass}{}: {message}", slot_suffix(.slot))]
    Layout {
        /// Pass whose layout failed
        pass: u32,
        /// Slot that collided, if the failure concerns one
        slot: Option<u32>,
        /// Human-readable description
        message: String,
    },
    /// naga rejected a generated module
    #[error("generated WGSL for pass {pass} is invalid: {message}")]
    Validation {
        /// Pass whose module failed validation
        pass: u32,
        /// Diagnostic text from naga
        message: String,
    },
}

fn pass_suffix(pass: &Option<u32>) -> String {
    pass.map(|p| format!(" in pass {p}")).unwrap_or_default()
}

fn slot_suffix(slot: &Option<u32>) -> String {
    slot.map(|s| format!(", slot {s}")).unwrap_or_default()
}

impl CompileError {
    /// Creates a syntax error at the given 1-based position
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    /// Creates a resolution error for an identifier, optionally tied to a pass
    pub fn resolution(pass: Option<u32>, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            pass,
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Creates a layout error for a pass and, optionally, a slot
    pub fn layout(pass: u32, slot: Option<u32>, message: impl Into<String>) -> Self {
        Self::Layout {
            pass,
            slot,
            message: message.into(),
        }
    }

    /// Returns the category of this error
    pub fn kind(&self) -> CompileErrorKind {
        match self {
            Self::Syntax { .. } => CompileErrorKind::Syntax,
            Self::Resolution { .. } => CompileErrorKind::Resolution,
            Self::Layout { .. } => CompileErrorKind::Layout,
            Self::Validation { .. } => CompileErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_position_and_pass() {
        let err = CompileError::syntax(3, 5, "unexpected token");
        assert_eq!(err.to_string(), "syntax error at 3:5: unexpected token");

        let err = CompileError::resolution(Some(2), "Foo", "not declared");
        assert_eq!(err.to_string(), "cannot resolve 'Foo' in pass 2: not declared");

        let err = CompileError::resolution(None, "Foo_WIDTH / 0", "division by zero");
        assert_eq!(err.to_string(), "cannot resolve 'Foo_WIDTH / 0': division by zero");
        assert_eq!(err.kind(), CompileErrorKind::Resolution);

        let err = CompileError::layout(1, Some(4), "slot already taken by the scene uniform");
        assert_eq!(err.to_string(), "layout error in pass 1, slot 4: slot already taken by the scene uniform");
    }
}
