// error.rs - Error type shared by compilation and matching.
//
// Compile failures carry a CompileErrorKind plus a message with the
// pattern offset; match-time aborts are their own variants.

use std::fmt;

use crate::regerror::CompileErrorKind;

/// Error type for regex compilation and matching operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegexError {
    /// The pattern was rejected.
    Compile {
        kind: CompileErrorKind,
        /// Byte offset in the pattern where the problem was detected.
        offset: usize,
        message: String,
    },
    /// Interpreter nesting exceeded the recursion ceiling.
    RecursionLimitOver,
    /// The step budget for one search was exhausted.
    StepLimitOver,
    /// Offsets in `ExecOptions` are out of range or out of order.
    InvalidArgument,
    /// Malformed program reached the interpreter (should not occur).
    InternalBug { message: String },
}

impl RegexError {
    pub(crate) fn compile(kind: CompileErrorKind, offset: usize) -> Self {
        RegexError::Compile {
            kind,
            offset,
            message: format!("{} (at offset {})", kind.message(), offset),
        }
    }

    /// The compile error kind, if this is a compile error.
    pub fn kind(&self) -> Option<CompileErrorKind> {
        match self {
            RegexError::Compile { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True for the errors that abort a search partway (recursion or steps).
    pub fn is_match_abort(&self) -> bool {
        matches!(
            self,
            RegexError::RecursionLimitOver | RegexError::StepLimitOver
        )
    }
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegexError::Compile { message, .. } => write!(f, "syntax error: {}", message),
            RegexError::RecursionLimitOver => write!(f, "recursion limit over"),
            RegexError::StepLimitOver => write!(f, "step limit over"),
            RegexError::InvalidArgument => write!(f, "invalid argument"),
            RegexError::InternalBug { message } => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for RegexError {}
