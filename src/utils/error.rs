//! Error handling for the MxLang compiler

use crate::diagnostics::Phase;
use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
///
/// User-facing problems in the source are never reported through this type;
/// they are recorded as diagnostics and only surface here once a phase
/// checkpoint turns them into `PhaseAborted`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("compilation aborted: {count} error(s) during {phase}")]
    PhaseAborted { phase: Phase, count: usize },

    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Process exit status for this error category
    ///
    /// Status `2` (unreadable input, bad arguments) never reaches this type;
    /// the binary reports those directly.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PhaseAborted { .. } => 1,
            Self::Internal(_) => 3,
        }
    }
}

// ==================== Lookup Errors ====================

/// What kind of entity a failed lookup was about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Variable,
    Function,
    Class,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Variable => "variable",
            EntityKind::Function => "function",
            EntityKind::Class => "class",
        };
        write!(f, "{}", s)
    }
}

/// Failure of a symbol-table or member lookup
///
/// Callers record exactly one diagnostic from the `Display` text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("\"{name}\" cannot be resolved as a {kind}")]
    NotFound { name: String, kind: EntityKind },

    #[error("\"{name}\" has already been defined as a {kind}")]
    Duplicated { name: String, kind: EntityKind },

    #[error("unknown member \"{name}\" of \"{owner}\"")]
    NoMember { owner: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_messages() {
        let err = LookupError::NotFound { name: "x".to_string(), kind: EntityKind::Variable };
        assert_eq!(err.to_string(), "\"x\" cannot be resolved as a variable");

        let err = LookupError::Duplicated { name: "f".to_string(), kind: EntityKind::Function };
        assert_eq!(err.to_string(), "\"f\" has already been defined as a function");
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let aborted = Error::PhaseAborted { phase: Phase::Semantic, count: 2 };
        let internal = Error::internal("unknown type reached lowering");

        assert_eq!(aborted.exit_code(), 1);
        assert_eq!(internal.exit_code(), 3);
    }
}
