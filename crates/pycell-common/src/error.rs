//! Error taxonomy for the pycell engine.
//!
//! - **`ExecError`**   : value-level failure of a single fragment. It travels
//!   inside [`Value::Error`](crate::Value::Error) so a failing cell never
//!   aborts a recalculation pass.
//! - **`EngineError`** : failures of engine *operations* (add/update/move,
//!   rollback, sheet synchronization, collaborator lookups).

use std::fmt;

use thiserror::Error;

use crate::Position;

/// Failure raised while parsing or running one fragment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum ExecError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { message: String, line: u32 },

    #[error("{exception}: {message}")]
    Runtime { exception: String, message: String },
}

impl ExecError {
    pub fn syntax(message: impl Into<String>, line: u32) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
        }
    }

    pub fn runtime(exception: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            exception: exception.into(),
            message: message.into(),
        }
    }

    pub fn name_error(name: &str) -> Self {
        Self::runtime("NameError", format!("name '{name}' is not defined"))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::runtime("ValueError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::runtime("IndexError", message)
    }

    pub fn key_error(key: impl fmt::Display) -> Self {
        Self::runtime("KeyError", key.to_string())
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::runtime(
            "AttributeError",
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn zero_division() -> Self {
        Self::runtime("ZeroDivisionError", "division by zero")
    }

    pub fn overflow() -> Self {
        Self::runtime("OverflowError", "integer overflow")
    }

    pub fn not_supported(what: impl fmt::Display) -> Self {
        Self::runtime("NotImplementedError", format!("{what} is not supported"))
    }

    /// Python exception class name (`SyntaxError`, `NameError`, ...).
    pub fn exception_name(&self) -> &str {
        match self {
            ExecError::Syntax { .. } => "SyntaxError",
            ExecError::Runtime { exception, .. } => exception,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecError::Syntax { message, .. } | ExecError::Runtime { message, .. } => message,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, ExecError::Syntax { .. })
    }
}

/// Why an array formula could not grow over its target rectangle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// A foreign value or formula sits inside the target rectangle.
    Occupied(Position),
    /// The sheet (or the target cells) is protected.
    Protected,
    /// The rectangle would leave the sheet grid.
    OutOfBounds,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Occupied(pos) => write!(f, "cell {} is not empty", pos.a1()),
            BlockReason::Protected => write!(f, "sheet is protected"),
            BlockReason::OutOfBounds => write!(f, "region exceeds sheet bounds"),
        }
    }
}

/// Failure of an engine operation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EngineError {
    #[error("syntax error in fragment at {position}: {message}")]
    SnippetSyntax { position: Position, message: String },

    #[error("fragment at {position} raised {exception}: {message}")]
    SnippetRuntime {
        position: Position,
        exception: String,
        message: String,
    },

    #[error("cannot expand array formula at {anchor} to {rows}x{cols}: {reason}")]
    ExpansionBlocked {
        anchor: Position,
        rows: u32,
        cols: u32,
        reason: BlockReason,
    },

    #[error("no snapshot to roll back to before {position}")]
    RollbackTargetMissing { position: Position },

    #[error("{what} lookup failed: {reason}")]
    CollaboratorQuery { what: String, reason: String },

    #[error("a fragment already exists at {0}")]
    FragmentExists(Position),

    #[error("no fragment at {0}")]
    FragmentMissing(Position),

    #[error("cannot move fragment onto occupied cell {0}")]
    PositionOccupied(Position),

    #[error("document '{0}' is not open")]
    UnknownDocument(String),
}

impl EngineError {
    /// Lift a fragment failure into an operation error tagged with its position.
    pub fn from_exec(position: Position, err: &ExecError) -> Self {
        match err {
            ExecError::Syntax { message, line } => EngineError::SnippetSyntax {
                position,
                message: format!("{message} (line {line})"),
            },
            ExecError::Runtime { exception, message } => EngineError::SnippetRuntime {
                position,
                exception: exception.clone(),
                message: message.clone(),
            },
        }
    }

    pub fn collaborator(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        EngineError::CollaboratorQuery {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_error_display_matches_python() {
        let err = ExecError::name_error("x");
        assert_eq!(err.to_string(), "NameError: name 'x' is not defined");
        assert_eq!(err.exception_name(), "NameError");
        let syn = ExecError::syntax("invalid syntax", 2);
        assert_eq!(syn.exception_name(), "SyntaxError");
        assert!(syn.is_syntax());
    }

    #[test]
    fn engine_error_from_exec() {
        let pos = Position::new(0, 1, 0);
        let err = EngineError::from_exec(pos, &ExecError::zero_division());
        match err {
            EngineError::SnippetRuntime {
                position,
                exception,
                ..
            } => {
                assert_eq!(position, pos);
                assert_eq!(exception, "ZeroDivisionError");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
