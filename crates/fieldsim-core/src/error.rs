//! Error types for fieldsim-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Syntax error at {position}: {message}")]
    ExpressionSyntax { position: usize, message: String },

    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {function} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Cannot reassign id {current} to {attempted}")]
    IdentityViolation { current: String, attempted: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::ExpressionSyntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(expected: &str, got: &str) -> Self {
        Error::TypeError {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// True for errors raised while compiling expression source
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Error::ExpressionSyntax { .. })
    }

    /// True for errors raised while evaluating a compiled expression
    pub fn is_evaluation_error(&self) -> bool {
        matches!(
            self,
            Error::UndefinedSymbol(_)
                | Error::TypeError { .. }
                | Error::UnknownFunction(_)
                | Error::ArgumentCount { .. }
                | Error::EvaluationError(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
