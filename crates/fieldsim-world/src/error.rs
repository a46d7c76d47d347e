//! Error types for fieldsim-world

use fieldsim_core::Identifier;
use thiserror::Error;

/// Result type for fieldsim-world operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, editing or evaluating a world
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A Derived variable would (transitively) depend on itself
    ///
    /// `cycle_path` starts and ends with the same variable, e.g. `[x, y, x]`.
    #[error("circular dependency detected: {}", Self::format_path(.cycle_path))]
    CircularDependency { cycle_path: Vec<Identifier> },

    /// Variable not found in the world
    #[error("variable {0} not found")]
    VariableNotFound(Identifier),

    /// Object not found in the world
    #[error("object {0} not found")]
    ObjectNotFound(Identifier),

    /// Force field not found in the world
    #[error("force field {0} not found")]
    ForceFieldNotFound(Identifier),

    /// A force expression produced something other than a vector
    #[error("force field {field} produced {got}, expected a vector")]
    NonVectorForce { field: Identifier, got: String },

    /// JSON or RON encoding failed, or a saved world was malformed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] fieldsim_core::Error),
}

impl Error {
    /// Get the offending loop if this is a CircularDependency error
    pub fn cycle_path(&self) -> Option<&[Identifier]> {
        match self {
            Error::CircularDependency { cycle_path } => Some(cycle_path),
            _ => None,
        }
    }

    /// Shorthand for an `InvalidOperation` core error
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Core(fieldsim_core::Error::InvalidOperation(message.into()))
    }

    fn format_path(path: &[Identifier]) -> String {
        path.iter()
            .map(Identifier::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<ron::Error> for Error {
    fn from(err: ron::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<ron::error::SpannedError> for Error {
    fn from(err: ron::error::SpannedError) -> Self {
        Error::Serialization(err.to_string())
    }
}
