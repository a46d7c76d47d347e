//! Error types for fieldsim-engine

use fieldsim_core::Identifier;
use thiserror::Error;

/// Result type for fieldsim-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while stepping, seeking or configuring a simulation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// More than one Derived field applies to the same object in one step
    #[error("object {object} has {} overlapping derived force fields", .fields.len())]
    OverlappingDerivedFields {
        object: Identifier,
        fields: Vec<Identifier>,
    },

    /// `restore_backup` was asked for a time with no snapshot
    #[error("no backup at time {0}")]
    NoBackupAtTime(f64),

    /// `simulate_to` found no snapshot at or before the target
    #[error("no snapshot at or before time {0}")]
    NoSnapshotBefore(f64),

    /// Another step or seek is already running
    #[error("simulation is busy")]
    NotIdle,

    /// Invalid or unreadable configuration
    #[error("config error: {0}")]
    Config(String),

    /// World error
    #[error("world error: {0}")]
    World(#[from] fieldsim_world::Error),
}

impl From<fieldsim_core::Error> for Error {
    fn from(err: fieldsim_core::Error) -> Self {
        Error::World(err.into())
    }
}

impl From<ron::error::SpannedError> for Error {
    fn from(err: ron::error::SpannedError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<ron::Error> for Error {
    fn from(err: ron::Error) -> Self {
        Error::Config(err.to_string())
    }
}
