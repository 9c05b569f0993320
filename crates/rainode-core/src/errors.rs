//! Error types for instance lifecycle and subprocess supervision.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("interpreter binary not found: {0}")]
    InterpreterNotFound(String),

    #[error("failed to spawn interpreter {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subprocess pipe unavailable for {path}")]
    PipeUnavailable { path: PathBuf },

    #[error("unknown instance id {0}")]
    UnknownInstance(u64),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
