//! Error taxonomy for registry construction, action execution and output decoding.

use core::time::Duration;
use std::io;

use thiserror::Error as ThisError;

/// Errors produced by the remote-control core.
///
/// Lookup failures (`UnknownHost`, `UnknownAction`) are raised before any child
/// process is spawned. The remaining execution variants are kept apart from a
/// completed process with a nonzero exit code, which is not an error.
#[derive(Debug, ThisError)]
pub enum RemoteError {
    #[error("Unknown host '{0}'")]
    UnknownHost(String),
    #[error("Unknown action '{action}' for host '{host}'")]
    UnknownAction { host: String, action: String },
    #[error("Failed to run command `{command}`")]
    ProcessSpawnFailure {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Output of `{command}` is not valid {encoding}")]
    DecodeFailure {
        command: String,
        encoding: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("Command `{command}` did not finish within {timeout:?}")]
    ActionTimeout { command: String, timeout: Duration },
    #[error("Host '{0}' is registered more than once")]
    DuplicateHost(String),
    #[error("Invalid action definition for host '{host}': {reason}")]
    InvalidAction { host: String, reason: String },
    #[error("Unsupported text encoding '{0}'")]
    UnknownEncoding(String),
}

/// Position of the first byte that could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("invalid byte at offset {offset}")]
pub struct DecodeError {
    pub offset: usize,
}

pub type Result<T, E = RemoteError> = core::result::Result<T, E>;
