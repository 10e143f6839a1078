pub mod driver;
pub mod manager;
pub mod models;
pub mod sink;

pub use driver::FilterWheel;
pub use manager::DeviceManager;
pub use models::*;
pub use sink::{LogBuffer, LogEntry, LogSink};

use std::time::Duration;

use crate::serial::{ConnectError, SerialError};

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("Filter wheel not connected")]
    NotConnected,

    #[error("Position {0} out of range ({min}..={max})", min = Position::MIN, max = Position::MAX)]
    OutOfRange(i32),

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("No acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response: {0:?}")]
    UnexpectedResponse(String),
}

impl From<SerialError> for MoveError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::NotConnected => MoveError::NotConnected,
            SerialError::Io(e) => MoveError::Io(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Filter wheel not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("No position report within {0:?}")]
    Timeout(Duration),

    #[error("Malformed position report: {0:?}")]
    MalformedResponse(String),
}

impl From<SerialError> for QueryError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::NotConnected => QueryError::NotConnected,
            SerialError::Io(e) => QueryError::Io(e),
        }
    }
}

/// Errors surfaced by the async [`DeviceManager`].
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Move failed: {0}")]
    Move(#[from] MoveError),

    #[error("Position query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Device worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
