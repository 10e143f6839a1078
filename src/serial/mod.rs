pub mod interface;
pub mod io;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use interface::SerialInterface;
pub use io::SerialPortIO;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockPort;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid connection settings: {0}")]
    InvalidSettings(String),

    #[error("Port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("IO error while preparing {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
