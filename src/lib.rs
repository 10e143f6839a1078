pub mod serial;
pub mod device;
pub mod config;
pub mod catalog;

pub use catalog::{parse_wavelength_label, WavelengthCatalog};
pub use config::{ConnectionSettings, Settings};
pub use device::{DeviceManager, FilterWheel, MoveError, Position, QueryError};
pub use serial::SerialInterface;
#[cfg(any(test, feature = "mock"))]
pub use serial::MockPort;
