pub mod bench;
pub mod modbus;
pub mod report;

mod error;
pub use error::{ConfigError, ConnectError, Error, OperationError};

pub type Result<T> = std::result::Result<T, Error>;
