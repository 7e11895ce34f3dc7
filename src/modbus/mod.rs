pub mod session;
pub mod transport;

pub use session::{Connector, Session};
pub use transport::{Endpoint, TransportDescriptor};

pub type UnitId = tokio_modbus::prelude::SlaveId;
pub type Unit = tokio_modbus::prelude::Slave;

/// Highest unit address a slave may respond on; 248..=255 are reserved.
pub const MAX_UNIT_ID: UnitId = 247;

/// Default Modbus TCP port.
pub const DEFAULT_PORT: u16 = 502;
