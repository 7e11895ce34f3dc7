use thiserror::Error;

/// Rejected configuration value, naming the field that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure to open the underlying channel (serial port or TCP socket).
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "rtu")]
    #[error(transparent)]
    Serial(#[from] tokio_serial::Error),

    #[error("cannot resolve host {host:?}")]
    Resolve { host: String },
}

/// Failure of a single Modbus operation. Each operation is attempt-once: at
/// most one implicit reconnect, then one exchange.
#[derive(Error, Debug)]
pub enum OperationError {
    /// The session was disconnected and the implicit reconnect failed. The
    /// transport was not touched beyond the connect attempt.
    #[error("not connected: {0}")]
    NotConnected(#[source] ConnectError),

    /// I/O error, timeout, malformed response, or an exception reported by
    /// the device during the exchange. The connection is presumed broken,
    /// except for a request too large for the wire format, which is rejected
    /// before anything is sent.
    #[error("transport failure: {0}")]
    Transport(#[source] std::io::Error),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    JSONError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(std::borrow::Cow<'static, str>),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::Other(s.into())
    }
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Self::Other(s.into())
    }
}
