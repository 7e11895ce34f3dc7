//! Connection lifecycle and the register/coil operation surface.
//!
//! A [`Session`] owns at most one open channel at a time. Operations are
//! attempt-once: a disconnected session gets a single implicit reconnect, and
//! any exchange failure drops the channel so the next call starts from a
//! clean connect. Industrial links rarely recover mid-exchange, so treating
//! every failure as connection loss keeps the retry policy in one place.

use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::error::{ConnectError, OperationError};
use crate::modbus::transport::TransportDescriptor;

#[cfg(feature = "tcp")]
use tokio_modbus::client::tcp;

#[cfg(feature = "rtu")]
use tokio_modbus::client::rtu;

/// Bound on a single connect or exchange. The underlying transport does not
/// always enforce one (a dead RTU slave never answers), and the measurement
/// loop must keep moving.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens the protocol channel for one endpoint kind.
#[allow(async_fn_in_trait)]
pub trait Connector {
    async fn open(&self) -> Result<Context, ConnectError>;
}

impl Connector for TransportDescriptor {
    async fn open(&self) -> Result<Context, ConnectError> {
        use crate::modbus::transport::Endpoint;

        let client = match *self.endpoint() {
            #[cfg(feature = "tcp")]
            Endpoint::Tcp { ref host, port } => {
                let socket_addr = resolve(host, port)?;
                tcp::connect_slave(socket_addr, self.slave()).await?
            }

            #[cfg(feature = "rtu")]
            Endpoint::Rtu {
                ref device,
                baud_rate,
                parity,
                data_bits,
                stop_bits,
            } => {
                let builder = tokio_serial::new(device, baud_rate)
                    .parity(parity.into())
                    .data_bits(data_bits.into())
                    .stop_bits(stop_bits.into());
                let port = tokio_serial::SerialStream::open(&builder)?;
                rtu::connect_slave(port, self.slave()).await?
            }
        };
        Ok(client)
    }
}

#[cfg(feature = "tcp")]
fn resolve(host: &str, port: u16) -> Result<std::net::SocketAddr, ConnectError> {
    use std::net::ToSocketAddrs;

    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ConnectError::Resolve {
            host: host.to_owned(),
        })
}

/// One client's exclusive handle on a Modbus endpoint.
pub struct Session<C> {
    connector: C,
    client: Option<Context>,
    timeout: Duration,
}

impl<C: Connector> Session<C> {
    /// Creates a disconnected session; no OS resource is acquired until
    /// [`connect`](Self::connect) or the first operation.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            client: None,
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Opens the channel, replacing any previously open one.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.client = None;
        let client = match timeout(self.timeout, self.connector.open()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };
        self.client = Some(client);
        Ok(())
    }

    /// Closes the channel if open. Idempotent.
    pub fn disconnect(&mut self) {
        // Dropping the context closes the socket or serial fd.
        self.client = None;
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub async fn read_coils(
        &mut self,
        addr: u16,
        out: &mut [bool],
    ) -> Result<(), OperationError> {
        let count = request_count(out.len())?;
        let limit = self.timeout;
        let client = self.ensure_connected().await?;
        let result = timeout(limit, client.read_coils(addr, count)).await;
        let bits = self.check(flatten(result))?;
        self.fill(out, bits)
    }

    pub async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), OperationError> {
        let limit = self.timeout;
        let client = self.ensure_connected().await?;
        let result = timeout(limit, client.write_single_coil(addr, value)).await;
        self.check(flatten(result))
    }

    pub async fn read_holding_registers(
        &mut self,
        addr: u16,
        out: &mut [u16],
    ) -> Result<(), OperationError> {
        let count = request_count(out.len())?;
        let limit = self.timeout;
        let client = self.ensure_connected().await?;
        let result = timeout(limit, client.read_holding_registers(addr, count)).await;
        let words = self.check(flatten(result))?;
        self.fill(out, words)
    }

    pub async fn read_input_registers(
        &mut self,
        addr: u16,
        out: &mut [u16],
    ) -> Result<(), OperationError> {
        let count = request_count(out.len())?;
        let limit = self.timeout;
        let client = self.ensure_connected().await?;
        let result = timeout(limit, client.read_input_registers(addr, count)).await;
        let words = self.check(flatten(result))?;
        self.fill(out, words)
    }

    pub async fn write_register(&mut self, addr: u16, value: u16) -> Result<(), OperationError> {
        let limit = self.timeout;
        let client = self.ensure_connected().await?;
        let result = timeout(limit, client.write_single_register(addr, value)).await;
        self.check(flatten(result))
    }

    pub async fn write_registers(
        &mut self,
        addr: u16,
        values: &[u16],
    ) -> Result<(), OperationError> {
        request_count(values.len())?;
        let limit = self.timeout;
        let client = self.ensure_connected().await?;
        let result = timeout(limit, client.write_multiple_registers(addr, values)).await;
        self.check(flatten(result))
    }

    /// The single implicit reconnect every operation is allowed before it
    /// fails with [`OperationError::NotConnected`].
    async fn ensure_connected(&mut self) -> Result<&mut Context, OperationError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => {
                debug!("session disconnected, reconnecting");
                match timeout(self.timeout, self.connector.open()).await {
                    Ok(Ok(client)) => client,
                    Ok(Err(err)) => return Err(OperationError::NotConnected(err)),
                    Err(_) => {
                        return Err(OperationError::NotConnected(ConnectError::Io(
                            io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                        )))
                    }
                }
            }
        };
        Ok(self.client.insert(client))
    }

    /// Applies pessimistic invalidation: any exchange error leaves the
    /// session disconnected.
    fn check<T>(&mut self, result: io::Result<T>) -> Result<T, OperationError> {
        result.map_err(|err| {
            debug!(error = %err, "exchange failed, dropping connection");
            self.client = None;
            OperationError::Transport(err)
        })
    }

    fn fill<T: Copy>(&mut self, out: &mut [T], data: Vec<T>) -> Result<(), OperationError> {
        if data.len() != out.len() {
            debug!(got = data.len(), want = out.len(), "short response, dropping connection");
            self.client = None;
            return Err(OperationError::Transport(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("short response: {} of {} values", data.len(), out.len()),
            )));
        }
        out.copy_from_slice(&data);
        Ok(())
    }
}

/// Request and response counts ride in a 16-bit field; a larger buffer can
/// never be satisfied, so reject it before touching the connection.
fn request_count(len: usize) -> Result<u16, OperationError> {
    u16::try_from(len).map_err(|_| {
        OperationError::Transport(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("request of {len} values exceeds the protocol limit"),
        ))
    })
}

fn flatten<T>(result: Result<io::Result<T>, tokio::time::error::Elapsed>) -> io::Result<T> {
    match result {
        Ok(inner) => inner,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "exchange timed out",
        )),
    }
}
