//! Endpoint descriptions for the two supported channels.
//!
//! A [`TransportDescriptor`] is pure, validated data: it fully determines how
//! a session opens its channel but holds no OS resources itself.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::modbus::{UnitId, DEFAULT_PORT, MAX_UNIT_ID};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "char")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    /// Single-letter form used on serial lines (and on the command line).
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

impl TryFrom<char> for Parity {
    type Error = ConfigError;

    fn try_from(c: char) -> Result<Self, ConfigError> {
        match c {
            'N' | 'n' => Ok(Parity::None),
            'E' | 'e' => Ok(Parity::Even),
            'O' | 'o' => Ok(Parity::Odd),
            other => Err(ConfigError::new(
                "parity",
                format!("must be N, E, or O, got {other:?}"),
            )),
        }
    }
}

#[cfg(feature = "rtu")]
impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, ConfigError> {
        match bits {
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(ConfigError::new(
                "data_bits",
                format!("must be 7 or 8, got {other}"),
            )),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

#[cfg(feature = "rtu")]
impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, ConfigError> {
        match bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(ConfigError::new(
                "stop_bits",
                format!("must be 1 or 2, got {other}"),
            )),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

#[cfg(feature = "rtu")]
impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "proto", rename_all = "lowercase")]
pub enum Endpoint {
    #[cfg(feature = "tcp")]
    Tcp {
        host: String,

        #[serde(default = "default_port")]
        port: u16,
    },

    #[cfg(feature = "rtu")]
    #[serde(rename_all = "snake_case")]
    Rtu {
        device: String,
        baud_rate: u32,

        #[serde(default)]
        parity: Parity,

        #[serde(default)]
        data_bits: DataBits,

        #[serde(default)]
        stop_bits: StopBits,
    },
}

impl Endpoint {
    #[cfg(feature = "tcp")]
    pub fn tcp(host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let endpoint = Endpoint::Tcp {
            host: host.into(),
            port,
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Builds an RTU endpoint from the raw forms a command line provides.
    #[cfg(feature = "rtu")]
    pub fn rtu(
        device: impl Into<String>,
        baud_rate: u32,
        parity: char,
        data_bits: u8,
        stop_bits: u8,
    ) -> Result<Self, ConfigError> {
        let endpoint = Endpoint::Rtu {
            device: device.into(),
            baud_rate,
            parity: parity.try_into()?,
            data_bits: data_bits.try_into()?,
            stop_bits: stop_bits.try_into()?,
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            #[cfg(feature = "tcp")]
            Endpoint::Tcp { port, .. } if port == 0 => {
                Err(ConfigError::new("port", "must be in 1..=65535"))
            }

            #[cfg(feature = "rtu")]
            Endpoint::Rtu { baud_rate, .. } if baud_rate == 0 => {
                Err(ConfigError::new("baud_rate", "must be positive"))
            }

            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            #[cfg(feature = "tcp")]
            Endpoint::Tcp { ref host, port } => write!(f, "tcp://{host}:{port}"),

            #[cfg(feature = "rtu")]
            Endpoint::Rtu {
                ref device,
                baud_rate,
                parity,
                data_bits,
                stop_bits,
            } => write!(
                f,
                "rtu://{device} ({baud_rate} {}{}{})",
                u8::from(data_bits),
                parity.letter(),
                u8::from(stop_bits),
            ),
        }
    }
}

/// Immutable description of one Modbus endpoint plus the unit to address.
///
/// Construction is the only validation point; a session trusts a descriptor
/// it is handed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "DescriptorParts")]
pub struct TransportDescriptor {
    endpoint: Endpoint,
    unit: UnitId,
}

#[derive(Deserialize)]
struct DescriptorParts {
    #[serde(flatten)]
    endpoint: Endpoint,

    #[serde(alias = "slave", default = "default_unit")]
    unit: UnitId,
}

impl TryFrom<DescriptorParts> for TransportDescriptor {
    type Error = ConfigError;

    fn try_from(parts: DescriptorParts) -> Result<Self, ConfigError> {
        Self::new(parts.endpoint, parts.unit)
    }
}

impl TransportDescriptor {
    pub fn new(endpoint: Endpoint, unit: UnitId) -> Result<Self, ConfigError> {
        endpoint.validate()?;
        if unit > MAX_UNIT_ID {
            return Err(ConfigError::new(
                "unit",
                format!("must be in 0..={MAX_UNIT_ID}, got {unit}"),
            ));
        }
        Ok(Self { endpoint, unit })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn slave(&self) -> crate::modbus::Unit {
        tokio_modbus::prelude::Slave(self.unit)
    }
}

#[cfg(feature = "tcp")]
fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_unit() -> UnitId {
    1
}
