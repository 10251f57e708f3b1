//! # Linelight IO
//!
//! The Byte Source.
//! Wraps the instrument's serial link behind a small blocking read contract
//! so the framing engine never sees a timeout as an error.

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read};
use std::time::Duration;

/// Device the instrument enumerates as on Linux.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD_RATE: u32 = 912_600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

// ════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("unsupported serial settings: {0}")]
    InvalidSettings(String),

    #[error("serial read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("port scan failed: {0}")]
    Enumerate(#[source] serialport::Error),
}

// ════════════════════════════════════════════════════════════════════
// The read contract
// ════════════════════════════════════════════════════════════════════

/// A blocking stream of raw bytes.
///
/// `read_chunk` fills at most `buf.len()` bytes and waits no longer than the
/// source's timeout. `Ok(0)` means nothing arrived in time; it is never an error.
pub trait ByteSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        (**self).read_chunk(buf)
    }
}

/// Adapts any `Read` into a [`ByteSource`].
///
/// Timeouts, would-block and interrupted reads are folded into `Ok(0)`.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Serial connection
// ════════════════════════════════════════════════════════════════════

/// Configuration for a Serial Connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub flow_control: bool,
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            flow_control: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialSettings {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Self::default()
        }
    }

    fn serial_data_bits(&self) -> Result<DataBits, SourceError> {
        match self.data_bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(SourceError::InvalidSettings(format!(
                "{} data bits",
                other
            ))),
        }
    }
}

/// An open serial port. Dropping it releases the device.
pub struct SerialSource {
    port_name: String,
    reader: ReaderSource<Box<dyn SerialPort>>,
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource")
            .field("port_name", &self.port_name)
            .finish()
    }
}

impl SerialSource {
    pub fn open(settings: &SerialSettings) -> Result<Self, SourceError> {
        if settings.read_timeout.is_zero() {
            return Err(SourceError::InvalidSettings(
                "read timeout must be non-zero".to_string(),
            ));
        }

        let flow = if settings.flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };

        let port = serialport::new(&settings.port_name, settings.baud_rate)
            .data_bits(settings.serial_data_bits()?)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(flow)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|source| SourceError::Open {
                port: settings.port_name.clone(),
                source,
            })?;

        tracing::debug!(
            "Opened {} at {} baud (timeout {:?})",
            settings.port_name,
            settings.baud_rate,
            settings.read_timeout
        );

        Ok(Self {
            port_name: settings.port_name.clone(),
            reader: ReaderSource::new(port),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl ByteSource for SerialSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.reader.read_chunk(buf)
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        tracing::debug!("Released {}", self.port_name);
    }
}

/// Names of the serial ports currently visible to the OS.
pub fn available_ports() -> Result<Vec<String>, SourceError> {
    let ports = serialport::available_ports().map_err(SourceError::Enumerate)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
