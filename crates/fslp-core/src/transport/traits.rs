//! Transport layer abstraction.
//!
//! Defines the `Transport` trait for byte-level camera links,
//! allowing different backends (i2c-dev, I2CDriver pod, Aardvark, V4L2, mock).

use std::fmt;

use thiserror::Error;

/// Taxonomy class of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Device or backend absent, peripheral not on the bus.
    Connectivity,
    /// Operation attempted on a closed transport.
    State,
    /// Short read/write or a failed transfer.
    Transport,
    /// Argument rejected before any I/O was attempted.
    Value,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open {device}: {message}")]
    OpenFailed { device: String, message: String },

    #[error("Peripheral address 0x{address:02X} not present, found: [{}]", format_addresses(.found))]
    AddressNotPresent { address: u8, found: Vec<u8> },

    #[error("Transport is not open")]
    NotOpen,

    #[error("Short write: {actual} of {requested} bytes")]
    ShortWrite { requested: usize, actual: usize },

    #[error("Short read: {actual} of {requested} bytes")]
    ShortRead { requested: usize, actual: usize },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transfer of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for TransportError {
    /// Kernel `ETIMEDOUT` becomes [`TransportError::Timeout`]; the elapsed time
    /// is not reported by the OS, so `timeout_ms` is zero.
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout { timeout_ms: 0 }
        } else {
            TransportError::Io(e)
        }
    }
}

impl TransportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::DeviceNotFound(_)
            | TransportError::OpenFailed { .. }
            | TransportError::AddressNotPresent { .. } => ErrorCategory::Connectivity,
            TransportError::NotOpen => ErrorCategory::State,
            TransportError::PayloadTooLarge { .. } => ErrorCategory::Value,
            TransportError::ShortWrite { .. }
            | TransportError::ShortRead { .. }
            | TransportError::Timeout { .. }
            | TransportError::Driver(_)
            | TransportError::Io(_) => ErrorCategory::Transport,
        }
    }
}

fn format_addresses(found: &[u8]) -> String {
    found
        .iter()
        .map(|a| format!("0x{:02X}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TotalPhase Aardvark adapter (vendor driver).
    Aardvark,
    /// Linux i2c-dev bus (`/dev/i2c-N`).
    Smbus,
    /// Excamera I2CDriver / I2CMini serial pod.
    I2cDriver,
    /// FLIR Boson V4L2 subdevice control ioctl.
    V4l2,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [
        TransportKind::Aardvark,
        TransportKind::Smbus,
        TransportKind::I2cDriver,
        TransportKind::V4l2,
    ];

    pub fn is_i2c(&self) -> bool {
        !matches!(self, TransportKind::V4l2)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Aardvark => write!(f, "aardvark"),
            TransportKind::Smbus => write!(f, "smbus"),
            TransportKind::I2cDriver => write!(f, "i2cdriver"),
            TransportKind::V4l2 => write!(f, "v4l2"),
        }
    }
}

/// Abstract byte link to the camera.
///
/// All calls block. There is no internal locking: one command in flight at a
/// time, and callers sharing an instance must serialize access themselves.
pub trait Transport {
    /// Acquire the underlying OS or driver resource.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Release the resource. Idempotent; `is_open()` is false afterwards even
    /// when the release itself reports an error.
    fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Best-effort link presence probe. `None` when the backend cannot tell.
    fn is_available(&self) -> Option<bool> {
        None
    }

    /// Write the whole buffer in one logical transfer.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read exactly `len` bytes.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;

    fn kind(&self) -> Option<TransportKind> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn is_available(&self) -> Option<bool> {
        (**self).is_available()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(len)
    }

    fn kind(&self) -> Option<TransportKind> {
        (**self).kind()
    }
}
