//! Linux i2c-dev transport (`/dev/i2c-N`).
//!
//! Uses combined `I2C_RDWR` transfers so each FSLP read or write is a single
//! bus transaction addressed to the camera. The bus clock belongs to the
//! kernel adapter and cannot be changed from here.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::traits::{Transport, TransportError, TransportKind};
use crate::protocol::constants::DEFAULT_I2C_RATE_HZ;

/// Largest single i2c-dev message (`struct i2c_msg.len` is a u16).
const MAX_MESSAGE: usize = u16::MAX as usize;

/// Resolve a bus identifier: a bare number selects `/dev/i2c-N`, anything
/// else is taken as a device path.
pub fn bus_path(id: &str) -> PathBuf {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        PathBuf::from(format!("/dev/i2c-{}", id))
    } else {
        PathBuf::from(id)
    }
}

pub struct SmbusTransport {
    device: PathBuf,
    peripheral_address: u8,
    requested_rate: u32,
    file: Option<File>,
}

impl SmbusTransport {
    pub fn new(device: impl Into<PathBuf>, rate_hz: u32, peripheral_address: u8) -> Self {
        if rate_hz != DEFAULT_I2C_RATE_HZ {
            warn!(
                requested_hz = rate_hz,
                bus_hz = DEFAULT_I2C_RATE_HZ,
                "i2c-dev cannot change the bus clock; configure the adapter instead"
            );
        }
        Self {
            device: device.into(),
            peripheral_address,
            requested_rate: rate_hz,
            file: None,
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn peripheral_address(&self) -> u8 {
        self.peripheral_address
    }

    /// The clock the bus actually runs at, assumed to be the adapter default.
    pub fn effective_rate(&self) -> u32 {
        DEFAULT_I2C_RATE_HZ
    }

    pub fn requested_rate(&self) -> u32 {
        self.requested_rate
    }
}

#[cfg(target_os = "linux")]
mod rdwr {
    use std::fs::File;
    use std::os::fd::AsRawFd;

    const I2C_RDWR: libc::c_ulong = 0x0707;
    const I2C_M_RD: u16 = 0x0001;

    #[repr(C)]
    struct I2cMsg {
        addr: u16,
        flags: u16,
        len: u16,
        buf: *mut u8,
    }

    #[repr(C)]
    struct I2cRdwrIoctlData {
        msgs: *mut I2cMsg,
        nmsgs: u32,
    }

    /// Run one message; returns the number of messages the adapter completed.
    pub(super) fn transfer(
        file: &File,
        addr: u8,
        read: bool,
        buf: &mut [u8],
    ) -> std::io::Result<usize> {
        let mut msg = I2cMsg {
            addr: addr as u16,
            flags: if read { I2C_M_RD } else { 0 },
            len: buf.len() as u16,
            buf: buf.as_mut_ptr(),
        };
        let mut data = I2cRdwrIoctlData {
            msgs: &mut msg,
            nmsgs: 1,
        };
        // SAFETY: `msg` and `buf` outlive the call and `len` matches `buf`.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_RDWR as _,
                &mut data as *mut I2cRdwrIoctlData,
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(rc as usize)
    }
}

#[cfg(not(target_os = "linux"))]
mod rdwr {
    use std::fs::File;

    pub(super) fn transfer(
        _file: &File,
        _addr: u8,
        _read: bool,
        _buf: &mut [u8],
    ) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "i2c-dev is only available on Linux",
        ))
    }
}

impl Transport for SmbusTransport {
    #[instrument(skip(self), fields(device = %self.device.display()))]
    fn open(&mut self) -> Result<(), TransportError> {
        if self.file.is_some() {
            return Ok(());
        }
        if !self.device.exists() {
            return Err(TransportError::DeviceNotFound(
                self.device.display().to_string(),
            ));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .map_err(|e| TransportError::OpenFailed {
                device: self.device.display().to_string(),
                message: e.to_string(),
            })?;
        info!(
            peripheral = %format!("0x{:02X}", self.peripheral_address),
            "i2c-dev bus opened"
        );
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.file = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let file = self.file.as_ref().ok_or(TransportError::NotOpen)?;
        if data.len() > MAX_MESSAGE {
            return Err(TransportError::PayloadTooLarge {
                len: data.len(),
                max: MAX_MESSAGE,
            });
        }
        let mut buf = data.to_vec();
        let done = rdwr::transfer(file, self.peripheral_address, false, &mut buf)?;
        if done != 1 {
            return Err(TransportError::ShortWrite {
                requested: data.len(),
                actual: 0,
            });
        }
        debug!(bytes_written = data.len(), "Write complete");
        Ok(())
    }

    #[instrument(skip(self))]
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let file = self.file.as_ref().ok_or(TransportError::NotOpen)?;
        if len > MAX_MESSAGE {
            return Err(TransportError::PayloadTooLarge {
                len,
                max: MAX_MESSAGE,
            });
        }
        let mut buf = vec![0u8; len];
        let done = rdwr::transfer(file, self.peripheral_address, true, &mut buf)?;
        if done != 1 {
            return Err(TransportError::ShortRead {
                requested: len,
                actual: 0,
            });
        }
        debug!(bytes_read = len, "Read complete");
        Ok(buf)
    }

    fn kind(&self) -> Option<TransportKind> {
        Some(TransportKind::Smbus)
    }
}

impl Drop for SmbusTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
