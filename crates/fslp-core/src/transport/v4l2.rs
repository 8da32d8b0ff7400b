//! V4L2 subdevice transport.
//!
//! The camera driver exposes FSLP as a single combined-direction ioctl on the
//! subdevice node. Each call carries one fixed-size control block:
//!
//! ```text
//! tx_len: u32 LE | rx_len: u32 LE | data: [u8; 256]
//! ```
//!
//! Writes fill `data` and set `tx_len`; reads set `rx_len` and take the reply
//! from `data` (offset 8 of the block).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError, TransportKind};
use crate::protocol::constants::{
    IOCTL_BLOCK_SIZE, IOCTL_FSLP_FRAME, IOCTL_MAX_DATA, V4L2_DEVICE_DIR, V4L2_SUBDEV_PREFIX,
};

/// The ioctl request/response structure.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub tx_len: u32,
    pub rx_len: u32,
    pub data: [u8; IOCTL_MAX_DATA],
}

impl ControlBlock {
    pub const SIZE: usize = IOCTL_BLOCK_SIZE;

    /// Block that transmits `payload`.
    pub fn for_write(payload: &[u8]) -> Result<Self, TransportError> {
        check_len(payload.len())?;
        let mut data = [0u8; IOCTL_MAX_DATA];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            tx_len: payload.len() as u32,
            rx_len: 0,
            data,
        })
    }

    /// Block that requests `len` bytes back.
    pub fn for_read(len: usize) -> Result<Self, TransportError> {
        check_len(len)?;
        Ok(Self {
            tx_len: 0,
            rx_len: len as u32,
            data: [0u8; IOCTL_MAX_DATA],
        })
    }

    pub fn to_bytes(&self) -> [u8; IOCTL_BLOCK_SIZE] {
        let mut buf = [0u8; IOCTL_BLOCK_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.tx_len);
        LittleEndian::write_u32(&mut buf[4..8], self.rx_len);
        buf[8..].copy_from_slice(&self.data);
        buf
    }

    pub fn from_bytes(buf: &[u8; IOCTL_BLOCK_SIZE]) -> Self {
        let mut data = [0u8; IOCTL_MAX_DATA];
        data.copy_from_slice(&buf[8..]);
        Self {
            tx_len: LittleEndian::read_u32(&buf[0..4]),
            rx_len: LittleEndian::read_u32(&buf[4..8]),
            data,
        }
    }

    /// First `len` reply bytes.
    pub fn response(&self, len: usize) -> &[u8] {
        &self.data[..len.min(IOCTL_MAX_DATA)]
    }
}

impl std::fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBlock")
            .field("tx_len", &self.tx_len)
            .field("rx_len", &self.rx_len)
            .finish_non_exhaustive()
    }
}

fn check_len(len: usize) -> Result<(), TransportError> {
    if len > IOCTL_MAX_DATA {
        return Err(TransportError::PayloadTooLarge {
            len,
            max: IOCTL_MAX_DATA,
        });
    }
    Ok(())
}

/// Find the first readable `v4l-subdev*` node in `dir`.
pub fn discover_subdev(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(V4L2_SUBDEV_PREFIX))
        })
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .find(|path| File::open(path).is_ok())
}

/// FSLP over the camera driver's control ioctl.
pub struct V4l2Transport {
    device_path: Option<PathBuf>,
    search_dir: PathBuf,
    file: Option<File>,
}

impl V4l2Transport {
    /// `device_path = None` auto-discovers a subdevice on open.
    pub fn new(device_path: Option<PathBuf>) -> Self {
        Self {
            device_path,
            search_dir: PathBuf::from(V4L2_DEVICE_DIR),
            file: None,
        }
    }

    /// Discover subdevices under `dir` instead of `/dev`.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.as_deref()
    }

    fn transfer(&mut self, block: &ControlBlock) -> Result<ControlBlock, TransportError> {
        let file = self.file.as_ref().ok_or(TransportError::NotOpen)?;
        let mut raw = block.to_bytes();
        submit(file, &mut raw)?;
        Ok(ControlBlock::from_bytes(&raw))
    }
}

#[cfg(target_os = "linux")]
fn submit(file: &File, raw: &mut [u8; IOCTL_BLOCK_SIZE]) -> Result<(), TransportError> {
    use std::os::fd::AsRawFd;

    // SAFETY: `raw` is a live, exclusively borrowed buffer of exactly the size
    // encoded in the request code; the driver reads and writes within it.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), IOCTL_FSLP_FRAME as _, raw.as_mut_ptr()) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn submit(_file: &File, _raw: &mut [u8; IOCTL_BLOCK_SIZE]) -> Result<(), TransportError> {
    let _ = IOCTL_FSLP_FRAME;
    Err(TransportError::Driver(
        "V4L2 control ioctl is only available on Linux".into(),
    ))
}

impl Transport for V4l2Transport {
    #[instrument(skip(self), fields(device = ?self.device_path))]
    fn open(&mut self) -> Result<(), TransportError> {
        if self.file.is_some() {
            return Ok(());
        }
        if self.device_path.is_none() {
            self.device_path = discover_subdev(&self.search_dir);
        }
        let path = self.device_path.clone().ok_or_else(|| {
            TransportError::DeviceNotFound(format!(
                "no {}* node under {}",
                V4L2_SUBDEV_PREFIX,
                self.search_dir.display()
            ))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| TransportError::OpenFailed {
                device: path.display().to_string(),
                message: e.to_string(),
            })?;

        info!(device = %path.display(), "V4L2 subdevice opened");
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the File closes the descriptor.
        self.file = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_available(&self) -> Option<bool> {
        self.device_path.as_ref().map(|p| p.exists())
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let block = ControlBlock::for_write(data)?;
        self.transfer(&block)?;
        debug!(bytes_written = data.len(), "ioctl write complete");
        Ok(())
    }

    #[instrument(skip(self))]
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let block = ControlBlock::for_read(len)?;
        let reply = self.transfer(&block)?;
        debug!(bytes_read = len, "ioctl read complete");
        Ok(reply.response(len).to_vec())
    }

    fn kind(&self) -> Option<TransportKind> {
        Some(TransportKind::V4l2)
    }
}

impl Drop for V4l2Transport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
