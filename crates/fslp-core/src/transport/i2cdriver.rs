//! Excamera I2CDriver / I2CMini serial pod transport.
//!
//! The pod is driven over a raw 1 Mbaud serial line with single-byte
//! commands:
//!
//! | byte            | meaning                                   | reply          |
//! |-----------------|-------------------------------------------|----------------|
//! | `e` x           | echo x                                    | x              |
//! | `x`             | reset bus                                 | line status    |
//! | `1` / `4`       | 100 / 400 kHz                             | -              |
//! | `d`             | scan 0x08..=0x77                          | 112 bytes      |
//! | `s` (a<<1 \| r) | start                                     | ack in bit 0   |
//! | `0xC0 + n-1`    | write n (1..=64) bytes that follow        | ack in bit 0   |
//! | `0x80 + n-1`    | read n (1..=64) bytes                     | n bytes        |
//! | `p`             | stop                                      | -              |

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::traits::{Transport, TransportError, TransportKind};
use crate::protocol::constants::{
    I2CDRIVER_BAUD, I2CDRIVER_CHUNK, I2CDRIVER_SCAN_FIRST, I2CDRIVER_SCAN_LEN,
};

/// Serial read timeout configured on the line.
const SERIAL_TIMEOUT_MS: u64 = 1000;
const ECHO_PATTERN: [u8; 4] = [0x55, 0x00, 0xFF, 0xAA];

const OP_WRITE: u8 = 0;
const OP_READ: u8 = 1;

/// Byte stream to the pod.
pub trait SerialLink: Read + Write {}

impl<T: Read + Write> SerialLink for T {}

/// Opens the serial device for a pod.
pub type LinkFactory = Box<dyn Fn(&Path) -> std::io::Result<Box<dyn SerialLink>>>;

/// Bus clock the pod will actually use for a requested rate.
pub fn supported_rate(rate_hz: u32) -> u32 {
    if rate_hz < 250_000 { 100_000 } else { 400_000 }
}

pub struct I2cDriverTransport {
    device: PathBuf,
    rate_hz: u32,
    peripheral_address: u8,
    link: Option<Box<dyn SerialLink>>,
    connect: LinkFactory,
}

impl I2cDriverTransport {
    pub fn new(device: impl Into<PathBuf>, rate_hz: u32, peripheral_address: u8) -> Self {
        Self::with_link_factory(
            device,
            rate_hz,
            peripheral_address,
            Box::new(|path| open_serial(path).map(|f| Box::new(f) as Box<dyn SerialLink>)),
        )
    }

    /// Use a custom link, e.g. a scripted stream in tests.
    pub fn with_link_factory(
        device: impl Into<PathBuf>,
        rate_hz: u32,
        peripheral_address: u8,
        connect: LinkFactory,
    ) -> Self {
        Self {
            device: device.into(),
            rate_hz,
            peripheral_address,
            link: None,
            connect,
        }
    }

    pub fn effective_rate(&self) -> u32 {
        supported_rate(self.rate_hz)
    }

    fn link(&mut self) -> Result<&mut Box<dyn SerialLink>, TransportError> {
        self.link.as_mut().ok_or(TransportError::NotOpen)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let link = self.link()?;
        link.write_all(bytes)?;
        link.flush()?;
        Ok(())
    }

    /// Read up to `len` bytes, stopping early if the line goes quiet.
    fn receive(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let link = self.link()?;
        let mut buf = vec![0u8; len];
        let mut got = 0;
        while got < len {
            match link.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        if got == 0 && len > 0 {
            return Err(TransportError::Timeout {
                timeout_ms: SERIAL_TIMEOUT_MS,
            });
        }
        buf.truncate(got);
        Ok(buf)
    }

    fn ack(&mut self) -> Result<bool, TransportError> {
        let reply = self.receive(1)?;
        Ok(reply[0] & 1 != 0)
    }

    fn start(&mut self, op: u8) -> Result<bool, TransportError> {
        let addr = self.peripheral_address;
        self.send(&[b's', (addr << 1) | op])?;
        self.ack()
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        self.send(b"p")
    }

    /// Release the bus after a transaction, whatever its outcome.
    fn finish<R>(&mut self, result: Result<R, TransportError>) -> Result<R, TransportError> {
        match (result, self.stop()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_err)) => {
                warn!(error = %stop_err, "Stop after failed transaction not sent");
                Err(e)
            }
        }
    }

    fn write_transaction(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.start(OP_WRITE)? {
            return Err(TransportError::ShortWrite {
                requested: data.len(),
                actual: 0,
            });
        }
        let mut written = 0;
        for chunk in data.chunks(I2CDRIVER_CHUNK) {
            let mut cmd = Vec::with_capacity(chunk.len() + 1);
            cmd.push(0xC0 + (chunk.len() - 1) as u8);
            cmd.extend_from_slice(chunk);
            self.send(&cmd)?;
            if !self.ack()? {
                return Err(TransportError::ShortWrite {
                    requested: data.len(),
                    actual: written,
                });
            }
            written += chunk.len();
        }
        Ok(())
    }

    fn read_transaction(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.start(OP_READ)? {
            return Err(TransportError::ShortRead {
                requested: len,
                actual: 0,
            });
        }
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let n = (len - out.len()).min(I2CDRIVER_CHUNK);
            self.send(&[0x80 + (n - 1) as u8])?;
            let chunk = self.receive(n)?;
            let short = chunk.len() < n;
            out.extend_from_slice(&chunk);
            if short {
                return Err(TransportError::ShortRead {
                    requested: len,
                    actual: out.len(),
                });
            }
        }
        Ok(out)
    }

    fn handshake(&mut self) -> Result<(), TransportError> {
        // Flush any partially received command.
        self.send(&[b'@'; 64])?;
        for pattern in ECHO_PATTERN {
            self.send(&[b'e', pattern])?;
            let reply = self.receive(1)?;
            if reply[0] != pattern {
                return Err(TransportError::OpenFailed {
                    device: self.device.display().to_string(),
                    message: format!(
                        "echo test failed: sent 0x{:02X}, got 0x{:02X}",
                        pattern, reply[0]
                    ),
                });
            }
        }
        self.send(b"x")?;
        let lines = self.receive(1)?[0] & 0x03;
        if lines != 0x03 {
            return Err(TransportError::OpenFailed {
                device: self.device.display().to_string(),
                message: "bus failed to reset; check connected devices".into(),
            });
        }
        Ok(())
    }

    /// Addresses that acknowledged a probe.
    pub fn scan(&mut self) -> Result<Vec<u8>, TransportError> {
        self.send(b"d")?;
        let reply = self.receive(I2CDRIVER_SCAN_LEN)?;
        if reply.len() != I2CDRIVER_SCAN_LEN {
            return Err(TransportError::ShortRead {
                requested: I2CDRIVER_SCAN_LEN,
                actual: reply.len(),
            });
        }
        Ok(reply
            .iter()
            .enumerate()
            .filter(|(_, status)| **status == b'1')
            .map(|(i, _)| I2CDRIVER_SCAN_FIRST + i as u8)
            .collect())
    }

    fn open_link(&mut self) -> Result<(), TransportError> {
        let link = (self.connect)(&self.device).map_err(|e| TransportError::OpenFailed {
            device: self.device.display().to_string(),
            message: e.to_string(),
        })?;
        self.link = Some(link);

        self.handshake()?;

        let effective = self.effective_rate();
        if effective != self.rate_hz {
            warn!(
                requested_hz = self.rate_hz,
                effective_hz = effective,
                "I2CDriver supports 100 kHz and 400 kHz only"
            );
        }
        self.send(if effective == 100_000 { b"1" } else { b"4" })?;

        let found = self.scan()?;
        if !found.contains(&self.peripheral_address) {
            return Err(TransportError::AddressNotPresent {
                address: self.peripheral_address,
                found,
            });
        }
        Ok(())
    }
}

impl Transport for I2cDriverTransport {
    #[instrument(skip(self), fields(device = %self.device.display()))]
    fn open(&mut self) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Ok(());
        }
        if let Err(e) = self.open_link() {
            self.link = None;
            return Err(e);
        }
        info!(
            peripheral = %format!("0x{:02X}", self.peripheral_address),
            rate_hz = self.effective_rate(),
            baud = I2CDRIVER_BAUD,
            "I2CDriver pod opened"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.link = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let result = self.write_transaction(data);
        self.finish(result)?;
        debug!(bytes_written = data.len(), "Write complete");
        Ok(())
    }

    #[instrument(skip(self))]
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let result = self.read_transaction(len);
        let out = self.finish(result)?;
        debug!(bytes_read = out.len(), "Read complete");
        Ok(out)
    }

    fn kind(&self) -> Option<TransportKind> {
        Some(TransportKind::I2cDriver)
    }
}

impl Drop for I2cDriverTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Open `path` as a raw 1 Mbaud line with a one second read timeout.
#[cfg(target_os = "linux")]
pub fn open_serial(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)?;
    let fd = file.as_raw_fd();

    // SAFETY: `tio` is fully initialised by tcgetattr before use and `fd`
    // stays valid for the lifetime of `file`.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = (SERIAL_TIMEOUT_MS / 100) as libc::cc_t;
        if libc::cfsetispeed(&mut tio, libc::B1000000) != 0
            || libc::cfsetospeed(&mut tio, libc::B1000000) != 0
        {
            return Err(std::io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);
    }
    Ok(file)
}

#[cfg(not(target_os = "linux"))]
pub fn open_serial(_path: &Path) -> std::io::Result<std::fs::File> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "1 Mbaud serial setup is only implemented for Linux",
    ))
}
