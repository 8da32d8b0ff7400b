//! Total Phase Aardvark adapter transport.
//!
//! The vendor library is not linked here. Hosts that have it implement
//! [`AardvarkDriver`] over their binding and hand the driver to
//! [`AardvarkTransport::new`] (or register a factory with the port resolver).

use std::fmt;

use tracing::{debug, info, instrument, warn};

use super::traits::{Transport, TransportError, TransportKind};
use crate::protocol::constants::AARDVARK_BUS_TIMEOUT_MS;

/// Negative status code returned by the vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStatus(pub i32);

impl DriverStatus {
    pub const UNABLE_TO_OPEN: Self = Self(-7);
    pub const I2C_READ_ERROR: Self = Self(-102);
    pub const I2C_WRITE_ERROR: Self = Self(-103);

    pub fn name(&self) -> Option<&'static str> {
        Some(match self.0 {
            -1 => "AA_UNABLE_TO_LOAD_LIBRARY",
            -2 => "AA_UNABLE_TO_LOAD_DRIVER",
            -3 => "AA_UNABLE_TO_LOAD_FUNCTION",
            -4 => "AA_INCOMPATIBLE_LIBRARY",
            -5 => "AA_INCOMPATIBLE_DEVICE",
            -6 => "AA_COMMUNICATION_ERROR",
            -7 => "AA_UNABLE_TO_OPEN",
            -8 => "AA_UNABLE_TO_CLOSE",
            -9 => "AA_INVALID_HANDLE",
            -10 => "AA_CONFIG_ERROR",
            -100 => "AA_I2C_NOT_AVAILABLE",
            -101 => "AA_I2C_NOT_ENABLED",
            -102 => "AA_I2C_READ_ERROR",
            -103 => "AA_I2C_WRITE_ERROR",
            -107 => "AA_I2C_DROPPED_EXCESS_BYTES",
            -108 => "AA_I2C_BUS_ALREADY_FREE",
            _ => return None,
        })
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Operations the transport needs from the vendor binding.
pub trait AardvarkDriver {
    fn open(&mut self, port: u16) -> Result<(), DriverStatus>;
    fn close(&mut self);
    /// Enable the I2C block.
    fn configure_i2c(&mut self) -> Result<(), DriverStatus>;
    fn set_pullups(&mut self, enabled: bool) -> Result<(), DriverStatus>;
    fn set_target_power(&mut self, enabled: bool) -> Result<(), DriverStatus>;
    /// Returns the bitrate the adapter actually selected.
    fn set_bitrate_khz(&mut self, khz: u32) -> Result<u32, DriverStatus>;
    fn set_bus_timeout_ms(&mut self, ms: u16) -> Result<u16, DriverStatus>;
    /// Returns the number of bytes acknowledged.
    fn i2c_write(&mut self, address: u8, data: &[u8]) -> Result<usize, DriverStatus>;
    /// Returns the number of bytes placed in `buf`.
    fn i2c_read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, DriverStatus>;
}

pub struct AardvarkTransport {
    driver: Box<dyn AardvarkDriver>,
    port: u16,
    rate_hz: u32,
    peripheral_address: u8,
    effective_rate: Option<u32>,
    open: bool,
}

impl AardvarkTransport {
    pub fn new(
        driver: Box<dyn AardvarkDriver>,
        port: u16,
        rate_hz: u32,
        peripheral_address: u8,
    ) -> Self {
        Self {
            driver,
            port,
            rate_hz,
            peripheral_address,
            effective_rate: None,
            open: false,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bitrate reported by the adapter; `None` until opened.
    pub fn effective_rate(&self) -> Option<u32> {
        self.effective_rate
    }

    fn device(&self) -> String {
        format!("aardvark:{}", self.port)
    }

    fn setup(&mut self) -> Result<u32, DriverStatus> {
        self.driver.configure_i2c()?;
        self.driver.set_pullups(false)?;
        self.driver.set_target_power(false)?;
        let khz = self.driver.set_bitrate_khz(self.rate_hz / 1000)?;
        let timeout = self.driver.set_bus_timeout_ms(AARDVARK_BUS_TIMEOUT_MS)?;
        debug!(bus_timeout_ms = timeout, "Aardvark bus timeout set");
        Ok(khz * 1000)
    }
}

impl Transport for AardvarkTransport {
    #[instrument(skip(self), fields(port = self.port))]
    fn open(&mut self) -> Result<(), TransportError> {
        if self.open {
            return Ok(());
        }
        self.driver
            .open(self.port)
            .map_err(|status| TransportError::OpenFailed {
                device: self.device(),
                message: status.to_string(),
            })?;

        let effective = match self.setup() {
            Ok(hz) => hz,
            Err(status) => {
                self.driver.close();
                return Err(TransportError::OpenFailed {
                    device: self.device(),
                    message: status.to_string(),
                });
            }
        };
        if effective != self.rate_hz {
            warn!(
                requested_hz = self.rate_hz,
                effective_hz = effective,
                "Aardvark selected a different bitrate"
            );
        }
        self.effective_rate = Some(effective);
        self.open = true;
        info!(
            peripheral = %format!("0x{:02X}", self.peripheral_address),
            rate_hz = effective,
            "Aardvark adapter opened"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.driver.close();
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let written = self
            .driver
            .i2c_write(self.peripheral_address, data)
            .map_err(|status| TransportError::Driver(status.to_string()))?;
        if written != data.len() {
            return Err(TransportError::ShortWrite {
                requested: data.len(),
                actual: written,
            });
        }
        debug!(bytes_written = written, "Write complete");
        Ok(())
    }

    #[instrument(skip(self))]
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let mut buf = vec![0u8; len];
        let got = self
            .driver
            .i2c_read(self.peripheral_address, &mut buf)
            .map_err(|status| TransportError::Driver(status.to_string()))?;
        if got != len {
            return Err(TransportError::ShortRead {
                requested: len,
                actual: got,
            });
        }
        debug!(bytes_read = got, "Read complete");
        Ok(buf)
    }

    fn kind(&self) -> Option<TransportKind> {
        Some(TransportKind::Aardvark)
    }
}

impl Drop for AardvarkTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
