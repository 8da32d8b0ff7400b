//! Port configuration and transport resolution.
//!
//! A [`PortConfig`] names a transport kind plus its parameters; a
//! [`PortResolver`] checks that the kind is usable on this host and builds
//! the concrete transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::HeaderStrategy;
use crate::events::{FslpEvent, FslpObserver, NullObserver};
use crate::protocol::constants::{
    DEFAULT_AARDVARK_PORT, DEFAULT_I2C_RATE_HZ, DEFAULT_PERIPHERAL_ADDRESS, DEFAULT_SMBUS_BUS,
};
use crate::transport::aardvark::{AardvarkDriver, AardvarkTransport};
use crate::transport::i2cdriver::{I2cDriverTransport, supported_rate};
use crate::transport::smbus::{SmbusTransport, bus_path};
use crate::transport::{Transport, TransportKind, V4l2Transport};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{kind} transport unavailable: {reason}")]
    Unavailable { kind: TransportKind, reason: String },

    #[error("{kind} transport needs a device address")]
    MissingAddress { kind: TransportKind },

    #[error("Invalid {kind} address: {address}")]
    InvalidAddress { kind: TransportKind, address: String },

    #[error("Failed to parse config: {0}")]
    Load(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Save(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a transport kind can be used on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Available,
    Unavailable(String),
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available)
    }
}

impl TransportKind {
    /// Pick a backend from a free-form type string.
    ///
    /// Case-insensitive substring match: `SMBUS`, then `AARD`, then `V4L2`;
    /// any other string selects the I2CDriver pod. No string selects the
    /// Aardvark.
    pub fn from_type_string(type_string: Option<&str>) -> Self {
        let Some(s) = type_string else {
            return TransportKind::Aardvark;
        };
        let upper = s.to_ascii_uppercase();
        if upper.contains("SMBUS") {
            TransportKind::Smbus
        } else if upper.contains("AARD") {
            TransportKind::Aardvark
        } else if upper.contains("V4L2") {
            TransportKind::V4l2
        } else {
            TransportKind::I2cDriver
        }
    }
}

/// Port configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Backend.
    pub kind: TransportKind,
    /// Bus number, Aardvark port index, serial device or subdevice path.
    /// `None` selects the per-kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Requested I2C clock in Hz. Advisory; ignored by V4L2.
    pub rate: u32,
    /// 7-bit camera address on the bus. Ignored by V4L2.
    pub peripheral_address: u8,
    /// Frame header read strategy.
    pub header: HeaderStrategy,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Aardvark,
            address: None,
            rate: DEFAULT_I2C_RATE_HZ,
            peripheral_address: DEFAULT_PERIPHERAL_ADDRESS,
            header: HeaderStrategy::default(),
        }
    }
}

impl PortConfig {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PortConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Builds an Aardvark vendor binding on demand.
pub type AardvarkFactory = Box<dyn Fn() -> Box<dyn AardvarkDriver>>;

/// Turns a [`PortConfig`] into a transport.
pub struct PortResolver {
    aardvark: Option<AardvarkFactory>,
    observer: Arc<dyn FslpObserver>,
}

impl Default for PortResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PortResolver {
    pub fn new() -> Self {
        Self {
            aardvark: None,
            observer: Arc::new(NullObserver),
        }
    }

    /// Register the Aardvark vendor binding.
    pub fn with_aardvark_driver(mut self, factory: AardvarkFactory) -> Self {
        self.aardvark = Some(factory);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FslpObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn capability(&self, kind: TransportKind) -> Capability {
        match kind {
            TransportKind::Aardvark if self.aardvark.is_some() => Capability::Available,
            TransportKind::Aardvark => {
                Capability::Unavailable("no Aardvark driver binding registered".into())
            }
            TransportKind::Smbus | TransportKind::I2cDriver | TransportKind::V4l2 => {
                if cfg!(target_os = "linux") {
                    Capability::Available
                } else {
                    Capability::Unavailable(format!("{} requires Linux", kind))
                }
            }
        }
    }

    fn rate_check(&self, kind: TransportKind, requested: u32, effective: u32) {
        if requested != effective {
            self.observer.on_event(&FslpEvent::RateNotApplied {
                kind,
                requested,
                effective,
            });
        }
    }

    /// Build the transport for `config`. The transport is not opened.
    pub fn resolve(&self, config: &PortConfig) -> Result<Box<dyn Transport>, ConfigError> {
        let kind = config.kind;
        if let Capability::Unavailable(reason) = self.capability(kind) {
            return Err(ConfigError::Unavailable { kind, reason });
        }
        let address = config.address.as_deref();

        let transport: Box<dyn Transport> = match kind {
            TransportKind::Smbus => {
                let bus = address
                    .map(str::to_string)
                    .unwrap_or_else(|| DEFAULT_SMBUS_BUS.to_string());
                let smbus =
                    SmbusTransport::new(bus_path(&bus), config.rate, config.peripheral_address);
                self.rate_check(kind, config.rate, smbus.effective_rate());
                Box::new(smbus)
            }
            TransportKind::I2cDriver => {
                let device = address.ok_or(ConfigError::MissingAddress { kind })?;
                self.rate_check(kind, config.rate, supported_rate(config.rate));
                Box::new(I2cDriverTransport::new(
                    device,
                    config.rate,
                    config.peripheral_address,
                ))
            }
            TransportKind::Aardvark => {
                let port = match address {
                    Some(a) => a.parse::<u16>().map_err(|_| ConfigError::InvalidAddress {
                        kind,
                        address: a.to_string(),
                    })?,
                    None => DEFAULT_AARDVARK_PORT,
                };
                let factory = self.aardvark.as_ref().ok_or_else(|| ConfigError::Unavailable {
                    kind,
                    reason: "no Aardvark driver binding registered".into(),
                })?;
                Box::new(AardvarkTransport::new(
                    factory(),
                    port,
                    config.rate,
                    config.peripheral_address,
                ))
            }
            TransportKind::V4l2 => Box::new(V4l2Transport::new(address.map(PathBuf::from))),
        };

        debug!(address = ?address, rate_hz = config.rate, "Transport parameters");
        info!(transport = %kind, "Transport resolved");
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::transport::aardvark::tests::FakeAdapter;

    #[test]
    fn test_type_string_selection() {
        assert_eq!(TransportKind::from_type_string(None), TransportKind::Aardvark);
        assert_eq!(
            TransportKind::from_type_string(Some("smbus")),
            TransportKind::Smbus
        );
        assert_eq!(
            TransportKind::from_type_string(Some("AARDVARK")),
            TransportKind::Aardvark
        );
        assert_eq!(
            TransportKind::from_type_string(Some("boson-v4l2")),
            TransportKind::V4l2
        );
        assert_eq!(
            TransportKind::from_type_string(Some("I2CMini")),
            TransportKind::I2cDriver
        );
    }

    #[test]
    fn test_defaults() {
        let config = PortConfig::default();
        assert_eq!(config.kind, TransportKind::Aardvark);
        assert_eq!(config.rate, 400_000);
        assert_eq!(config.peripheral_address, 0x6A);
        assert_eq!(config.header, HeaderStrategy::Atomic);
        assert!(config.address.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let path = std::env::temp_dir().join(format!("fslp-port-{}.toml", std::process::id()));
        let config = PortConfig {
            rate: 100_000,
            header: HeaderStrategy::tolerant(),
            ..PortConfig::new(TransportKind::I2cDriver).with_address("/dev/ttyUSB0")
        };
        config.save_to_file(&path).unwrap();
        let loaded = PortConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PortConfig = toml::from_str("kind = \"smbus\"\naddress = \"1\"\n").unwrap();
        assert_eq!(config.kind, TransportKind::Smbus);
        assert_eq!(config.address.as_deref(), Some("1"));
        assert_eq!(config.peripheral_address, DEFAULT_PERIPHERAL_ADDRESS);
    }

    #[test]
    fn test_aardvark_needs_binding() {
        let resolver = PortResolver::new();
        assert!(!resolver.capability(TransportKind::Aardvark).is_available());
        assert!(matches!(
            resolver.resolve(&PortConfig::default()),
            Err(ConfigError::Unavailable {
                kind: TransportKind::Aardvark,
                ..
            })
        ));
    }

    #[test]
    fn test_aardvark_with_binding() {
        let resolver = PortResolver::new()
            .with_aardvark_driver(Box::new(|| {
                Box::new(FakeAdapter::default()) as Box<dyn AardvarkDriver>
            }));
        assert_eq!(
            resolver.capability(TransportKind::Aardvark),
            Capability::Available
        );

        let mut transport = resolver.resolve(&PortConfig::default()).unwrap();
        assert_eq!(transport.kind(), Some(TransportKind::Aardvark));
        transport.open().unwrap();
        assert!(transport.is_open());

        let bad = PortConfig::default().with_address("first");
        assert!(matches!(
            resolver.resolve(&bad),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_i2cdriver_needs_device() {
        let resolver = PortResolver::new();
        assert!(matches!(
            resolver.resolve(&PortConfig::new(TransportKind::I2cDriver)),
            Err(ConfigError::MissingAddress {
                kind: TransportKind::I2cDriver
            })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rate_not_applied_events() {
        let observer = Arc::new(RecordingObserver::new());
        let resolver = PortResolver::new().with_observer(observer.clone());

        let smbus = PortConfig {
            rate: 100_000,
            ..PortConfig::new(TransportKind::Smbus)
        };
        let transport = resolver.resolve(&smbus).unwrap();
        assert!(!transport.is_open());

        let pod = PortConfig {
            rate: 1_000_000,
            ..PortConfig::new(TransportKind::I2cDriver).with_address("/dev/ttyUSB0")
        };
        resolver.resolve(&pod).unwrap();

        assert_eq!(
            observer.events(),
            vec![
                FslpEvent::RateNotApplied {
                    kind: TransportKind::Smbus,
                    requested: 100_000,
                    effective: 400_000
                },
                FslpEvent::RateNotApplied {
                    kind: TransportKind::I2cDriver,
                    requested: 1_000_000,
                    effective: 400_000
                },
            ]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_v4l2_resolves_without_path() {
        let transport = PortResolver::new()
            .resolve(&PortConfig::new(TransportKind::V4l2))
            .unwrap();
        assert_eq!(transport.kind(), Some(TransportKind::V4l2));
    }
}
