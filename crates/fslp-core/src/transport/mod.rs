//! Transport layer module.

pub mod aardvark;
pub mod guard;
pub mod i2cdriver;
pub mod mock;
pub mod smbus;
pub mod traits;
pub mod v4l2;

pub use aardvark::{AardvarkDriver, AardvarkTransport, DriverStatus};
pub use guard::PortGuard;
pub use i2cdriver::I2cDriverTransport;
pub use mock::{MockTransport, ReadFault};
pub use smbus::SmbusTransport;
pub use traits::{ErrorCategory, Transport, TransportError, TransportKind};
pub use v4l2::{ControlBlock, V4l2Transport};
