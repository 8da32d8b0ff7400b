//! FSLP-Core: framing layer for Boson-class thermal camera modules.
//!
//! Every command to the camera travels as an FSLP frame
//! (`8E A1 | len u16 BE | payload`) whose payload is a command envelope
//! (`seq | function id | status | data`, big-endian words). This crate
//! implements both layers over interchangeable byte links.
//!
//! # Architecture
//!
//! - **Transport**: byte links (i2c-dev, I2CDriver pod, Aardvark, V4L2 ioctl, mock)
//! - **Protocol**: constants, frame header, command envelope, return codes
//! - **Codec**: frames over a transport, with selectable header read strategy
//! - **Dispatch**: sequence-numbered request/response exchange
//! - **Validator**: byte-exact conformance checks without hardware
//! - **Config**: port configuration and transport resolution
//! - **Events**: observer pattern for non-fatal anomalies
//!
//! # Example
//!
//! ```no_run
//! use fslp_core::{Dispatcher, FrameCodec, PortConfig, PortGuard, PortResolver, TransportKind};
//!
//! let config = PortConfig::new(TransportKind::Smbus).with_address("2");
//! let transport = PortResolver::new().resolve(&config)?;
//! let port = PortGuard::open(transport)?;
//!
//! let mut dispatcher = Dispatcher::new(FrameCodec::new(port));
//! // DVO_GET_MIPI_STATE, 4 bytes back
//! let _state = dispatcher.dispatch(0x0006_0026, &[], 4)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod protocol;
pub mod transport;
pub mod validator;

// Re-exports for convenience
pub use codec::{FrameCodec, HeaderStrategy};
pub use config::{Capability, ConfigError, PortConfig, PortResolver};
pub use dispatch::{DispatchError, Dispatcher};
pub use events::{FslpEvent, FslpObserver, NullObserver, RecordingObserver, TracingObserver};
pub use protocol::{
    EnvelopeError, EnvelopeHeader, FrameError, FrameHeader, ReturnCode, decode_and_validate,
    encode_command,
};
pub use transport::{
    ErrorCategory, MockTransport, PortGuard, Transport, TransportError, TransportKind,
};
pub use validator::{ProtocolValidator, SuiteReport};
