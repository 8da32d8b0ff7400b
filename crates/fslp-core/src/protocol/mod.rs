//! Protocol module - FSLP frame and command envelope definitions.

pub mod constants;
pub mod envelope;
pub mod header;
pub mod status;

pub use constants::*;
pub use envelope::{
    EnvelopeError, EnvelopeHeader, decode_and_validate, decode_command, encode_command,
    encode_envelope,
};
pub use header::{FrameError, FrameHeader, encode_frame};
pub use status::ReturnCode;
