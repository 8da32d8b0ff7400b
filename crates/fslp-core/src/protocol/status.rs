//! Status words carried in the third envelope field.
//!
//! The camera reports its result as a raw `u32`. Only a subset of the SDK's
//! result table is named here; unknown codes still display as hex.

use std::fmt;

use super::constants::{STATUS_PLACEHOLDER, STATUS_SUCCESS};

/// Raw status word from a command envelope.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(u32);

const NAMES: &[(u32, &str)] = &[
    (0x0000_0000, "R_SUCCESS"),
    (0x0000_0001, "R_UART_UNSPECIFIED_FAILURE"),
    (0x0000_0002, "R_UART_PORT_FAILURE"),
    (0x0000_0003, "R_UART_RECEIVE_TIMEOUT"),
    (0x0000_0004, "R_UART_PORT_ALREADY_OPEN"),
    (0x0000_0110, "R_SDK_API_UNSPECIFIED_FAILURE"),
    (0x0000_0111, "R_SDK_API_NOT_DEFINED"),
    (0x0000_0120, "R_SDK_PKG_UNSPECIFIED_FAILURE"),
    (0x0000_012F, "R_SDK_PKG_BUFFER_OVERFLOW"),
    (0x0000_0130, "R_SDK_DSPCH_UNSPECIFIED_FAILURE"),
    (0x0000_0131, "R_SDK_DSPCH_SEQUENCE_MISMATCH"),
    (0x0000_0132, "R_SDK_DSPCH_ID_MISMATCH"),
    (0x0000_0133, "R_SDK_DSPCH_MALFORMED_STATUS"),
    (0x0000_0140, "R_SDK_TX_UNSPECIFIED_FAILURE"),
    (0x0000_0150, "R_CAM_RX_UNSPECIFIED_FAILURE"),
    (0x0000_0160, "R_CAM_DSPCH_UNSPECIFIED_FAILURE"),
    (0x0000_0161, "R_CAM_DSPCH_BAD_CMD_ID"),
    (0x0000_0162, "R_CAM_DSPCH_BAD_PAYLOAD_STATUS"),
    (0x0000_0170, "R_CAM_PKG_UNSPECIFIED_FAILURE"),
    (0x0000_017D, "R_CAM_PKG_INSUFFICIENT_BYTES"),
    (0x0000_017E, "R_CAM_PKG_EXCESS_BYTES"),
    (0x0000_017F, "R_CAM_PKG_BUFFER_OVERFLOW"),
    (0x0000_0180, "R_CAM_API_UNSPECIFIED_FAILURE"),
    (0x0000_0181, "R_CAM_API_INVALID_INPUT"),
    (0x0000_0190, "R_CAM_TX_UNSPECIFIED_FAILURE"),
    (0x0000_01A0, "R_API_RX_UNSPECIFIED_FAILURE"),
    (0x0000_01B0, "R_CAM_FEATURE_NOT_ENABLED"),
    (0x0000_0201, "FLR_ERROR"),
    (0x0000_0202, "FLR_NOT_READY"),
    (0x0000_0203, "FLR_RANGE_ERROR"),
    (0x0000_0204, "FLR_CHECKSUM_ERROR"),
    (0x0000_0205, "FLR_BAD_ARG_POINTER_ERROR"),
    (0x0000_0206, "FLR_DATA_SIZE_ERROR"),
    (0x0000_0207, "FLR_UNDEFINED_FUNCTION_ERROR"),
    (0x0000_0208, "FLR_ILLEGAL_ADDRESS_ERROR"),
    (0x0000_0209, "FLR_BAD_OUT_TYPE"),
    (0x0000_020A, "FLR_BAD_OUT_INTERFACE"),
    (0x0000_020B, "FLR_DEPRECATED_FUNCTION_ERROR"),
    (0x0000_0265, "FLR_COMM_PORT_NOT_OPEN"),
    (0x0000_0266, "FLR_COMM_INVALID_PORT_ERROR"),
    (0x0000_0267, "FLR_COMM_RANGE_ERROR"),
    (0x0000_0268, "FLR_ERROR_CREATING_COMM"),
    (0x0000_0269, "FLR_ERROR_STARTING_COMM"),
    (0x0000_026A, "FLR_ERROR_CLOSING_COMM"),
    (0x0000_026B, "FLR_COMM_CHECKSUM_ERROR"),
    (0x0000_026C, "FLR_COMM_NO_DEV"),
    (0x0000_026D, "FLR_COMM_TIMEOUT_ERROR"),
    (0x0000_026E, "FLR_COMM_ERROR_READING_COMM"),
    (0x0000_026F, "FLR_COMM_COUNT_ERROR"),
    (0x0000_027E, "FLR_OPERATION_CANCELED"),
    (0x0000_027F, "FLR_UNDEFINED_ERROR_CODE"),
    (0x0000_0280, "FLR_LEN_NOT_SUBBLOCK_BOUNDARY"),
    (0x0000_0281, "FLR_CONFIG_ERROR"),
    (0x0000_0282, "FLR_I2C_ERROR"),
    (0x0000_0283, "FLR_CAM_BUSY"),
    (0x0000_0284, "FLR_HEATER_ERROR"),
    (0x0000_0285, "FLR_WINDOW_ERROR"),
    (0x0000_0286, "FLR_VBATT_ERROR"),
    (0x0000_0320, "FLR_RES_NOT_AVAILABLE"),
    (0x0000_0321, "FLR_RES_NOT_IMPLEMENTED"),
    (0x0000_0322, "FLR_RES_RANGE_ERROR"),
    (0xFFFF_FFFF, "STATUS_PLACEHOLDER"),
];

impl ReturnCode {
    pub const SUCCESS: Self = Self(STATUS_SUCCESS);
    pub const PLACEHOLDER: Self = Self(STATUS_PLACEHOLDER);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        self.0 == STATUS_SUCCESS
    }

    /// SDK name for this code, if it is one we know.
    pub fn name(&self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }
}

impl From<u32> for ReturnCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:08X} ({})", self.0, name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReturnCode({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_names() {
        assert_eq!(ReturnCode::SUCCESS.name(), Some("R_SUCCESS"));
        assert_eq!(
            ReturnCode::new(0x131).name(),
            Some("R_SDK_DSPCH_SEQUENCE_MISMATCH")
        );
        assert_eq!(ReturnCode::new(0x283).to_string(), "0x00000283 (FLR_CAM_BUSY)");
    }

    #[test]
    fn test_unknown_code_displays_hex() {
        let code = ReturnCode::new(0x1234_5678);
        assert_eq!(code.name(), None);
        assert_eq!(code.to_string(), "0x12345678");
        assert!(!code.is_success());
    }
}
