// Frame header
pub const MAGIC_TOKEN: [u8; 2] = [0x8E, 0xA1];
/// Alternate first-byte variant observed from some modules in the field.
pub const ALT_MAGIC_TOKEN: [u8; 2] = [0x7E, 0xA1];
pub const FRAME_HEADER_SIZE: usize = 4;
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

// Command envelope
pub const ENVELOPE_HEADER_SIZE: usize = 12;
pub const STATUS_PLACEHOLDER: u32 = 0xFFFF_FFFF;
pub const STATUS_SUCCESS: u32 = 0x0000_0000;
pub const MAX_ENVELOPE_DATA: usize = MAX_FRAME_PAYLOAD - ENVELOPE_HEADER_SIZE;

// I2C defaults
pub const DEFAULT_PERIPHERAL_ADDRESS: u8 = 0x6A;
pub const DEFAULT_I2C_RATE_HZ: u32 = 400_000;
pub const DEFAULT_SMBUS_BUS: u32 = 2;
pub const DEFAULT_AARDVARK_PORT: u16 = 0;
/// Aardvark bus lock timeout; 450 ms is the adapter maximum.
pub const AARDVARK_BUS_TIMEOUT_MS: u16 = 450;

// V4L2 control channel
pub const IOCTL_MAX_DATA: usize = 256;
pub const IOCTL_BLOCK_SIZE: usize = 8 + IOCTL_MAX_DATA;
/// `_IOWR('F', 0x01, struct { u32 tx_len; u32 rx_len; u8 data[256]; })`
pub const IOCTL_FSLP_FRAME: u32 =
    (3 << 30) | ((IOCTL_BLOCK_SIZE as u32) << 16) | ((b'F' as u32) << 8) | 0x01;
pub const V4L2_SUBDEV_PREFIX: &str = "v4l-subdev";
pub const V4L2_DEVICE_DIR: &str = "/dev";

// I2CDriver serial pod
pub const I2CDRIVER_BAUD: u32 = 1_000_000;
pub const I2CDRIVER_CHUNK: usize = 64;
pub const I2CDRIVER_SCAN_FIRST: u8 = 0x08;
pub const I2CDRIVER_SCAN_LEN: usize = 112;
