// Native command codes

pub const GET_VERSION: u8 = 0x60;
pub const SELECT_APPLICATION: u8 = 0x5A;
pub const AUTHENTICATE_LEGACY: u8 = 0x0A;
pub const READ_DATA: u8 = 0xBD;
pub const WRITE_DATA: u8 = 0x3D;
pub const ADDITIONAL_FRAME: u8 = 0xAF;

// ISO 7816-4 wrapping of native commands
pub const WRAPPED_CLA: u8 = 0x90;
pub const WRAPPED_SW1: u8 = 0x91;

// PC/SC pseudo APDU returning the anticollision UID
pub const GET_DATA_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

// Status codes (SW2 of a wrapped response)
pub const OPERATION_OK: u8 = 0x00;
pub const NO_CHANGES: u8 = 0x0C;
pub const OUT_OF_EEPROM_ERROR: u8 = 0x0E;
pub const ILLEGAL_COMMAND_CODE: u8 = 0x1C;
pub const INTEGRITY_ERROR: u8 = 0x1E;
pub const NO_SUCH_KEY: u8 = 0x40;
pub const LENGTH_ERROR: u8 = 0x7E;
pub const PERMISSION_DENIED: u8 = 0x9D;
pub const PARAMETER_ERROR: u8 = 0x9E;
pub const APPLICATION_NOT_FOUND: u8 = 0xA0;
pub const APPL_INTEGRITY_ERROR: u8 = 0xA1;
pub const AUTHENTICATION_ERROR: u8 = 0xAE;
pub const BOUNDARY_ERROR: u8 = 0xBE;
pub const PICC_INTEGRITY_ERROR: u8 = 0xC1;
pub const COMMAND_ABORTED: u8 = 0xCA;
pub const PICC_DISABLED_ERROR: u8 = 0xCD;
pub const COUNT_ERROR: u8 = 0xCE;
pub const DUPLICATE_ERROR: u8 = 0xDE;
pub const EEPROM_ERROR: u8 = 0xEE;
pub const FILE_NOT_FOUND: u8 = 0xF0;
pub const FILE_INTEGRITY_ERROR: u8 = 0xF1;

// Frame sizes for chained WriteData: the first frame also carries the
// 7-byte file/offset/length header.
pub const MAX_FIRST_FRAME_DATA: usize = 52;
pub const MAX_FRAME_DATA: usize = 59;

// GetVersion hardware identification
pub const NXP_VENDOR_ID: u8 = 0x04;
pub const DESFIRE_HW_TYPE: u8 = 0x01;

// NFC Forum Type 4 Tag mapping on DESFire
pub const PICC_AID: u32 = 0x000000;
pub const NDEF_TAG_APPLICATION_AID: u32 = 0xEEEE10;
pub const NDEF_APPLICATION_KEY_NO: u8 = 0;
pub const CC_FILE_NO: u8 = 0x03;
