//! Capability Container of a Type 4 Tag and the NDEF File Control TLV it carries
use log::{debug, warn};
use thiserror::Error;

/// CCLEN(2) + mapping version(1) + MLe(2) + MLc(2)
pub const CC_HEADER_LEN: usize = 7;
pub const CC_MIN_LEN: usize = 15;
pub const NDEF_FILE_CONTROL_TAG: u8 = 0x04;
pub const NDEF_FILE_CONTROL_LEN: u8 = 0x06;
pub const NDEF_FILE_ID_HI: u8 = 0xE1;
/// Distance from the tag byte to the last byte (write access) of the TLV
const TLV_LAST_BYTE: usize = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TlvError {
    #[error("CC too short: {0} bytes, expects at least 15 bytes")]
    CcTooShort(usize),
    #[error("CC does not contain expected NDEF File Control TLV")]
    MissingNdefTlv,
    #[error("Unknown NDEF File reference 0x{0:02X}xx in CC")]
    UnexpectedFileIdentifier(u8),
    #[error("CC access at offset {offset} is out of bounds, CC is {len} bytes long")]
    OutOfBounds { offset: usize, len: usize },
}

/// Bounds-checked view over the CC bytes
#[derive(Debug, Copy, Clone)]
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn byte(&self, offset: usize) -> Result<u8, TlvError> {
        self.buf.get(offset).copied().ok_or(TlvError::OutOfBounds {
            offset,
            len: self.buf.len(),
        })
    }

    fn be_u16(&self, offset: usize) -> Result<u16, TlvError> {
        Ok(u16::from_be_bytes([self.byte(offset)?, self.byte(offset + 1)?]))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CcHeader {
    pub cclen: u16,
    pub mapping_version: u8,
    /// Maximum R-APDU data size
    pub mle: u16,
    /// Maximum C-APDU data size
    pub mlc: u16,
}

/// Fields of the NDEF File Control TLV:
/// `[04][06][E1][file no][max size hi][max size lo][read access][write access]`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NdefFileControl {
    /// Offset of the tag byte inside the CC
    pub offset: usize,
    pub length: u8,
    pub file_id: u16,
    pub file_no: u8,
    pub max_ndef_size: u16,
    pub read_access: u8,
    pub write_access: u8,
}

#[derive(Debug, Copy, Clone)]
pub struct CapabilityContainer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> CapabilityContainer<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<CapabilityContainer<'a>, TlvError> {
        if bytes.len() < CC_MIN_LEN {
            return Err(TlvError::CcTooShort(bytes.len()));
        }
        Ok(Self {
            cursor: Cursor { buf: bytes },
        })
    }

    pub fn len(&self) -> usize {
        self.cursor.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.buf.is_empty()
    }

    pub fn header(&self) -> Result<CcHeader, TlvError> {
        Ok(CcHeader {
            cclen: self.cursor.be_u16(0)?,
            mapping_version: self.cursor.byte(2)?,
            mle: self.cursor.be_u16(3)?,
            mlc: self.cursor.be_u16(5)?,
        })
    }

    /// Walk the TLVs following the header up to the NDEF File Control TLV
    pub fn ndef_file_control(&self) -> Result<NdefFileControl, TlvError> {
        let cc = &self.cursor;
        let cclen = self.len();
        let mut offset = CC_HEADER_LEN;
        while offset + TLV_LAST_BYTE < cclen && cc.byte(offset)? != NDEF_FILE_CONTROL_TAG {
            let skip = 2 + cc.byte(offset + 1)? as usize;
            debug!(
                "Skipping TLV 0x{:02X} at offset {} ({} bytes)",
                cc.byte(offset)?,
                offset,
                skip
            );
            offset += skip;
        }
        if offset + TLV_LAST_BYTE >= cclen {
            return Err(TlvError::MissingNdefTlv);
        }

        let file_id_hi = cc.byte(offset + 2)?;
        if file_id_hi != NDEF_FILE_ID_HI {
            return Err(TlvError::UnexpectedFileIdentifier(file_id_hi));
        }
        let length = cc.byte(offset + 1)?;
        if length != NDEF_FILE_CONTROL_LEN {
            warn!(
                "NDEF File Control TLV at offset {} has length {}, expected {}",
                offset, length, NDEF_FILE_CONTROL_LEN
            );
        }
        let file_no = cc.byte(offset + 3)?;
        Ok(NdefFileControl {
            offset,
            length,
            file_id: u16::from_be_bytes([file_id_hi, file_no]),
            file_no,
            max_ndef_size: cc.be_u16(offset + 4)?,
            read_access: cc.byte(offset + 6)?,
            write_access: cc.byte(offset + 7)?,
        })
    }
}
