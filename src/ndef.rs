//! NDEF file content of a Type 4 Tag: `NLEN` (2 bytes, big-endian) followed by the message
use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

pub const NLEN_LEN: usize = 2;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Smart Poster record pointing to libnfc.org, written when no message is supplied
pub const DEFAULT_NDEF_MESSAGE: [u8; 33] = [
    0xd1, 0x02, 0x1c, 0x53, 0x70, 0x91, 0x01, 0x09, 0x54, 0x02, 0x65, 0x6e, 0x4c, 0x69, 0x62,
    0x6e, 0x66, 0x63, 0x51, 0x01, 0x0b, 0x55, 0x03, 0x6c, 0x69, 0x62, 0x6e, 0x66, 0x63, 0x2e,
    0x6f, 0x72, 0x67,
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("NDEF message of {0} bytes does not fit the 16-bit NLEN field")]
    PayloadTooLarge(usize),
    #[error("NDEF file of {0} bytes is too short to contain NLEN")]
    MissingNlen(usize),
    #[error("NLEN announces {nlen} bytes but only {available} bytes follow")]
    Truncated { nlen: usize, available: usize },
}

/// Prefix `payload` with its big-endian length
pub fn frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let nlen = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;
    let mut framed = Vec::with_capacity(payload.len() + NLEN_LEN);
    framed.extend_from_slice(&nlen.to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Return the message announced by the NLEN prefix of `file`
pub fn deframe(file: &[u8]) -> Result<&[u8], FrameError> {
    if file.len() < NLEN_LEN {
        return Err(FrameError::MissingNlen(file.len()));
    }
    let nlen = BigEndian::read_u16(file) as usize;
    let body = &file[NLEN_LEN..];
    body.get(..nlen).ok_or(FrameError::Truncated {
        nlen,
        available: body.len(),
    })
}

/// A framed message, ready to be written at offset 0 of the NDEF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefMessage {
    framed: Vec<u8>,
}

#[allow(clippy::len_without_is_empty)]
impl NdefMessage {
    pub fn new(payload: &[u8]) -> Result<NdefMessage, FrameError> {
        Ok(Self {
            framed: frame(payload)?,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.framed[NLEN_LEN..]
    }

    /// Length of the framed message, NLEN included
    pub fn len(&self) -> usize {
        self.framed.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.framed
    }
}

impl Default for NdefMessage {
    fn default() -> Self {
        let mut framed = Vec::with_capacity(DEFAULT_NDEF_MESSAGE.len() + NLEN_LEN);
        framed.extend_from_slice(&(DEFAULT_NDEF_MESSAGE.len() as u16).to_be_bytes());
        framed.extend_from_slice(&DEFAULT_NDEF_MESSAGE);
        Self { framed }
    }
}
