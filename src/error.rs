use crate::desfire_proto::DesfireStatus;
use thiserror::Error;

/// Failures of the reader/card transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to establish PC/SC context: {0}")]
    Context(#[source] pcsc::Error),
    #[error("Failed to list PC/SC readers: {0}")]
    ListReaders(#[source] pcsc::Error),
    #[error("Reader '{0}' is not available: {1}")]
    Reader(String, #[source] pcsc::Error),
    #[error("Card in reader '{0}' refused the connection: {1}")]
    Card(String, #[source] pcsc::Error),
    #[error("Reader name '{0}' contains an interior NUL byte")]
    InvalidReaderName(String),
    #[error("APDU exchange failed: {0}")]
    Transmit(#[source] pcsc::Error),
    #[error("Card handle has already been released")]
    Released,
}

/// Failures of the DESFire native protocol
#[derive(Error, Debug)]
pub enum DesfireError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Card returned status {0:?}")]
    Status(DesfireStatus),
    #[error("Card returned unknown status 0x{0:02X}")]
    UnknownStatus(u8),
    #[error("Unexpected ISO status word {0:02X}{1:02X}")]
    StatusWord(u8, u8),
    #[error("Response is too short, expects at least 2 bytes, got {0} bytes")]
    ShortResponse(usize),
    #[error("Unexpected response length, expects {expected} bytes, got {actual} bytes")]
    ResponseLength { expected: usize, actual: usize },
    #[error("Authentication failed: card did not prove knowledge of the key")]
    AuthenticationFailed,
    #[error("Value {0} does not fit in a 24-bit DESFire field")]
    OutOfRange(usize),
}
