//! PC/SC readers as NFC devices
use crate::desfire::Transport;
use crate::error::TransportError;
use crate::nfc::{MAX_DEVICES, NfcContext, NfcDevice, Tag, UnreachableTag};
use log::{debug, error, info, warn};
use pcsc::{Disposition, Protocols, Scope, ShareMode};
use std::ffi::CString;
use std::fmt::{Debug, Formatter};

pub struct PcscContext {
    context: pcsc::Context,
}

impl Debug for PcscContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PcscContext")
    }
}

impl PcscContext {
    pub fn establish() -> Result<PcscContext, TransportError> {
        let context = pcsc::Context::establish(Scope::User).map_err(TransportError::Context)?;
        Ok(Self { context })
    }

    fn readers(&self) -> Result<Vec<CString>, TransportError> {
        match self.context.list_readers_owned() {
            Ok(readers) => Ok(readers),
            Err(pcsc::Error::NoReadersAvailable) => Ok(vec![]),
            Err(e) => Err(TransportError::ListReaders(e)),
        }
    }
}

impl NfcContext for PcscContext {
    type Device = PcscDevice;

    fn list_devices(&self) -> Result<Vec<String>, TransportError> {
        let mut readers: Vec<String> = self
            .readers()?
            .iter()
            .map(|reader| reader.to_string_lossy().into_owned())
            .collect();
        readers.truncate(MAX_DEVICES);
        debug!("PC/SC readers: {:?}", readers);
        Ok(readers)
    }

    fn open_device(&self, connstring: &str) -> Result<PcscDevice, TransportError> {
        let reader = CString::new(connstring)
            .map_err(|_| TransportError::InvalidReaderName(connstring.to_string()))?;
        if !self.readers()?.contains(&reader) {
            return Err(TransportError::Reader(
                connstring.to_string(),
                pcsc::Error::UnknownReader,
            ));
        }
        info!("Opened reader '{}'", connstring);
        Ok(PcscDevice {
            context: self.context.clone(),
            name: connstring.to_string(),
            reader,
        })
    }
}

pub struct PcscDevice {
    context: pcsc::Context,
    name: String,
    reader: CString,
}

impl Debug for PcscDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PcscDevice({})", self.name)
    }
}

impl NfcDevice for PcscDevice {
    type Tag = Tag<PcscCard>;

    fn name(&self) -> &str {
        &self.name
    }

    /// A PC/SC reader exposes at most one card
    fn tags(&mut self) -> Result<Vec<Result<Tag<PcscCard>, UnreachableTag>>, TransportError> {
        let card = match self
            .context
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard) | Err(pcsc::Error::RemovedCard) => {
                debug!("No card in reader '{}'", self.name);
                return Ok(vec![]);
            }
            Err(e) if is_card_error(&e) => {
                warn!("Card in reader '{}' refused the connection: {}", self.name, e);
                return Ok(vec![Err(UnreachableTag {
                    device: self.name.clone(),
                    source: TransportError::Card(self.name.clone(), e),
                })]);
            }
            Err(e) => return Err(TransportError::Reader(self.name.clone(), e)),
        };
        debug!("Connected to card in reader '{}'", self.name);
        Ok(vec![Ok(Tag::identify(PcscCard {
            card: Some(card),
            reader: self.name.clone(),
        }))])
    }
}

/// Connect errors caused by the card in the field, as opposed to the reader
/// or the PC/SC service
fn is_card_error(e: &pcsc::Error) -> bool {
    matches!(
        e,
        pcsc::Error::SharingViolation
            | pcsc::Error::UnresponsiveCard
            | pcsc::Error::UnpoweredCard
            | pcsc::Error::UnsupportedCard
            | pcsc::Error::ResetCard
            | pcsc::Error::ProtoMismatch
            | pcsc::Error::UnknownCard
            | pcsc::Error::CardUnsupported
            | pcsc::Error::InvalidAtr
    )
}

pub struct PcscCard {
    card: Option<pcsc::Card>,
    reader: String,
}

impl Debug for PcscCard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscCard")
            .field("reader", &self.reader)
            .field("connected", &self.card.is_some())
            .finish()
    }
}

impl Transport for PcscCard {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::Released)?;
        let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        let resp = card
            .transmit(apdu, &mut buffer)
            .map_err(TransportError::Transmit)?;
        Ok(resp.to_vec())
    }

    fn release(&mut self) {
        if let Some(card) = self.card.take() {
            match card.disconnect(Disposition::LeaveCard) {
                Ok(()) => debug!("Disconnected card in reader '{}'", self.reader),
                Err((_, e)) => error!("Failed to disconnect card in reader '{}': {}", self.reader, e),
            }
        }
    }
}

impl Drop for PcscCard {
    fn drop(&mut self) {
        self.release();
    }
}
