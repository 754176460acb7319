//! Reader and tag abstractions the NDEF writer is driven through
use crate::desfire::{Desfire, Transport};
use crate::desfire_const;
use crate::desfire_proto::Aid;
use crate::error::{DesfireError, TransportError};
use crate::key::DesfireKey;
use log::debug;
use thiserror::Error;

/// Upper bound on the number of readers handled in one run
pub const MAX_DEVICES: usize = 8;

pub trait NfcContext {
    type Device: NfcDevice;

    /// Connection strings of the attached readers
    fn list_devices(&self) -> Result<Vec<String>, TransportError>;

    fn open_device(&self, connstring: &str) -> Result<Self::Device, TransportError>;
}

pub trait NfcDevice {
    type Tag: DesfireTag;

    fn name(&self) -> &str;

    /// Candidate tags currently in the field of the reader. A tag that is
    /// present but refuses the connection is listed as `Err`, the outer error
    /// is reserved for the reader itself failing.
    fn tags(&mut self) -> Result<Vec<Result<Self::Tag, UnreachableTag>>, TransportError>;
}

/// A tag seen in the field of a reader that could not be connected to
#[derive(Error, Debug)]
#[error("Can't connect to tag in '{device}': {source}")]
pub struct UnreachableTag {
    pub device: String,
    #[source]
    pub source: TransportError,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TagType {
    Desfire,
    Other,
}

pub trait NfcTag {
    fn tag_type(&self) -> TagType;
    fn friendly_name(&self) -> &str;
    fn uid(&self) -> &str;
}

/// DESFire operations needed to provision the NDEF file
pub trait DesfireTag: NfcTag {
    fn connect(&mut self) -> Result<(), DesfireError>;
    fn select_application(&mut self, aid: Aid) -> Result<(), DesfireError>;
    fn authenticate(&mut self, key_no: u8, key: &DesfireKey) -> Result<(), DesfireError>;
    fn read_data(
        &mut self,
        file_no: u8,
        offset: usize,
        length: usize,
    ) -> Result<Vec<u8>, DesfireError>;
    fn write_data(
        &mut self,
        file_no: u8,
        offset: usize,
        data: &[u8],
    ) -> Result<usize, DesfireError>;
    fn disconnect(&mut self);
}

/// A card found in a reader, identified through `GetVersion`
pub struct Tag<T: Transport> {
    tag_type: TagType,
    friendly_name: String,
    uid: String,
    desfire: Desfire<T>,
}

impl<T: Transport> std::fmt::Debug for Tag<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag")
            .field("tag_type", &self.tag_type)
            .field("friendly_name", &self.friendly_name)
            .field("uid", &self.uid)
            .finish()
    }
}

impl<T: Transport> Tag<T> {
    pub fn identify(transport: T) -> Tag<T> {
        let mut desfire = Desfire::new(transport);
        let version = desfire.get_version();
        let anticollision_uid = (|| {
            let resp = desfire
                .transport_mut()
                .transmit(&desfire_const::GET_DATA_UID)
                .ok()?;
            match resp.split_last_chunk::<2>() {
                Some((uid, [0x90, 0x00])) if !uid.is_empty() => Some(hex::encode(uid)),
                _ => {
                    debug!("GET DATA (UID) rejected: {:02X?}", resp);
                    None
                }
            }
        })();

        let (tag_type, friendly_name, version_uid) = match &version {
            Ok(version) if version.is_desfire() => (
                TagType::Desfire,
                version.friendly_name().to_string(),
                Some(hex::encode(version.uid)),
            ),
            Ok(version) => {
                debug!("Not a DESFire: {:02X?}", version.hardware);
                (TagType::Other, "Unknown tag".to_string(), None)
            }
            Err(e) => {
                debug!("GetVersion failed, not a DESFire: {}", e);
                (TagType::Other, "Unknown tag".to_string(), None)
            }
        };
        let uid = anticollision_uid
            .or(version_uid)
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            tag_type,
            friendly_name,
            uid,
            desfire,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.desfire.transport_mut()
    }
}

impl<T: Transport> NfcTag for Tag<T> {
    fn tag_type(&self) -> TagType {
        self.tag_type
    }

    fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    fn uid(&self) -> &str {
        &self.uid
    }
}

impl<T: Transport> DesfireTag for Tag<T> {
    /// Start from the PICC level so no earlier application or
    /// authentication state leaks into this session
    fn connect(&mut self) -> Result<(), DesfireError> {
        self.desfire.select_application(Aid::new(desfire_const::PICC_AID))
    }

    fn select_application(&mut self, aid: Aid) -> Result<(), DesfireError> {
        self.desfire.select_application(aid)
    }

    fn authenticate(&mut self, key_no: u8, key: &DesfireKey) -> Result<(), DesfireError> {
        self.desfire.authenticate(key_no, key)
    }

    fn read_data(
        &mut self,
        file_no: u8,
        offset: usize,
        length: usize,
    ) -> Result<Vec<u8>, DesfireError> {
        self.desfire.read_data(file_no, offset, length)
    }

    fn write_data(
        &mut self,
        file_no: u8,
        offset: usize,
        data: &[u8],
    ) -> Result<usize, DesfireError> {
        self.desfire.write_data(file_no, offset, data)
    }

    fn disconnect(&mut self) {
        self.desfire.release();
    }
}
