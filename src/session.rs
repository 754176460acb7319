//! Per-run and per-tag sequencing of the NDEF write
use crate::desfire_const;
use crate::desfire_proto::Aid;
use crate::error::{DesfireError, TransportError};
use crate::key::{DES_KEY_LEN, DesfireKey};
use crate::ndef::NdefMessage;
use crate::nfc::{DesfireTag, MAX_DEVICES, NfcContext, NfcDevice, NfcTag, TagType};
use crate::tlv::{CC_MIN_LEN, CapabilityContainer, NdefFileControl, TlvError};
use log::{debug, error, info, warn};
use std::io::{self, BufRead, Write};
use std::ops::{Deref, DerefMut};
use thiserror::Error;

const UNKNOWN_UID: &str = "unknown";

/// Errors that abort the whole run
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("No NFC device found.")]
    NoDevice,
    #[error("Listing NFC devices failed: {0}")]
    ListDevices(#[source] TransportError),
    #[error("Error listing tags on '{device}': {source}")]
    EnumerateTags {
        device: String,
        #[source]
        source: TransportError,
    },
    #[error(
        "Application selection failed. Try mifare-desfire-create-ndef before running mifare-desfire-write-ndef: {0}"
    )]
    SelectApplication(#[source] DesfireError),
    #[error("Authentication with NDEF Tag Application master key failed: {0}")]
    Authenticate(#[source] DesfireError),
    #[error("Read CC len failed: {0}")]
    ReadCcLength(#[source] DesfireError),
    #[error("Read CC data failed: {0}")]
    ReadCc(#[source] DesfireError),
    #[error(transparent)]
    Cc(#[from] TlvError),
    #[error("Supplied NDEF larger than max NDEF size: {message_len} bytes > {max_ndef_size} bytes")]
    Capacity {
        message_len: usize,
        max_ndef_size: u16,
    },
    #[error("Write data failed: {0}")]
    Write(#[source] DesfireError),
    #[error("Write data incomplete: {written} of {expected} bytes written")]
    ShortWrite { written: usize, expected: usize },
    #[error("Failed to write progress output: {0}")]
    Output(#[from] io::Error),
}

/// Outcome of a failed tag: either skip to the next tag or stop everything
#[derive(Error, Debug)]
pub enum TagFailure {
    #[error("Can't connect to Mifare DESFire target {uid}: {source}")]
    Recoverable {
        uid: String,
        #[source]
        source: DesfireError,
    },
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl From<io::Error> for TagFailure {
    fn from(e: io::Error) -> Self {
        TagFailure::Fatal(FatalError::Output(e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// NDEF message written
    Done,
    /// User answered no at the prompt
    Declined,
    /// Not a DESFire
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReport {
    pub device: String,
    pub uid: String,
    pub outcome: TagOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub tags: Vec<TagReport>,
    /// Devices that could not be opened
    pub device_failures: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.device_failures.is_empty()
            && !self
                .tags
                .iter()
                .any(|t| matches!(t.outcome, TagOutcome::Failed(_)))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Asks the user whether to write the tag that was just reported
pub trait Confirm {
    fn confirm(&mut self) -> io::Result<bool>;
}

/// Reads the answer from a line of input: anything starting with `y` or `Y` is a yes
#[derive(Debug)]
pub struct LineConfirm<R: BufRead> {
    input: R,
}

impl<R: BufRead> LineConfirm<R> {
    pub fn new(input: R) -> LineConfirm<R> {
        Self { input }
    }
}

impl<R: BufRead> Confirm for LineConfirm<R> {
    fn confirm(&mut self) -> io::Result<bool> {
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.starts_with(['y', 'Y']))
    }
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub key: [u8; DES_KEY_LEN],
    pub message: NdefMessage,
    pub interactive: bool,
}

/// Disconnects the tag when the per-tag processing ends, whatever the outcome
struct ConnectedTag<'t, T: DesfireTag> {
    tag: &'t mut T,
}

impl<T: DesfireTag> Deref for ConnectedTag<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.tag
    }
}

impl<T: DesfireTag> DerefMut for ConnectedTag<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.tag
    }
}

impl<T: DesfireTag> Drop for ConnectedTag<'_, T> {
    fn drop(&mut self) {
        debug!("Disconnecting tag {}", self.tag.uid());
        self.tag.disconnect();
    }
}

pub struct NdefWriter<'a, W: Write, C: Confirm> {
    options: &'a WriteOptions,
    out: W,
    confirm: C,
}

impl<'a, W: Write, C: Confirm> NdefWriter<'a, W, C> {
    pub fn new(options: &'a WriteOptions, out: W, confirm: C) -> NdefWriter<'a, W, C> {
        Self {
            options,
            out,
            confirm,
        }
    }

    /// Write the NDEF message on every DESFire found on every reader
    pub fn write_ndef<N: NfcContext>(&mut self, nfc: &N) -> Result<RunReport, FatalError> {
        let devices = nfc.list_devices().map_err(FatalError::ListDevices)?;
        if devices.is_empty() {
            return Err(FatalError::NoDevice);
        }
        let mut report = RunReport::default();
        for connstring in devices.iter().take(MAX_DEVICES) {
            let mut device = match nfc.open_device(connstring) {
                Ok(device) => device,
                Err(e) => {
                    warn!("nfc_open() failed on '{}': {}", connstring, e);
                    report.device_failures.push(connstring.clone());
                    continue;
                }
            };
            let tags = device.tags().map_err(|source| FatalError::EnumerateTags {
                device: connstring.clone(),
                source,
            })?;
            debug!("{} candidate tag(s) on '{}'", tags.len(), device.name());
            for candidate in tags {
                let mut tag = match candidate {
                    Ok(tag) => tag,
                    Err(unreachable) => {
                        warn!("{}", unreachable);
                        report.tags.push(TagReport {
                            device: connstring.clone(),
                            uid: UNKNOWN_UID.to_string(),
                            outcome: TagOutcome::Failed(unreachable.to_string()),
                        });
                        continue;
                    }
                };
                let uid = tag.uid().to_string();
                let outcome = match self.process_tag(&mut tag) {
                    Ok(outcome) => outcome,
                    Err(TagFailure::Fatal(e)) => {
                        error!("Tag {} on '{}': {}", uid, connstring, e);
                        return Err(e);
                    }
                    Err(failure @ TagFailure::Recoverable { .. }) => {
                        warn!("{}", failure);
                        TagOutcome::Failed(failure.to_string())
                    }
                };
                info!("Tag {} on '{}': {:?}", uid, connstring, outcome);
                report.tags.push(TagReport {
                    device: connstring.clone(),
                    uid,
                    outcome,
                });
            }
        }
        Ok(report)
    }

    fn process_tag<T: DesfireTag>(&mut self, tag: &mut T) -> Result<TagOutcome, TagFailure> {
        if tag.tag_type() != TagType::Desfire {
            debug!("Skipping {} with UID {}", tag.friendly_name(), tag.uid());
            return Ok(TagOutcome::Skipped);
        }

        write!(
            self.out,
            "Found {} with UID {}. ",
            tag.friendly_name(),
            tag.uid()
        )?;
        if self.options.interactive {
            write!(self.out, "Write NDEF [yN] ")?;
            self.out.flush()?;
            if !self.confirm.confirm()? {
                return Ok(TagOutcome::Declined);
            }
        } else {
            writeln!(self.out)?;
        }

        tag.connect().map_err(|source| TagFailure::Recoverable {
            uid: tag.uid().to_string(),
            source,
        })?;
        let mut tag = ConnectedTag { tag };

        tag.select_application(Aid::new(desfire_const::NDEF_TAG_APPLICATION_AID))
            .map_err(FatalError::SelectApplication)?;
        {
            let key = DesfireKey::with_version(self.options.key);
            tag.authenticate(desfire_const::NDEF_APPLICATION_KEY_NO, &key)
                .map_err(FatalError::Authenticate)?;
        }

        let file = read_ndef_file_control(&mut *tag)?;
        writeln!(self.out, "Max NDEF size: {} bytes", file.max_ndef_size)?;
        let message = self.options.message.as_bytes();
        if message.len() > file.max_ndef_size as usize {
            return Err(FatalError::Capacity {
                message_len: message.len(),
                max_ndef_size: file.max_ndef_size,
            }
            .into());
        }

        let written = tag
            .write_data(file.file_no, 0, message)
            .map_err(FatalError::Write)?;
        if written != message.len() {
            return Err(FatalError::ShortWrite {
                written,
                expected: message.len(),
            }
            .into());
        }
        Ok(TagOutcome::Done)
    }
}

/// Read the Capability Container file and locate the NDEF file it describes
fn read_ndef_file_control<T: DesfireTag>(tag: &mut T) -> Result<NdefFileControl, FatalError> {
    let len = tag
        .read_data(desfire_const::CC_FILE_NO, 0, 2)
        .map_err(FatalError::ReadCcLength)?;
    let cclen = match len.as_slice() {
        [hi, lo] => u16::from_be_bytes([*hi, *lo]) as usize,
        _ => {
            return Err(FatalError::ReadCcLength(DesfireError::ResponseLength {
                expected: 2,
                actual: len.len(),
            }));
        }
    };
    if cclen < CC_MIN_LEN {
        return Err(TlvError::CcTooShort(cclen).into());
    }
    let cc_data = tag
        .read_data(desfire_const::CC_FILE_NO, 0, cclen)
        .map_err(FatalError::ReadCc)?;
    let cc = CapabilityContainer::new(&cc_data)?;
    debug!("CC header: {:?}", cc.header()?);
    let file = cc.ndef_file_control()?;
    debug!("NDEF File Control TLV: {:?}", file);
    Ok(file)
}
