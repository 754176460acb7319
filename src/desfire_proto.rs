use crate::desfire_const;
use crate::error::DesfireError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io;

const MAX_U24: u32 = 0x00FF_FFFF;

pub trait Encode {
    type Error;
    fn encode<T: WriteBytesExt>(&self, out: &mut T) -> Result<(), Self::Error>;
}

pub trait Decode {
    type Error;
    fn decode<T: ReadBytesExt>(input: &mut T) -> Result<Self, Self::Error>
    where
        Self: Sized;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum DesfireStatus {
    OperationOk = desfire_const::OPERATION_OK,
    NoChanges = desfire_const::NO_CHANGES,
    OutOfEepromError = desfire_const::OUT_OF_EEPROM_ERROR,
    IllegalCommandCode = desfire_const::ILLEGAL_COMMAND_CODE,
    IntegrityError = desfire_const::INTEGRITY_ERROR,
    NoSuchKey = desfire_const::NO_SUCH_KEY,
    LengthError = desfire_const::LENGTH_ERROR,
    PermissionDenied = desfire_const::PERMISSION_DENIED,
    ParameterError = desfire_const::PARAMETER_ERROR,
    ApplicationNotFound = desfire_const::APPLICATION_NOT_FOUND,
    ApplIntegrityError = desfire_const::APPL_INTEGRITY_ERROR,
    AuthenticationError = desfire_const::AUTHENTICATION_ERROR,
    AdditionalFrame = desfire_const::ADDITIONAL_FRAME,
    BoundaryError = desfire_const::BOUNDARY_ERROR,
    PiccIntegrityError = desfire_const::PICC_INTEGRITY_ERROR,
    CommandAborted = desfire_const::COMMAND_ABORTED,
    PiccDisabledError = desfire_const::PICC_DISABLED_ERROR,
    CountError = desfire_const::COUNT_ERROR,
    DuplicateError = desfire_const::DUPLICATE_ERROR,
    EepromError = desfire_const::EEPROM_ERROR,
    FileNotFound = desfire_const::FILE_NOT_FOUND,
    FileIntegrityError = desfire_const::FILE_INTEGRITY_ERROR,
}

/// 24-bit DESFire application identifier, sent little-endian on the wire
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Aid(u32);

impl Aid {
    pub fn new(aid: u32) -> Aid {
        Aid(aid & MAX_U24)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Encode for Aid {
    type Error = io::Error;
    fn encode<T: WriteBytesExt>(&self, out: &mut T) -> Result<(), Self::Error> {
        out.write_u24::<LittleEndian>(self.0)
    }
}

fn u24(value: usize) -> Result<u32, DesfireError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v <= MAX_U24)
        .ok_or(DesfireError::OutOfRange(value))
}

/// A native DESFire command: one command byte followed by its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCommand {
    pub code: u8,
    pub data: Vec<u8>,
}

impl NativeCommand {
    pub fn new(code: u8) -> NativeCommand {
        Self { code, data: vec![] }
    }

    pub fn with_data(code: u8, data: Vec<u8>) -> NativeCommand {
        Self { code, data }
    }

    pub fn additional_frame(data: &[u8]) -> NativeCommand {
        Self::with_data(desfire_const::ADDITIONAL_FRAME, data.to_vec())
    }

    pub fn select_application(aid: Aid) -> Result<NativeCommand, DesfireError> {
        let mut data = Vec::with_capacity(3);
        aid.encode(&mut data).map_err(|_| DesfireError::OutOfRange(aid.value() as usize))?;
        Ok(Self::with_data(desfire_const::SELECT_APPLICATION, data))
    }

    /// `ReadData` / `WriteData` header: file number, 24-bit offset, 24-bit length
    pub fn file_access(
        code: u8,
        file_no: u8,
        offset: usize,
        length: usize,
    ) -> Result<NativeCommand, DesfireError> {
        let offset = u24(offset)?;
        let length = u24(length)?;
        let mut data = Vec::with_capacity(7);
        (|| -> io::Result<()> {
            data.write_u8(file_no)?;
            data.write_u24::<LittleEndian>(offset)?;
            data.write_u24::<LittleEndian>(length)
        })()
        .map_err(|_| DesfireError::OutOfRange(length as usize))?;
        Ok(Self::with_data(code, data))
    }
}

impl Encode for NativeCommand {
    type Error = io::Error;
    /// ISO 7816-4 wrapped form: `90 INS 00 00 [Lc data] 00`
    fn encode<T: WriteBytesExt>(&self, out: &mut T) -> Result<(), Self::Error> {
        out.write_u8(desfire_const::WRAPPED_CLA)?;
        out.write_u8(self.code)?;
        out.write_u8(0x00)?; // P1
        out.write_u8(0x00)?; // P2
        if !self.data.is_empty() {
            let lc = u8::try_from(self.data.len()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Native command data of {} bytes does not fit a short APDU", self.data.len()),
                )
            })?;
            out.write_u8(lc)?;
            out.write_all(&self.data)?;
        }
        out.write_u8(0x00) // Le
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeResponse {
    pub status: DesfireStatus,
    pub data: Vec<u8>,
}

impl NativeResponse {
    /// Split a wrapped response `data 91 SW2` into data and DESFire status
    pub fn parse(raw: &[u8]) -> Result<NativeResponse, DesfireError> {
        if raw.len() < 2 {
            return Err(DesfireError::ShortResponse(raw.len()));
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        if sw[0] != desfire_const::WRAPPED_SW1 {
            return Err(DesfireError::StatusWord(sw[0], sw[1]));
        }
        let status = DesfireStatus::from_u8(sw[1]).ok_or(DesfireError::UnknownStatus(sw[1]))?;
        Ok(Self {
            status,
            data: data.to_vec(),
        })
    }

    pub fn expect_status(self, status: DesfireStatus) -> Result<NativeResponse, DesfireError> {
        if self.status == status {
            Ok(self)
        } else {
            Err(DesfireError::Status(self.status))
        }
    }

    pub fn expect_ok(self) -> Result<NativeResponse, DesfireError> {
        self.expect_status(DesfireStatus::OperationOk)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub vendor_id: u8,
    pub type_: u8,
    pub subtype: u8,
    pub major: u8,
    pub minor: u8,
    pub storage_size: u8,
    pub protocol: u8,
}

impl Decode for VersionInfo {
    type Error = io::Error;
    fn decode<T: ReadBytesExt>(input: &mut T) -> Result<Self, Self::Error> {
        Ok(Self {
            vendor_id: input.read_u8()?,
            type_: input.read_u8()?,
            subtype: input.read_u8()?,
            major: input.read_u8()?,
            minor: input.read_u8()?,
            storage_size: input.read_u8()?,
            protocol: input.read_u8()?,
        })
    }
}

/// Concatenated payload of the three `GetVersion` frames
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Version {
    pub hardware: VersionInfo,
    pub software: VersionInfo,
    pub uid: [u8; 7],
    pub batch_number: [u8; 5],
    pub production_week: u8,
    pub production_year: u8,
}

impl Decode for Version {
    type Error = io::Error;
    fn decode<T: ReadBytesExt>(input: &mut T) -> Result<Self, Self::Error> {
        let hardware = VersionInfo::decode(input)?;
        let software = VersionInfo::decode(input)?;
        let mut uid = [0u8; 7];
        input.read_exact(&mut uid)?;
        let mut batch_number = [0u8; 5];
        input.read_exact(&mut batch_number)?;
        Ok(Self {
            hardware,
            software,
            uid,
            batch_number,
            production_week: input.read_u8()?,
            production_year: input.read_u8()?,
        })
    }
}

impl Version {
    pub fn is_desfire(&self) -> bool {
        self.hardware.vendor_id == desfire_const::NXP_VENDOR_ID
            && self.hardware.type_ == desfire_const::DESFIRE_HW_TYPE
    }

    pub fn friendly_name(&self) -> &'static str {
        match self.hardware.major {
            0x01 => "Mifare DESFire EV1",
            0x12 => "Mifare DESFire EV2",
            0x33 => "Mifare DESFire EV3",
            _ => "Mifare DESFire",
        }
    }
}
