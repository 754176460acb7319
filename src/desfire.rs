//! DESFire native commands over an ISO 7816-4 APDU transport
use crate::desfire_const;
use crate::desfire_proto::{
    Aid, Decode, DesfireStatus, Encode, NativeCommand, NativeResponse, Version,
};
use crate::error::{DesfireError, TransportError};
use crate::key::{DES_BLOCK_LEN, DesfireKey};
use log::{debug, trace};
use rand::RngCore;
use std::io;

/// Something that exchanges APDUs with a card
pub trait Transport {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Give the card handle back to the reader; further exchanges fail
    fn release(&mut self) {}
}

pub struct Desfire<T: Transport> {
    transport: T,
    authenticated_key: Option<u8>,
}

impl<T: Transport> std::fmt::Debug for Desfire<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desfire")
            .field("authenticated_key", &self.authenticated_key)
            .finish()
    }
}

impl<T: Transport> Desfire<T> {
    pub fn new(transport: T) -> Desfire<T> {
        Self {
            transport,
            authenticated_key: None,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[cfg(test)]
    pub fn authenticated_key(&self) -> Option<u8> {
        self.authenticated_key
    }

    /// Send a single frame and decode the DESFire status
    fn exchange(&mut self, cmd: &NativeCommand) -> Result<NativeResponse, DesfireError> {
        let mut apdu = io::Cursor::new(Vec::with_capacity(cmd.data.len() + 6));
        cmd.encode(&mut apdu)
            .map_err(|_| DesfireError::OutOfRange(cmd.data.len()))?;
        let apdu = apdu.into_inner();
        debug!("DESFire C-APDU: {:02X?}", apdu);
        let raw = self.transport.transmit(&apdu)?;
        debug!("DESFire R-APDU: {:02X?}", raw);
        NativeResponse::parse(&raw)
    }

    /// Send `cmd` and keep requesting frames while the card answers
    /// `ADDITIONAL_FRAME`, returning the concatenated data
    fn exchange_chained(&mut self, cmd: &NativeCommand) -> Result<Vec<u8>, DesfireError> {
        let mut resp = self.exchange(cmd)?;
        let mut data = Vec::new();
        while resp.status == DesfireStatus::AdditionalFrame {
            data.extend_from_slice(&resp.data);
            resp = self.exchange(&NativeCommand::additional_frame(&[]))?;
        }
        let resp = resp.expect_ok()?;
        data.extend_from_slice(&resp.data);
        Ok(data)
    }

    pub fn get_version(&mut self) -> Result<Version, DesfireError> {
        let data = self.exchange_chained(&NativeCommand::new(desfire_const::GET_VERSION))?;
        Version::decode(&mut io::Cursor::new(&data)).map_err(|_| DesfireError::ResponseLength {
            expected: 28,
            actual: data.len(),
        })
    }

    pub fn select_application(&mut self, aid: Aid) -> Result<(), DesfireError> {
        debug!("Selecting application 0x{:06X}", aid.value());
        self.authenticated_key = None;
        self.exchange(&NativeCommand::select_application(aid)?)?
            .expect_ok()
            .map(|_| ())
    }

    /// Legacy (`0x0A`) DES authentication
    pub fn authenticate(&mut self, key_no: u8, key: &DesfireKey) -> Result<(), DesfireError> {
        self.authenticated_key = None;
        let resp = self
            .exchange(&NativeCommand::with_data(
                desfire_const::AUTHENTICATE_LEGACY,
                vec![key_no],
            ))?
            .expect_status(DesfireStatus::AdditionalFrame)?;
        let mut rnd_b: [u8; DES_BLOCK_LEN] =
            resp.data
                .as_slice()
                .try_into()
                .map_err(|_| DesfireError::ResponseLength {
                    expected: DES_BLOCK_LEN,
                    actual: resp.data.len(),
                })?;
        key.receive_decipher(&mut rnd_b);

        let mut rnd_a = [0u8; DES_BLOCK_LEN];
        rand::rng().fill_bytes(&mut rnd_a);

        let mut token = [0u8; 2 * DES_BLOCK_LEN];
        token[..DES_BLOCK_LEN].copy_from_slice(&rnd_a);
        token[DES_BLOCK_LEN..].copy_from_slice(&rnd_b);
        token[DES_BLOCK_LEN..].rotate_left(1);
        key.send_decipher(&mut token);

        let resp = self
            .exchange(&NativeCommand::additional_frame(&token))?
            .expect_ok()?;
        let mut rnd_a_rotated: [u8; DES_BLOCK_LEN] =
            resp.data
                .as_slice()
                .try_into()
                .map_err(|_| DesfireError::ResponseLength {
                    expected: DES_BLOCK_LEN,
                    actual: resp.data.len(),
                })?;
        key.receive_decipher(&mut rnd_a_rotated);
        rnd_a.rotate_left(1);
        if rnd_a_rotated != rnd_a {
            return Err(DesfireError::AuthenticationFailed);
        }
        trace!("Authenticated with key {}", key_no);
        self.authenticated_key = Some(key_no);
        Ok(())
    }

    /// Read `length` bytes at `offset` of a plain-communication data file.
    /// A `length` of 0 reads up to the end of the file.
    pub fn read_data(
        &mut self,
        file_no: u8,
        offset: usize,
        length: usize,
    ) -> Result<Vec<u8>, DesfireError> {
        let cmd = NativeCommand::file_access(desfire_const::READ_DATA, file_no, offset, length)?;
        let data = self.exchange_chained(&cmd)?;
        if length != 0 && data.len() != length {
            return Err(DesfireError::ResponseLength {
                expected: length,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Write `data` at `offset` of a plain-communication data file, returns
    /// the number of bytes written
    pub fn write_data(
        &mut self,
        file_no: u8,
        offset: usize,
        data: &[u8],
    ) -> Result<usize, DesfireError> {
        debug!(
            "WriteData file {} at {} ({} bytes), authenticated key {:?}",
            file_no,
            offset,
            data.len(),
            self.authenticated_key
        );
        let mut cmd =
            NativeCommand::file_access(desfire_const::WRITE_DATA, file_no, offset, data.len())?;
        let first = data.len().min(desfire_const::MAX_FIRST_FRAME_DATA);
        cmd.data.extend_from_slice(&data[..first]);
        let mut resp = self.exchange(&cmd)?;
        let mut sent = first;
        while sent < data.len() {
            resp = resp.expect_status(DesfireStatus::AdditionalFrame)?;
            let end = data.len().min(sent + desfire_const::MAX_FRAME_DATA);
            resp = self.exchange(&NativeCommand::additional_frame(&data[sent..end]))?;
            sent = end;
        }
        resp.expect_ok()?;
        Ok(sent)
    }

    pub fn release(&mut self) {
        self.authenticated_key = None;
        self.transport.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SimulatedPicc;
    use hex_literal::hex;

    const NDEF_AID: u32 = 0xEEEE10;
    const KEY: [u8; 8] = hex!("11 22 33 44 AA BB CC DD");

    fn card() -> Desfire<SimulatedPicc> {
        let mut picc = SimulatedPicc::new();
        picc.add_application(NDEF_AID, KEY);
        picc.add_file(NDEF_AID, 0x04, vec![0u8; 256]);
        Desfire::new(picc)
    }

    #[test]
    fn get_version_collects_three_frames() {
        let mut card = card();
        let version = card.get_version().unwrap();
        assert!(version.is_desfire());
        assert_eq!(version.friendly_name(), "Mifare DESFire EV1");
        assert_eq!(card.transport_mut().exchanges(), 3);
    }

    #[test]
    fn authenticate_with_right_key() {
        let mut card = card();
        card.select_application(Aid::new(NDEF_AID)).unwrap();
        card.authenticate(0, &DesfireKey::with_version(KEY)).unwrap();
        assert_eq!(card.authenticated_key(), Some(0));
    }

    #[test]
    fn authenticate_with_wrong_key() {
        let mut card = card();
        card.select_application(Aid::new(NDEF_AID)).unwrap();
        let err = card
            .authenticate(0, &DesfireKey::with_version([0u8; 8]))
            .unwrap_err();
        assert!(matches!(
            err,
            DesfireError::Status(DesfireStatus::AuthenticationError)
        ));
        assert_eq!(card.authenticated_key(), None);
    }

    #[test]
    fn select_unknown_application() {
        let mut card = card();
        let err = card.select_application(Aid::new(0x123456)).unwrap_err();
        assert!(matches!(
            err,
            DesfireError::Status(DesfireStatus::ApplicationNotFound)
        ));
    }

    #[test]
    fn chained_write_then_read() {
        let mut card = card();
        card.select_application(Aid::new(NDEF_AID)).unwrap();
        card.authenticate(0, &DesfireKey::with_version(KEY)).unwrap();
        let data: Vec<u8> = (0..=199u8).collect();
        let before = card.transport_mut().exchanges();
        assert_eq!(card.write_data(0x04, 3, &data).unwrap(), 200);
        // 52 + 59 + 59 + 30
        assert_eq!(card.transport_mut().exchanges() - before, 4);
        assert_eq!(card.read_data(0x04, 3, 200).unwrap(), data);
        assert_eq!(card.transport_mut().file(NDEF_AID, 0x04)[..3], [0, 0, 0]);
    }

    #[test]
    fn short_write_is_a_single_frame() {
        let mut card = card();
        card.select_application(Aid::new(NDEF_AID)).unwrap();
        card.authenticate(0, &DesfireKey::with_version(KEY)).unwrap();
        let before = card.transport_mut().exchanges();
        card.write_data(0x04, 0, &[0x00, 0x01, 0xD0]).unwrap();
        assert_eq!(card.transport_mut().exchanges() - before, 1);
        assert_eq!(card.read_data(0x04, 0, 3).unwrap(), vec![0x00, 0x01, 0xD0]);
    }

    #[test]
    fn read_beyond_file_is_boundary_error() {
        let mut card = card();
        card.select_application(Aid::new(NDEF_AID)).unwrap();
        let err = card.read_data(0x04, 250, 10).unwrap_err();
        assert!(matches!(
            err,
            DesfireError::Status(DesfireStatus::BoundaryError)
        ));
    }

    #[test]
    fn released_card_fails_exchanges() {
        let mut card = card();
        card.release();
        assert!(matches!(
            card.get_version().unwrap_err(),
            DesfireError::Transport(TransportError::Released)
        ));
    }
}
