//! In-memory DESFire PICC answering wrapped native commands
use crate::desfire::Transport;
use crate::desfire_const;
use crate::error::TransportError;
use crate::key::{DES_BLOCK_LEN, DesfireKey};
use std::collections::HashMap;

const HW_VERSION: [u8; 7] = [0x04, 0x01, 0x01, 0x01, 0x00, 0x18, 0x05];
const SW_VERSION: [u8; 7] = [0x04, 0x01, 0x01, 0x01, 0x04, 0x18, 0x05];
const MAX_RESPONSE_DATA: usize = 59;

#[derive(Debug, Default)]
struct Application {
    key: [u8; 8],
    files: HashMap<u8, Vec<u8>>,
}

#[derive(Debug, Default)]
enum Pending {
    #[default]
    None,
    Version(usize),
    Authenticate([u8; DES_BLOCK_LEN]),
    Read(Vec<u8>),
    Write {
        file_no: u8,
        offset: usize,
        length: usize,
        buf: Vec<u8>,
    },
}

#[derive(Debug)]
pub struct SimulatedPicc {
    desfire: bool,
    uid: [u8; 7],
    applications: HashMap<u32, Application>,
    selected: u32,
    authenticated: bool,
    pending: Pending,
    released: bool,
    exchanges: usize,
}

impl SimulatedPicc {
    pub fn new() -> SimulatedPicc {
        let mut applications = HashMap::new();
        applications.insert(desfire_const::PICC_AID, Application::default());
        Self {
            desfire: true,
            uid: [0x04, 0x52, 0x2E, 0xA2, 0xB4, 0x28, 0x80],
            applications,
            selected: desfire_const::PICC_AID,
            authenticated: false,
            pending: Pending::None,
            released: false,
            exchanges: 0,
        }
    }

    /// A contactless card that does not understand DESFire native commands
    pub fn not_desfire() -> SimulatedPicc {
        Self {
            desfire: false,
            ..Self::new()
        }
    }

    pub fn add_application(&mut self, aid: u32, key: [u8; 8]) {
        self.applications.insert(
            aid,
            Application {
                key,
                files: HashMap::new(),
            },
        );
    }

    pub fn add_file(&mut self, aid: u32, file_no: u8, content: Vec<u8>) {
        self.applications
            .entry(aid)
            .or_default()
            .files
            .insert(file_no, content);
    }

    pub fn file(&self, aid: u32, file_no: u8) -> &[u8] {
        &self.applications[&aid].files[&file_no]
    }

    pub fn uid(&self) -> [u8; 7] {
        self.uid
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn key(&self) -> DesfireKey {
        DesfireKey::with_version(self.applications[&self.selected].key)
    }

    fn respond(data: &[u8], status: u8) -> Vec<u8> {
        let mut resp = data.to_vec();
        resp.push(desfire_const::WRAPPED_SW1);
        resp.push(status);
        resp
    }

    fn status(status: u8) -> Vec<u8> {
        Self::respond(&[], status)
    }

    fn u24(bytes: &[u8]) -> usize {
        bytes[0] as usize | (bytes[1] as usize) << 8 | (bytes[2] as usize) << 16
    }

    fn read_frame(&mut self, mut data: Vec<u8>) -> Vec<u8> {
        if data.len() > MAX_RESPONSE_DATA {
            let rest = data.split_off(MAX_RESPONSE_DATA);
            self.pending = Pending::Read(rest);
            Self::respond(&data, desfire_const::ADDITIONAL_FRAME)
        } else {
            Self::respond(&data, desfire_const::OPERATION_OK)
        }
    }

    fn write_frame(&mut self, file_no: u8, offset: usize, length: usize, buf: Vec<u8>) -> Vec<u8> {
        if buf.len() < length {
            self.pending = Pending::Write {
                file_no,
                offset,
                length,
                buf,
            };
            return Self::status(desfire_const::ADDITIONAL_FRAME);
        }
        if buf.len() > length {
            return Self::status(desfire_const::LENGTH_ERROR);
        }
        let selected = self.selected;
        let file = self
            .applications
            .get_mut(&selected)
            .and_then(|app| app.files.get_mut(&file_no));
        match file {
            Some(file) => {
                file[offset..offset + length].copy_from_slice(&buf);
                Self::status(desfire_const::OPERATION_OK)
            }
            None => Self::status(desfire_const::FILE_NOT_FOUND),
        }
    }

    fn additional_frame(&mut self, data: &[u8]) -> Vec<u8> {
        match std::mem::take(&mut self.pending) {
            Pending::Version(1) => {
                self.pending = Pending::Version(2);
                Self::respond(&SW_VERSION, desfire_const::ADDITIONAL_FRAME)
            }
            Pending::Version(_) => {
                let mut tail = self.uid.to_vec();
                tail.extend_from_slice(&[0xBA, 0x34, 0x4F, 0x89, 0x20, 0x2C, 0x10]);
                Self::respond(&tail, desfire_const::OPERATION_OK)
            }
            Pending::Authenticate(rnd_b) => {
                if data.len() != 2 * DES_BLOCK_LEN {
                    return Self::status(desfire_const::LENGTH_ERROR);
                }
                let key = self.key();
                let mut rnd_a = [0u8; DES_BLOCK_LEN];
                rnd_a.copy_from_slice(&data[..DES_BLOCK_LEN]);
                key.encipher_block(&mut rnd_a);
                let mut rnd_b_rotated = [0u8; DES_BLOCK_LEN];
                rnd_b_rotated.copy_from_slice(&data[DES_BLOCK_LEN..]);
                key.encipher_block(&mut rnd_b_rotated);
                rnd_b_rotated
                    .iter_mut()
                    .zip(&data[..DES_BLOCK_LEN])
                    .for_each(|(b, c)| *b ^= c);
                let mut expected = rnd_b;
                expected.rotate_left(1);
                if rnd_b_rotated != expected {
                    return Self::status(desfire_const::AUTHENTICATION_ERROR);
                }
                rnd_a.rotate_left(1);
                key.encipher_block(&mut rnd_a);
                self.authenticated = true;
                Self::respond(&rnd_a, desfire_const::OPERATION_OK)
            }
            Pending::Read(rest) => self.read_frame(rest),
            Pending::Write {
                file_no,
                offset,
                length,
                mut buf,
            } => {
                buf.extend_from_slice(data);
                self.write_frame(file_no, offset, length, buf)
            }
            Pending::None => Self::status(desfire_const::ILLEGAL_COMMAND_CODE),
        }
    }

    fn native(&mut self, ins: u8, data: &[u8]) -> Vec<u8> {
        if ins != desfire_const::ADDITIONAL_FRAME {
            self.pending = Pending::None;
        }
        match ins {
            desfire_const::GET_VERSION => {
                self.pending = Pending::Version(1);
                Self::respond(&HW_VERSION, desfire_const::ADDITIONAL_FRAME)
            }
            desfire_const::ADDITIONAL_FRAME => self.additional_frame(data),
            desfire_const::SELECT_APPLICATION if data.len() == 3 => {
                let aid = Self::u24(data) as u32;
                if self.applications.contains_key(&aid) {
                    self.selected = aid;
                    self.authenticated = false;
                    Self::status(desfire_const::OPERATION_OK)
                } else {
                    Self::status(desfire_const::APPLICATION_NOT_FOUND)
                }
            }
            desfire_const::AUTHENTICATE_LEGACY if data.len() == 1 => {
                self.authenticated = false;
                if data[0] != 0 {
                    return Self::status(desfire_const::NO_SUCH_KEY);
                }
                let rnd_b: [u8; DES_BLOCK_LEN] = rand::random();
                let mut challenge = rnd_b;
                self.key().encipher_block(&mut challenge);
                self.pending = Pending::Authenticate(rnd_b);
                Self::respond(&challenge, desfire_const::ADDITIONAL_FRAME)
            }
            desfire_const::READ_DATA if data.len() == 7 => {
                let file_no = data[0];
                let offset = Self::u24(&data[1..4]);
                let length = Self::u24(&data[4..7]);
                let Some(file) = self.applications[&self.selected].files.get(&file_no) else {
                    return Self::status(desfire_const::FILE_NOT_FOUND);
                };
                let end = if length == 0 { file.len() } else { offset + length };
                if offset > file.len() || end > file.len() {
                    return Self::status(desfire_const::BOUNDARY_ERROR);
                }
                let content = file[offset..end].to_vec();
                self.read_frame(content)
            }
            desfire_const::WRITE_DATA if data.len() >= 7 => {
                if !self.authenticated {
                    return Self::status(desfire_const::PERMISSION_DENIED);
                }
                let file_no = data[0];
                let offset = Self::u24(&data[1..4]);
                let length = Self::u24(&data[4..7]);
                let Some(file) = self.applications[&self.selected].files.get(&file_no) else {
                    return Self::status(desfire_const::FILE_NOT_FOUND);
                };
                if offset + length > file.len() {
                    return Self::status(desfire_const::BOUNDARY_ERROR);
                }
                self.write_frame(file_no, offset, length, data[7..].to_vec())
            }
            desfire_const::SELECT_APPLICATION
            | desfire_const::AUTHENTICATE_LEGACY
            | desfire_const::READ_DATA
            | desfire_const::WRITE_DATA => Self::status(desfire_const::LENGTH_ERROR),
            _ => Self::status(desfire_const::ILLEGAL_COMMAND_CODE),
        }
    }
}

impl Transport for SimulatedPicc {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.released {
            return Err(TransportError::Released);
        }
        self.exchanges += 1;
        if apdu == desfire_const::GET_DATA_UID {
            let mut resp = self.uid.to_vec();
            resp.extend_from_slice(&[0x90, 0x00]);
            return Ok(resp);
        }
        if !self.desfire || apdu.len() < 5 || apdu[0] != desfire_const::WRAPPED_CLA {
            return Ok(vec![0x6E, 0x00]);
        }
        let data = match apdu.len() {
            5 => &[][..],
            len => {
                let lc = apdu[4] as usize;
                if len != 6 + lc {
                    return Ok(vec![0x67, 0x00]);
                }
                &apdu[5..5 + lc]
            }
        };
        Ok(self.native(apdu[1], data))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
