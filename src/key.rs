//! Single DES keys as used by the legacy DESFire authentication
use des::Des;
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use std::fmt::{Debug, Formatter};

pub const DES_KEY_LEN: usize = 8;
pub const DES_BLOCK_LEN: usize = 8;

/// An 8-byte DES key. The least significant bit of each byte is the parity
/// bit, which DESFire uses to store the key version.
pub struct DesfireKey {
    data: [u8; DES_KEY_LEN],
}

impl Debug for DesfireKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesfireKey")
            .field("version", &self.version())
            .field("data", &"Opaque")
            .finish()
    }
}

impl DesfireKey {
    /// Key with its parity bits cleared (version 0)
    #[cfg(test)]
    pub fn new(data: [u8; DES_KEY_LEN]) -> DesfireKey {
        let mut key = Self::with_version(data);
        key.data.iter_mut().for_each(|b| *b &= 0xFE);
        key
    }

    /// Key taken verbatim, the parity bits carry the key version
    pub fn with_version(data: [u8; DES_KEY_LEN]) -> DesfireKey {
        Self { data }
    }

    pub fn version(&self) -> u8 {
        self.data
            .iter()
            .enumerate()
            .fold(0u8, |version, (n, b)| version | ((b & 0x01) << (7 - n)))
    }

    fn cipher(&self) -> Des {
        Des::new(GenericArray::from_slice(&self.data))
    }

    pub fn encipher_block(&self, block: &mut [u8; DES_BLOCK_LEN]) {
        self.cipher()
            .encrypt_block(GenericArray::from_mut_slice(block));
    }

    pub fn decipher_block(&self, block: &mut [u8; DES_BLOCK_LEN]) {
        self.cipher()
            .decrypt_block(GenericArray::from_mut_slice(block));
    }

    /// Decrypt data received from the card: CBC with a zero IV.
    ///
    /// `data` must be a whole number of blocks.
    pub fn receive_decipher(&self, data: &mut [u8]) {
        let cipher = self.cipher();
        let mut ivect = [0u8; DES_BLOCK_LEN];
        for block in data.chunks_exact_mut(DES_BLOCK_LEN) {
            let mut ovect = [0u8; DES_BLOCK_LEN];
            ovect.copy_from_slice(block);
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
            xor(block, &ivect);
            ivect = ovect;
        }
    }

    /// Prepare data sent to the card in legacy "send mode": the PCD always
    /// deciphers, chaining on its own output, so that the card can recover
    /// the plaintext with a plain CBC encipher.
    ///
    /// `data` must be a whole number of blocks.
    pub fn send_decipher(&self, data: &mut [u8]) {
        let cipher = self.cipher();
        let mut ivect = [0u8; DES_BLOCK_LEN];
        for block in data.chunks_exact_mut(DES_BLOCK_LEN) {
            xor(block, &ivect);
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
            ivect.copy_from_slice(block);
        }
    }
}

impl Drop for DesfireKey {
    fn drop(&mut self) {
        self.data.fill(0);
    }
}

fn xor(block: &mut [u8], ivect: &[u8; DES_BLOCK_LEN]) {
    block.iter_mut().zip(ivect).for_each(|(b, i)| *b ^= i);
}
