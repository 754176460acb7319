#![allow(clippy::uninlined_format_args)]
#![allow(clippy::upper_case_acronyms)]
pub mod cli;
pub mod desfire;
pub mod desfire_const;
pub mod desfire_proto;
pub mod error;
pub mod key;
pub mod ndef;
pub mod nfc;
pub mod pcsc_reader;
pub mod session;
pub mod tlv;

#[cfg(test)]
mod test_helpers;
