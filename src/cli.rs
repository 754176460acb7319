//! Command line options and their resolution into [`WriteOptions`]
use crate::key::DES_KEY_LEN;
use crate::ndef::{FrameError, NdefMessage};
use crate::session::WriteOptions;
use clap::Parser;
use log::{LevelFilter, debug};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid key '{0}': expects 16 hexadecimal digits")]
    InvalidKey(String),
    #[error("Could not read NDEF message from '{path}': {source}")]
    Input {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not use NDEF message: {0}")]
    Message(#[from] FrameError),
}

/// Write an NDEF message into every Mifare DESFire formatted as NFC Forum
/// Type 4 Tag found on the attached readers
#[derive(Parser, Debug)]
#[command(name = "mifare-desfire-write-ndef", version)]
pub struct Cli {
    /// Do not ask for confirmation
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Use FILE as NDEF message to write on card ("-" = stdin)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Provide another NDEF Key than the default one
    #[arg(short = 'k', long = "key", value_name = "HEX16", value_parser = parse_key)]
    pub key: Option<[u8; DES_KEY_LEN]>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write log lines to PATH instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

pub fn parse_key(s: &str) -> Result<[u8; DES_KEY_LEN], ConfigError> {
    let mut key = [0u8; DES_KEY_LEN];
    hex::decode_to_slice(s, &mut key).map_err(|_| ConfigError::InvalidKey(s.to_string()))?;
    Ok(key)
}

/// Whole payload from `input`: `None` is the default message, `-` is stdin
pub fn load_payload(input: Option<&PathBuf>) -> Result<Option<Vec<u8>>, ConfigError> {
    let Some(path) = input else {
        return Ok(None);
    };
    let map_err = |source| ConfigError::Input {
        path: path.display().to_string(),
        source,
    };
    let payload = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf).map_err(map_err)?;
        buf
    } else {
        fs::read(path).map_err(map_err)?
    };
    debug!("Read {} payload bytes from '{}'", payload.len(), path.display());
    Ok(Some(payload))
}

#[derive(Debug)]
pub struct Config;

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<WriteOptions, ConfigError> {
        let message = match load_payload(cli.input.as_ref())? {
            Some(payload) => NdefMessage::new(&payload)?,
            None => NdefMessage::default(),
        };
        Ok(WriteOptions {
            key: cli.key.unwrap_or([0u8; DES_KEY_LEN]),
            message,
            interactive: !cli.yes,
        })
    }
}
