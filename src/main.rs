#![allow(clippy::uninlined_format_args)]
use clap::Parser;
use desfire_write_ndef::cli::{Cli, Config};
use desfire_write_ndef::pcsc_reader::PcscContext;
use desfire_write_ndef::session::{LineConfirm, NdefWriter};
use env_logger::Builder;
use log::{debug, error, info};
use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

fn init_logger(cli: &Cli) -> io::Result<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .filter(None, cli.log_level())
        .parse_default_env();
    if let Some(path) = &cli.log_file {
        let target = Box::new(File::create(path)?);
        builder.target(env_logger::Target::Pipe(target));
    }
    builder.init();
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if let Err(e) = init_logger(&cli) {
        eprintln!("Can't create log file: {}", e);
        return ExitCode::FAILURE;
    }

    let options = match Config::from_cli(&cli) {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("NDEF file is {} bytes long.", options.message.len());
    debug!("NDEF message: {:02X?}", options.message.payload());

    let nfc = match PcscContext::establish() {
        Ok(nfc) => nfc,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut writer = NdefWriter::new(&options, io::stdout(), LineConfirm::new(stdin.lock()));
    match writer.write_ndef(&nfc) {
        Ok(report) => {
            info!("Run finished: {:?}", report);
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
