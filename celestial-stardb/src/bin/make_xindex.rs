//! make-xindex: convert an ASCII cross index to the binary `CELINDEX` format.
//!
//! Input is whitespace-separated `external internal` decimal pairs; either
//! path may be omitted to use stdin or stdout.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use celestial_stardb::xindex::convert_ascii;
use celestial_stardb::Error;
use clap::error::ErrorKind;
use clap::Parser;

#[derive(Parser)]
#[command(name = "make-xindex")]
#[command(about = "Convert an ASCII cross index to binary")]
#[command(version)]
struct Cli {
    /// ASCII input (default: stdin)
    input: Option<PathBuf>,

    /// Binary output (default: stdout)
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprint!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<Error>() {
                Some(Error::RecordParse { record, message }) => {
                    eprintln!("Error parsing record #{}: {}", record, message)
                }
                _ => eprintln!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let input: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(
            File::open(path)
                .with_context(|| format!("Error opening input file {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    // Convert into memory first so a parse error leaves no partial output.
    let mut encoded = Vec::new();
    let count = convert_ascii(input, &mut encoded)?;
    log::info!("Converted {} cross index records", count);

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Error opening output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&encoded)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&encoded)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}
