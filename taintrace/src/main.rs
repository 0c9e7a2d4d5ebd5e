use clap::Parser;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::process::exit;

use taintrace::{run, ImageSource, Options};

fn parse_address(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}

#[derive(Parser, Debug)]
struct Args {
    /// JSON script of debugger events to replay
    #[clap()]
    script: PathBuf,
    /// Memory image of the debugged process
    #[clap(short, long)]
    image: PathBuf,
    /// Load address of a raw image (ignored with --elf)
    #[clap(short, long, parse(try_from_str = parse_address), default_value = "0x400000")]
    base: u64,
    /// Treat the image as an ELF file
    #[clap(short, long)]
    elf: bool,
    /// JSON options file (defaults to $TAINTRACE_OPTIONS)
    #[clap(short, long, required = false)]
    options: Option<PathBuf>,
    /// Write the report here instead of stdout
    #[clap(long, required = false)]
    output: Option<PathBuf>,
    /// Show a progress bar
    #[clap(short, long)]
    progress: bool,
    /// More output per occurrence
    #[clap(short, long, parse(from_occurrences))]
    verbose: u64,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .expect("Failed to initialize logger");

    let options = match args.options {
        Some(path) => Options::from_file(path),
        None => Options::from_env(),
    };
    let options = match options {
        Ok(options) => options,
        Err(err) => {
            error!("Failed to load options: {}", err);
            exit(1);
        }
    };

    let image = if args.elf {
        ImageSource::Elf(args.image)
    } else {
        ImageSource::Flat {
            path: args.image,
            base: args.base,
        }
    };

    if let Err(err) = run(args.script, image, options, args.output, args.progress) {
        error!("{}", err);
        exit(1);
    }
}
