use std::fs;
use std::process::ExitCode;

#[macro_use]
extern crate log;

use clap::Parser;
use emtrace_decode::{self as core, Decoder, OutputMode, SourceLocMode};

#[derive(Debug, Parser)]
#[command(name = "emtrace-decode", about = "Decode an emtrace trace stream")]
struct Args {
    /// Read the metadata section out of an ELF file.
    #[arg(long, conflicts_with = "section_file")]
    elf: Option<String>,

    /// Read the metadata section directly from a flat binary file.
    #[arg(long)]
    section_file: Option<String>,

    /// Section name to look up within --elf (ignored with --section-file).
    #[arg(long, default_value = ".emtrace")]
    section_name: String,

    /// Trace stream source: `stdin`, a file path, `tcp:HOST:PORT`, or
    /// (unix only) `unix:PATH`.
    #[arg(long, default_value = "stdin")]
    input: String,

    /// How to render source-location prefixes.
    #[arg(long, value_enum, default_value = "none")]
    src_loc: SrcLocArg,

    /// Emit one newline-delimited JSON object per record (fmt string,
    /// source location, decoded argument values) instead of formatted
    /// text.
    #[arg(long)]
    json: bool,

    /// Run in test-harness mode: decode, capture output, diff against the
    /// named section (default `.emtrace.test.expected`) instead of writing
    /// to stdout.
    #[arg(long, num_args = 0..=1, default_missing_value = ".emtrace.test.expected")]
    test: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging below error level.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SrcLocArg {
    None,
    Absolute,
    Relative,
}

impl From<SrcLocArg> for SourceLocMode {
    fn from(v: SrcLocArg) -> Self {
        match v {
            SrcLocArg::None => SourceLocMode::None,
            SrcLocArg::Absolute => SourceLocMode::Absolute,
            SrcLocArg::Relative => SourceLocMode::Relative,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

fn run(args: &Args) -> core::Result<()> {
    let section_bytes = load_section(args)?;
    let src_loc_mode: SourceLocMode = args.src_loc.into();

    let mut stream = core::open_stream(&args.input).map_err(core::Error::from)?;

    if let Some(expected_name) = &args.test {
        let header = Decoder::parse_header(&section_bytes)?;
        let elf_bytes;
        let expected = if let Some(elf_path) = &args.elf {
            elf_bytes = fs::read(elf_path).map_err(core::Error::from)?;
            core::find_section(&elf_bytes, expected_name)?.to_vec()
        } else {
            return Err(core::Error::section_missing(expected_name.clone()));
        };
        return core::run_and_diff(header, &section_bytes, &mut stream, src_loc_mode, &expected);
    }

    let mut driver = Decoder::driver(&section_bytes, src_loc_mode)?;
    if args.json {
        driver = driver.with_output_mode(OutputMode::Json);
    }
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    driver.run(&mut stream, &mut out)
}

fn load_section(args: &Args) -> core::Result<Vec<u8>> {
    if let Some(path) = &args.section_file {
        return fs::read(path).map_err(core::Error::from);
    }
    if let Some(path) = &args.elf {
        let file_bytes = fs::read(path).map_err(core::Error::from)?;
        return core::find_section(&file_bytes, &args.section_name).map(|s| s.to_vec());
    }
    Err(core::Error::section_missing(args.section_name.clone()))
}
