// Command-line front end for the stream bridge.
//
// `encode` and `decode` wire files or stdio into one bridge call. Stdin is
// always handed over as a plain (non-seekable) reader; files given with
// `--source` or as decode input are handed over as seekable streams.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::{debug, info};

use crate::bridge::{self, Bridge, Input};
use crate::engine::{EngineError, EngineOptions, MAX_WINDOW_SIZE};
use crate::io::MeteredStream;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1usize << 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1 << 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    let num: usize = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Delta encode/decode arbitrary streams through the VCDIFF engine.
#[derive(Parser, Debug)]
#[command(name = "deltabridge", version, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Only report errors.
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// More log output (-v info, -vv debug).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write the delta that turns BASE into INPUT.
    Encode(StreamArgs),
    /// Rebuild the target from BASE and the delta in INPUT.
    Decode(StreamArgs),
    /// Print build and default settings.
    Config,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// Matching level (0-9, 0 disables source matching).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9))]
    level: Option<u32>,

    /// Target bytes per window (supports K/M/G suffix).
    #[arg(long = "window-size", value_parser = parse_byte_size)]
    window_size: Option<usize>,

    /// Base bytes per read (supports K/M/G suffix).
    #[arg(long = "source-block-size", value_parser = parse_byte_size)]
    source_block_size: Option<usize>,

    /// Neither write nor verify Adler-32 window checksums.
    #[arg(long = "no-checksum")]
    no_checksum: bool,
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Base file (default: empty).
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Option<PathBuf>,

    /// Write to stdout even when OUTPUT is given.
    #[arg(short = 'c', long)]
    stdout: bool,

    #[command(flatten)]
    tuning: TuningArgs,

    /// Input file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Decode,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    engine: EngineOptions,
    source_file: Option<PathBuf>,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let (command, args) = match cli.command {
        Cmd::Encode(args) => (Command::Encode, Some(args)),
        Cmd::Decode(args) => (Command::Decode, Some(args)),
        Cmd::Config => (Command::Config, None),
    };

    let mut engine = EngineOptions::default();
    let (mut source_file, mut input_file, mut output_file) = (None, None, None);
    if let Some(args) = args {
        let t = args.tuning;
        engine.level = t.level.unwrap_or(engine.level);
        engine.window_size = t.window_size.unwrap_or(engine.window_size);
        engine.source_block_size = t.source_block_size.unwrap_or(engine.source_block_size);
        engine.checksum = !t.no_checksum;
        engine.verify_checksum = !t.no_checksum;
        source_file = args.source;
        input_file = args.input;
        output_file = args.output.filter(|_| !args.stdout);
    }

    Options {
        command,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        engine,
        source_file,
        input_file,
        output_file,
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{what} file: {}: {source}", path.display())]
    Open {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("output file exists, use -f to overwrite: {}", .0.display())]
    OutputExists(PathBuf),
    #[error(transparent)]
    Config(#[from] EngineError),
    #[error(transparent)]
    Bridge(#[from] bridge::Error),
}

fn open_file(what: &'static str, path: &Path) -> Result<BufReader<File>, CliError> {
    File::open(path)
        .map(|f| BufReader::with_capacity(BUF_SIZE, f))
        .map_err(|source| CliError::Open {
            what,
            path: path.to_path_buf(),
            source,
        })
}

fn open_output(opts: &Options) -> Result<Box<dyn Write>, CliError> {
    let Some(path) = &opts.output_file else {
        return Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock())));
    };
    if path.exists() && !opts.force {
        return Err(CliError::OutputExists(path.clone()));
    }
    let file = File::create(path).map_err(|source| CliError::Open {
        what: "output",
        path: path.clone(),
        source,
    })?;
    Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, file)))
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() {
    let defaults = EngineOptions::default();
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("deltabridge version {version}");
    eprintln!("ADLER32_SIMD={}", cfg!(feature = "adler32") as u8);
    eprintln!("FILE_IO_SHA256={}", cfg!(feature = "file-io") as u8);
    eprintln!("DEFAULT_LEVEL={}", defaults.level);
    eprintln!("DEFAULT_WINDOW_SIZE={}", defaults.window_size);
    eprintln!("DEFAULT_SOURCE_BLOCK_SIZE={}", defaults.source_block_size);
    eprintln!("MAX_WINDOW_SIZE={MAX_WINDOW_SIZE}");
}

// ---------------------------------------------------------------------------
// Encode / decode commands
// ---------------------------------------------------------------------------

fn cmd_run(opts: &Options) -> Result<(), CliError> {
    opts.engine.validate()?;
    let bridge = Bridge::with_options(opts.engine.clone());

    let mut base_file = match &opts.source_file {
        Some(path) => Some(open_file("source", path)?),
        None => None,
    };
    let base_size = match &base_file {
        Some(f) => f.get_ref().metadata().map(|m| m.len()).ok(),
        None => Some(0),
    };
    let mut no_base = io::empty();
    let base = match &mut base_file {
        Some(f) => Input::seekable(f),
        None => Input::reader(&mut no_base),
    };

    let mut input_file = match &opts.input_file {
        Some(path) => Some(open_file("input", path)?),
        None => None,
    };
    let mut stdin = MeteredStream::new(io::stdin().lock());
    let mut output = MeteredStream::new(open_output(opts)?);

    match (opts.command, &mut input_file) {
        (Command::Encode, Some(f)) => bridge.encode(base, Input::reader(f), &mut output)?,
        (Command::Decode, Some(f)) => bridge.decode(base, Input::seekable(f), &mut output)?,
        (Command::Encode, None) => bridge.encode(base, Input::reader(&mut stdin), &mut output)?,
        (Command::Decode, None) => bridge.decode(base, Input::reader(&mut stdin), &mut output)?,
        (Command::Config, _) => return Ok(()),
    }

    let input_size = match &input_file {
        Some(f) => f.get_ref().metadata().map(|m| m.len()).ok(),
        None => Some(stdin.bytes()),
    };
    let (output_size, output_sha256, _) = output.finish();
    let command = if opts.command == Command::Encode {
        "encode"
    } else {
        "decode"
    };
    info!(
        "{command}: base size: {base_size:?}, input size: {input_size:?}, output size: {output_size}"
    );

    if opts.json_output {
        let json = serde_json::json!({
            "command": command,
            "base_size": base_size,
            "input_size": input_size,
            "output_size": output_size,
            "output_sha256": output_sha256.map(|d| hex(&d)),
            "level": opts.engine.level,
        });
        eprintln!("{json:#}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn default_log_filter(opts: &Options) -> &'static str {
    match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let opts = resolve_options(Cli::parse());

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(&opts)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();
    debug!("options: {opts:?}");

    let result = match opts.command {
        Command::Config => {
            cmd_config();
            Ok(())
        }
        Command::Encode | Command::Decode => cmd_run(&opts),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("deltabridge: {e}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
