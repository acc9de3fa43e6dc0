mod report;

use clap::{Parser, Subcommand};
use eyre_pretty::{Context, Result};
use pulsar::{
    bmg::Wbmgt,
    config::Config,
    crash::ExceptionFile,
    input::Input,
    symbols::{SymbolResolver, Symbols},
};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the registers and stack trace of a crash dump
    Crash {
        /// Path to the crash dump, or `stdin`
        #[arg(short, long)]
        file: Input,
        /// Path to a symbol map of the PAL game, used to name addresses
        #[arg(long, requires = "versions")]
        symbols: Option<PathBuf>,
        /// Path to the versions file used to port addresses of other regions to PAL
        #[arg(long, requires = "symbols")]
        versions: Option<PathBuf>,
    },
    /// Print the settings, cups and tracks of a config.pul
    #[command(alias = "import-config")]
    Config {
        /// Path to the config, or `stdin`
        #[arg(short, long)]
        file: Input,
        /// Path to the wbmgt executable, used to decode the BMG section
        #[arg(long, default_value = "wbmgt")]
        wbmgt: PathBuf,
    },
}

/// A CLI to inspect files produced by Pulsar.
///
/// Supported formats: crash dumps, config.pul.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Action to take
    #[command(subcommand)]
    command: Command,
    /// Log more details to stderr (repeat for even more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(env_filter)
        .init();
}

fn crash(file: Input, symbols: Option<PathBuf>, versions: Option<PathBuf>) -> Result<()> {
    let bytes = file.read().context("reading crash dump")?;
    let dump = ExceptionFile::decode(&bytes).context("decoding crash dump")?;

    let symbols = match (symbols, versions) {
        (Some(map), Some(versions)) => {
            Some(Symbols::load(map, versions).context("loading symbols")?)
        }
        _ => None,
    };

    report::crash(&dump, symbols.as_ref().map(|s| s as &dyn SymbolResolver));
    Ok(())
}

fn config(file: Input, wbmgt: PathBuf) -> Result<()> {
    let bytes = file.read().context("reading config")?;
    let config = Config::decode(&bytes, &Wbmgt::new(wbmgt)).context("decoding config")?;

    report::config(&config);
    Ok(())
}

fn main() -> Result<()> {
    eyre_pretty::install()?;

    let args = Args::parse();
    setup_tracing(args.verbose);

    match args.command {
        Command::Crash {
            file,
            symbols,
            versions,
        } => crash(file, symbols, versions),
        Command::Config { file, wbmgt } => config(file, wbmgt),
    }
}
