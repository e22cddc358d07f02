use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Offline companion for graft signature sets and address caches")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a signature set against a saved memory dump
    Scan {
        /// Raw memory dump file
        #[arg(short, long)]
        dump: PathBuf,

        /// Address the first byte of the dump was mapped at
        #[arg(short, long, value_parser = commands::parse_address)]
        base: u64,

        /// Signature set JSON file
        #[arg(short, long)]
        signatures: PathBuf,

        /// Cache directory; resolved addresses are written back when set
        #[arg(short, long)]
        cache_dir: Option<PathBuf>,

        /// Host version override (defaults to the set's host_version)
        #[arg(long)]
        version: Option<String>,
    },

    /// Inspect or clean up cache files
    Cache {
        #[command(subcommand)]
        action: commands::CacheAction,
    },

    /// Hexdump a range of a saved memory dump
    Hexdump {
        /// Raw memory dump file
        #[arg(short, long)]
        dump: PathBuf,

        /// Address the first byte of the dump was mapped at
        #[arg(short, long, value_parser = commands::parse_address)]
        base: u64,

        /// Start address of the range to dump
        #[arg(short, long, value_parser = commands::parse_address)]
        address: u64,

        /// Number of bytes
        #[arg(short, long, default_value_t = 256)]
        size: usize,

        /// Show the ASCII column
        #[arg(long)]
        ascii: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("graft=info".parse()?))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Scan {
            dump,
            base,
            signatures,
            cache_dir,
            version,
        } => commands::scan::run(dump, base, signatures, cache_dir, version),
        Command::Cache { action } => commands::cache::run(action),
        Command::Hexdump {
            dump,
            base,
            address,
            size,
            ascii,
        } => commands::hexdump::run(dump, base, address, size, ascii),
    }
}
