//! Cache command: inspect and clean up per-version cache files.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use graft_core::{HostVersion, SignatureCache, purge_stale};
use owo_colors::OwoColorize;

#[derive(Subcommand)]
pub enum CacheAction {
    /// List the entries cached for a host version
    Show {
        /// Cache directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Host version the cache was written for
        #[arg(short, long)]
        version: String,
    },

    /// Delete cache files for every other host version
    Purge {
        /// Cache directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Host version to keep
        #[arg(short, long)]
        version: String,
    },
}

pub fn run(action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Show { dir, version } => {
            let version = HostVersion::new(version);
            let cache = SignatureCache::load(&dir, &version);

            if cache.is_empty() {
                println!("No cache entries for host version {}", version);
                return Ok(());
            }

            println!("Host version: {}", version);
            for (name, offset) in cache.iter() {
                println!("  {:<28} {}", name, format!("+{:#x}", offset).green());
            }
            println!();
            println!("{} entries", cache.len());
        }
        CacheAction::Purge { dir, version } => {
            let version = HostVersion::new(version);
            purge_stale(&dir, &version);
            println!("Purged stale cache files (kept {})", version);
        }
    }

    Ok(())
}
