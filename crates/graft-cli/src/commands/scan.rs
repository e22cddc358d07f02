//! Scan command: run a signature set against a saved memory dump.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use graft_core::{
    HostVersion, Region, Resolution, Resolver, SignatureCache, load_signatures,
};
use owo_colors::OwoColorize;
use tracing::info;

pub fn run(
    dump: PathBuf,
    base: u64,
    signatures: PathBuf,
    cache_dir: Option<PathBuf>,
    version: Option<String>,
) -> Result<()> {
    let bytes = fs::read(&dump).with_context(|| format!("Failed to read dump {:?}", dump))?;
    info!("Loaded {} bytes at base {:#x}", bytes.len(), base);
    let region = Region::from_bytes(base, bytes);

    let set = load_signatures(&signatures)
        .with_context(|| format!("Failed to load signature set {:?}", signatures))?;
    let version = HostVersion::new(version.unwrap_or_else(|| set.host_version.clone()));

    let mut cache = match &cache_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache directory {:?}", dir))?;
            Some(SignatureCache::load(dir, &version))
        }
        None => None,
    };

    let map = Resolver::new(&region).resolve(&set, cache.as_mut());

    println!("Host version: {}", version);
    println!();

    let mut resolved = 0usize;
    for (name, resolution) in map.iter() {
        match resolution {
            Resolution::Resolved(addr) => {
                resolved += 1;
                println!(
                    "  {:<28} {}",
                    name,
                    format!("{:#x}", addr).green()
                );
            }
            Resolution::NotFound => {
                println!("  {:<28} {}", name, "not found".red());
            }
            Resolution::Ambiguous(count) => {
                println!(
                    "  {:<28} {}",
                    name,
                    format!("ambiguous ({} matches)", count).yellow()
                );
            }
        }
    }

    println!();
    println!("{}/{} signatures resolved", resolved, map.len());

    if cache.is_some() {
        info!("Resolved addresses written back to the cache");
    }

    Ok(())
}
