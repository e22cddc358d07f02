//! Hexdump command.
//!
//! Displays raw dump bytes in traditional hexdump format, useful for
//! checking what actually sits at a resolved address.
//!
//! # Output Format
//!
//! ```text
//! 0x000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use graft_core::{ReadMemory, Region};

pub fn run(dump: PathBuf, base: u64, address: u64, size: usize, ascii: bool) -> Result<()> {
    let bytes = fs::read(&dump).with_context(|| format!("Failed to read dump {:?}", dump))?;
    let region = Region::from_bytes(base, bytes);

    let bytes = region
        .read_bytes(address, size)
        .with_context(|| format!("Range {:#x}+{} is outside the dump", address, size))?;

    println!("Hexdump at {:#X} ({} bytes):", address, size);
    println!();

    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offset = i * 16;
        print!("0x{:03X}: ", offset);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                print!(" ");
            }
            print!("{:02X} ", byte);
        }

        if chunk.len() < 16 {
            for j in chunk.len()..16 {
                if j == 8 {
                    print!(" ");
                }
                print!("   ");
            }
        }

        if ascii {
            print!(" |");
            for byte in chunk {
                if *byte >= 0x20 && *byte < 0x7F {
                    print!("{}", *byte as char);
                } else {
                    print!(".");
                }
            }
            for _ in chunk.len()..16 {
                print!(" ");
            }
            print!("|");
        }

        println!();
    }

    Ok(())
}
