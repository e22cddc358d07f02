pub mod cache;
pub mod hexdump;
pub mod scan;

pub use cache::CacheAction;

/// Parse an address argument, accepting `0x`-prefixed hex or plain
/// decimal.
pub fn parse_address(value: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse()
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x140000000").unwrap(), 0x1_4000_0000);
        assert_eq!(parse_address("0X10").unwrap(), 16);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("nope").is_err());
    }
}
