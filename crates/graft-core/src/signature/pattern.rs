//! Byte patterns with wildcard positions.

use std::fmt;

use crate::error::{Error, Result};

/// A parsed byte pattern. Each token matches one exact byte or, for a
/// wildcard, any byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<Option<u8>>,
}

impl Pattern {
    /// Parse a pattern string like `"48 8D 0D ?? ?? ?? ??"`. `??` and `?`
    /// are wildcards.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        for token in pattern.split_whitespace() {
            if token == "??" || token == "?" {
                tokens.push(None);
                continue;
            }

            let value = u8::from_str_radix(token, 16).map_err(|e| {
                Error::InvalidSignature(format!("Invalid pattern token '{}': {}", token, e))
            })?;
            tokens.push(Some(value));
        }

        if tokens.is_empty() {
            return Err(Error::InvalidSignature("Pattern is empty".to_string()));
        }

        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Lazy iterator over match offsets in `buffer`, ascending. Callers
    /// take the first offset or keep pulling for all of them.
    pub fn matches<'p, 'b>(&'p self, buffer: &'b [u8]) -> Matches<'p, 'b> {
        Matches {
            tokens: &self.tokens,
            buffer,
            pos: 0,
        }
    }

    /// First match by ascending offset, if any.
    pub fn first_match(&self, buffer: &[u8]) -> Option<usize> {
        self.matches(buffer).next()
    }

    fn matches_at(tokens: &[Option<u8>], buffer: &[u8], offset: usize) -> bool {
        tokens.iter().enumerate().all(|(i, token)| match token {
            Some(value) => buffer[offset + i] == *value,
            None => true,
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .tokens
            .iter()
            .map(|b| match b {
                Some(value) => format!("{:02X}", value),
                None => "??".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&formatted)
    }
}

/// Iterator returned by [`Pattern::matches`].
pub struct Matches<'p, 'b> {
    tokens: &'p [Option<u8>],
    buffer: &'b [u8],
    pos: usize,
}

impl Iterator for Matches<'_, '_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.buffer.len() < self.tokens.len() {
            return None;
        }
        let last = self.buffer.len() - self.tokens.len();

        while self.pos <= last {
            // When the leading token is concrete, let memchr skip to the
            // next candidate instead of stepping one byte at a time.
            let start = match self.tokens[0] {
                Some(first) => {
                    match memchr::memchr(first, &self.buffer[self.pos..=last]) {
                        Some(i) => self.pos + i,
                        None => {
                            self.pos = last + 1;
                            return None;
                        }
                    }
                }
                None => self.pos,
            };

            self.pos = start + 1;
            if Pattern::matches_at(self.tokens, self.buffer, start) {
                return Some(start);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern_with_wildcards() {
        let pattern = Pattern::parse("48 8D 0D ?? ?? ?? ??").unwrap();
        assert_eq!(pattern.len(), 7);
        assert_eq!(pattern.tokens[0], Some(0x48));
        assert_eq!(pattern.tokens[1], Some(0x8D));
        assert_eq!(pattern.tokens[2], Some(0x0D));
        assert_eq!(pattern.tokens[3], None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Pattern::parse("").is_err());
        assert!(Pattern::parse("   ").is_err());
        assert!(Pattern::parse("48 ZZ").is_err());
        assert!(Pattern::parse("489").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        let pattern = Pattern::parse("48 8D 0D ?? FF").unwrap();
        assert_eq!(pattern.to_string(), "48 8D 0D ?? FF");
        assert_eq!(Pattern::parse(&pattern.to_string()).unwrap(), pattern);
    }

    #[test]
    fn test_single_match_with_wildcards() {
        let pattern = Pattern::parse("4D 2B ?? ?? 8B").unwrap();
        let mut buffer = vec![0u8; 256];
        buffer[100..105].copy_from_slice(&[0x4D, 0x2B, 0x01, 0x02, 0x8B]);

        let matches: Vec<usize> = pattern.matches(&buffer).collect();
        assert_eq!(matches, vec![100]);
        assert_eq!(pattern.first_match(&buffer), Some(100));
    }

    #[test]
    fn test_multiple_matches_ascending() {
        let pattern = Pattern::parse("AB ?? CD").unwrap();
        let buffer = [0xAB, 0x00, 0xCD, 0xAB, 0xFF, 0xCD, 0xAB];

        let matches: Vec<usize> = pattern.matches(&buffer).collect();
        assert_eq!(matches, vec![0, 3]);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let pattern = Pattern::parse("DE AD BE EF").unwrap();
        assert_eq!(pattern.first_match(&[0u8; 64]), None);
        assert_eq!(pattern.matches(&[]).count(), 0);
    }

    #[test]
    fn test_wildcard_leading_token() {
        let pattern = Pattern::parse("?? 22 33").unwrap();
        let buffer = [0x11, 0x22, 0x33, 0x99, 0x22, 0x33];
        let matches: Vec<usize> = pattern.matches(&buffer).collect();
        assert_eq!(matches, vec![0, 3]);
    }

    #[test]
    fn test_buffer_shorter_than_pattern() {
        let pattern = Pattern::parse("11 22 33 44").unwrap();
        assert_eq!(pattern.matches(&[0x11, 0x22]).count(), 0);
    }
}
