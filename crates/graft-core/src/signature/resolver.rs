//! Signature resolution over a host memory region.
//!
//! Resolution is cache-first: offsets recorded for the running host
//! version are reused without scanning. Misses fall back to a full scan
//! of the search space. Failures are per-signature and never abort the
//! pass; a dependent module downgrades itself instead of taking the host
//! down with it.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::scan;
use crate::memory::ReadMemory;
use crate::signature::{CancelSignal, Pattern, RipRelative, SignatureCache, SignatureDef, SignatureSet};

/// Outcome of resolving one signature. `NotFound` and `Ambiguous` are
/// expected results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The signature matched exactly once; this is the post-processed
    /// absolute address.
    Resolved(u64),
    /// No match in the search space. The signature is stale for this
    /// host build.
    NotFound,
    /// More than one match. A signature must uniquely identify its
    /// target, so this is a signature-quality bug; the count is kept for
    /// diagnostics.
    Ambiguous(usize),
}

impl Resolution {
    pub fn address(&self) -> Option<u64> {
        match self {
            Resolution::Resolved(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Per-name resolution results for one pass.
#[derive(Debug, Clone, Default)]
pub struct ResolutionMap {
    entries: BTreeMap<String, Resolution>,
}

impl ResolutionMap {
    pub fn insert(&mut self, name: &str, resolution: Resolution) {
        self.entries.insert(name.to_string(), resolution);
    }

    pub fn get(&self, name: &str) -> Option<&Resolution> {
        self.entries.get(name)
    }

    /// Absolute address for `name`, if it resolved.
    pub fn address(&self, name: &str) -> Option<u64> {
        self.entries.get(name).and_then(|r| r.address())
    }

    /// Names that did not resolve, for failure reports.
    pub fn missing(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, r)| !r.is_resolved())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolution)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Resolver<'a, R: ReadMemory> {
    region: &'a R,
    cancel: Option<&'a CancelSignal>,
}

impl<'a, R: ReadMemory> Resolver<'a, R> {
    pub fn new(region: &'a R) -> Self {
        Self {
            region,
            cancel: None,
        }
    }

    /// Abort between signatures when `cancel` triggers. Signatures not
    /// reached are simply absent from the result map.
    pub fn with_cancel(mut self, cancel: &'a CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolve every signature in `set`, consulting and updating `cache`
    /// when one is given. New resolutions are written back immediately so
    /// a restart mid-pass keeps the progress made so far.
    pub fn resolve(
        &self,
        set: &SignatureSet,
        mut cache: Option<&mut SignatureCache>,
    ) -> ResolutionMap {
        let mut map = ResolutionMap::default();
        debug!("Resolving {} signatures...", set.defs.len());

        for def in &set.defs {
            if let Some(cancel) = self.cancel
                && cancel.is_cancelled()
            {
                debug!("Resolution cancelled after {} signatures", map.len());
                break;
            }

            if let Some(cache) = cache.as_deref() {
                if let Some(resolution) = self.from_cache(cache, def) {
                    map.insert(&def.name, resolution);
                    continue;
                }
            }

            let resolution = self.scan_one(def);

            if let (Resolution::Resolved(addr), Some(cache)) = (resolution, cache.as_deref_mut()) {
                // Post-processed targets can land outside the scanned
                // image (a dereferenced pointer slot, say); those cannot
                // be expressed as an offset from base, so they rescan
                // every run instead of poisoning the cache.
                if self.region.contains(addr, 1) {
                    cache.insert(&def.name, addr - self.region.base_address());
                    if let Err(e) = cache.save() {
                        warn!("Failed to save signature cache: {}", e);
                    }
                }
            }

            map.insert(&def.name, resolution);
        }

        map
    }

    fn from_cache(&self, cache: &SignatureCache, def: &SignatureDef) -> Option<Resolution> {
        let offset = cache.offset(&def.name)?;
        let address = self.region.base_address().checked_add(offset)?;

        // A cached offset outside the running image means the cache file
        // was written against a differently sized mapping; rescan.
        if !self.region.contains(address, 1) {
            warn!(
                "Cached offset for '{}' is out of range ({:#x}), rescanning",
                def.name, offset
            );
            return None;
        }

        debug!("  {}: {:#x} (cached)", def.name, address);
        Some(Resolution::Resolved(address))
    }

    fn scan_one(&self, def: &SignatureDef) -> Resolution {
        let pattern = match def.parsed_pattern() {
            Ok(p) => p,
            Err(e) => {
                warn!("  {}: unusable pattern: {}", def.name, e);
                return Resolution::NotFound;
            }
        };

        let matches = self.scan_pattern(&pattern);

        match matches.as_slice() {
            [] => {
                debug!("  {}: not found", def.name);
                Resolution::NotFound
            }
            [match_addr] => match self.post_process(def, *match_addr) {
                Some(addr) => {
                    debug!("  {}: {:#x}", def.name, addr);
                    Resolution::Resolved(addr)
                }
                None => {
                    warn!(
                        "  {}: match at {:#x} but post-processing failed",
                        def.name, match_addr
                    );
                    Resolution::NotFound
                }
            },
            more => {
                warn!(
                    "  {}: {} matches, signature is not unique",
                    def.name,
                    more.len()
                );
                Resolution::Ambiguous(more.len())
            }
        }
    }

    /// Chunked scan over the whole search space. Match collection stops
    /// at a small cap; past two the exact count only matters for logs.
    fn scan_pattern(&self, pattern: &Pattern) -> Vec<u64> {
        let base = self.region.base_address();
        let total = self.region.len().min(scan::LIMIT);

        let mut results: Vec<u64> = Vec::new();
        let mut offset = 0usize;
        let mut tail: Vec<u8> = Vec::new();

        while offset < total && results.len() < scan::MATCH_CAP {
            let read_size = (total - offset).min(scan::CHUNK_SIZE);
            let chunk = match self.region.read_bytes(base + offset as u64, read_size) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Scan stopped at offset {:#x}: {}", offset, e);
                    break;
                }
            };

            let mut data = Vec::with_capacity(tail.len() + chunk.len());
            data.extend_from_slice(&tail);
            data.extend_from_slice(&chunk);
            let data_base = base + offset as u64 - tail.len() as u64;

            for pos in pattern.matches(&data) {
                let addr = data_base + pos as u64;
                // The chunk overlap re-reports matches that straddle the
                // previous boundary.
                if !results.contains(&addr) {
                    results.push(addr);
                }
                if results.len() >= scan::MATCH_CAP {
                    break;
                }
            }

            let keep = pattern.len().saturating_sub(1);
            if data.len() >= keep {
                tail = data[data.len() - keep..].to_vec();
            } else {
                tail = data;
            }

            offset += read_size;
        }

        results
    }

    fn post_process(&self, def: &SignatureDef, match_addr: u64) -> Option<u64> {
        let Some(rip) = &def.rip else {
            return Some(match_addr);
        };
        self.follow_rip(rip, match_addr)
    }

    fn follow_rip(&self, rip: &RipRelative, match_addr: u64) -> Option<u64> {
        let instr_addr = match_addr + rip.instr_offset as u64;
        let disp = self.region.read_i32(instr_addr + rip.disp_offset as u64).ok()?;
        let next_ip = instr_addr + rip.instr_len as u64;
        let mut target = next_ip.wrapping_add_signed(disp as i64);

        if rip.deref {
            target = self.region.read_u64(target).ok()?;
        }

        if rip.addend != 0 {
            target = target.wrapping_add_signed(rip.addend);
        }

        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostVersion;
    use crate::memory::Region;

    fn def(name: &str, pattern: &str) -> SignatureDef {
        SignatureDef {
            name: name.to_string(),
            pattern: pattern.to_string(),
            rip: None,
        }
    }

    fn set(defs: Vec<SignatureDef>) -> SignatureSet {
        SignatureSet {
            host_version: "test".to_string(),
            defs,
        }
    }

    #[test]
    fn test_unique_match_resolves() {
        let mut bytes = vec![0u8; 512];
        bytes[100..105].copy_from_slice(&[0x4D, 0x2B, 0x01, 0x02, 0x8B]);
        let region = Region::from_bytes(0x1000, bytes);

        let map = Resolver::new(&region).resolve(&set(vec![def("target", "4D 2B ?? ?? 8B")]), None);

        assert_eq!(map.address("target"), Some(0x1000 + 100));
    }

    #[test]
    fn test_partial_failure_does_not_abort_pass() {
        let mut bytes = vec![0u8; 512];
        bytes[50..53].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        let region = Region::from_bytes(0x1000, bytes);

        let map = Resolver::new(&region).resolve(
            &set(vec![
                def("missing", "DE AD BE EF"),
                def("present", "AA BB CC"),
            ]),
            None,
        );

        assert_eq!(map.get("missing"), Some(&Resolution::NotFound));
        assert_eq!(map.address("present"), Some(0x1000 + 50));
        assert_eq!(map.missing(), vec!["missing"]);
    }

    #[test]
    fn test_ambiguous_signature_is_not_resolved() {
        let mut bytes = vec![0u8; 512];
        bytes[10..12].copy_from_slice(&[0xAA, 0xBB]);
        bytes[200..202].copy_from_slice(&[0xAA, 0xBB]);
        let region = Region::from_bytes(0x1000, bytes);

        let map = Resolver::new(&region).resolve(&set(vec![def("dup", "AA BB")]), None);

        assert_eq!(map.get("dup"), Some(&Resolution::Ambiguous(2)));
        assert_eq!(map.address("dup"), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let mut bytes = vec![0u8; 2048];
        bytes[777..780].copy_from_slice(&[0x11, 0x22, 0x33]);
        let region = Region::from_bytes(0x40_0000, bytes);
        let defs = set(vec![def("anchor", "11 22 33"), def("gone", "44 55 66")]);

        let first = Resolver::new(&region).resolve(&defs, None);
        let second = Resolver::new(&region).resolve(&defs, None);

        assert_eq!(first.address("anchor"), second.address("anchor"));
        assert_eq!(first.get("gone"), second.get("gone"));
    }

    #[test]
    fn test_rip_relative_follows_call() {
        // call rel32 at offset 64: E8 <disp>, displacement 0x20, so the
        // target is (64 + 5) + 0x20 = 0x85 past the base.
        let mut bytes = vec![0u8; 256];
        bytes[64] = 0xE8;
        bytes[65..69].copy_from_slice(&0x20i32.to_le_bytes());
        bytes[70] = 0x90;
        let region = Region::from_bytes(0x1000, bytes);

        let mut sig = def("callee", "E8 ?? ?? ?? ?? 90");
        sig.rip = Some(RipRelative {
            instr_offset: 0,
            disp_offset: 1,
            instr_len: 5,
            deref: false,
            addend: 0,
        });

        let map = Resolver::new(&region).resolve(&set(vec![sig]), None);
        assert_eq!(map.address("callee"), Some(0x1000 + 64 + 5 + 0x20));
    }

    #[test]
    fn test_rip_relative_with_deref_and_addend() {
        let mut bytes = vec![0u8; 256];
        // mov rax, [rip + disp] shaped: 48 8B 05 <disp>; disp points at a
        // pointer slot holding 0x2000, addend shifts by 8.
        bytes[16..19].copy_from_slice(&[0x48, 0x8B, 0x05]);
        bytes[19..23].copy_from_slice(&9i32.to_le_bytes());
        // next_ip = 16 + 7 = 23; slot at 23 + 9 = 32
        bytes[32..40].copy_from_slice(&0x2000u64.to_le_bytes());
        let region = Region::from_bytes(0x1000, bytes);

        let mut sig = def("table", "48 8B 05");
        sig.rip = Some(RipRelative {
            instr_offset: 0,
            disp_offset: 3,
            instr_len: 7,
            deref: true,
            addend: 8,
        });

        let map = Resolver::new(&region).resolve(&set(vec![sig]), None);
        assert_eq!(map.address("table"), Some(0x2008));
    }

    #[test]
    fn test_cache_hit_skips_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let version = HostVersion::new("9.9");

        let mut bytes = vec![0u8; 256];
        bytes[42..45].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        let region = Region::from_bytes(0x1000, bytes);
        let defs = set(vec![def("anchor", "AA BB CC")]);

        let mut cache = SignatureCache::load(dir.path(), &version);
        let map = Resolver::new(&region).resolve(&defs, Some(&mut cache));
        assert_eq!(map.address("anchor"), Some(0x1000 + 42));

        // Wipe the pattern out of the region. The cached offset must
        // still resolve, proving no scan happened.
        let blank = Region::from_bytes(0x1000, vec![0u8; 256]);
        let mut cache = SignatureCache::load(dir.path(), &version);
        let map = Resolver::new(&blank).resolve(&defs, Some(&mut cache));
        assert_eq!(map.address("anchor"), Some(0x1000 + 42));
    }

    #[test]
    fn test_out_of_range_cached_offset_rescans() {
        let dir = tempfile::tempdir().unwrap();
        let version = HostVersion::new("9.9");

        let mut cache = SignatureCache::load(dir.path(), &version);
        cache.insert("anchor", 0xFFFF_FFFF);
        cache.save().unwrap();

        let mut bytes = vec![0u8; 256];
        bytes[42..45].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        let region = Region::from_bytes(0x1000, bytes);

        let mut cache = SignatureCache::load(dir.path(), &version);
        let map = Resolver::new(&region)
            .resolve(&set(vec![def("anchor", "AA BB CC")]), Some(&mut cache));

        assert_eq!(map.address("anchor"), Some(0x1000 + 42));
        assert_eq!(cache.offset("anchor"), Some(42));
    }
}
