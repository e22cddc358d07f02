//! Tuning constants shared across the crate.

/// Signature scanning parameters.
pub mod scan {
    /// Chunk size for incremental scans over large regions.
    pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

    /// Hard cap on bytes scanned per signature. Host images are tens of
    /// megabytes; anything past this is not code we should be matching.
    pub const LIMIT: usize = 256 * 1024 * 1024;

    /// Stop collecting match positions past this count. Two is enough to
    /// know a signature is ambiguous.
    pub const MATCH_CAP: usize = 8;
}

/// Signature cache parameters.
pub mod cache {
    /// Cache files are named `{PREFIX}{sanitized host version}.json`.
    pub const PREFIX: &str = "sigcache_";
}

/// Event dispatch parameters.
pub mod dispatch {
    use std::time::Duration;

    /// Default quiet period for debounced actions. Matches the refresh
    /// delay the host needs before batched changes settle.
    pub const DEFAULT_QUIET: Duration = Duration::from_millis(500);
}
