//! Background signature resolution.
//!
//! Scanning megabytes of host memory must not stall the host's frame
//! loop, so the full pass runs on a worker thread. The resolver only
//! reads, which is safe concurrently with the host's own execution; the
//! finished map is handed back over a channel and picked up on a later
//! frame tick.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::host::HostVersion;
use crate::memory::ReadMemory;
use crate::signature::{Resolver, ResolutionMap, SignatureCache, SignatureSet, purge_stale};

/// A cancellation signal with interruptible waits.
///
/// Unlike `thread::sleep()`, waits on this signal wake immediately when
/// cancellation triggers.
pub struct CancelSignal {
    cancelled: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Trigger cancellation, waking all waiting threads.
    pub fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for `duration` or until cancellation.
    ///
    /// Returns `true` if cancellation was triggered, `false` if the wait
    /// ran its course.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }

        let guard = match self.mutex.lock() {
            Ok(g) => g,
            Err(_) => return true,
        };
        match self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_cancelled())
        {
            Ok((_, timeout_result)) => !timeout_result.timed_out(),
            Err(_) => true,
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `set` on a background thread, consulting the cache directory
/// for the given host version and purging stale cache files first.
///
/// The receiver yields exactly one map when the pass finishes; if the
/// pass is cancelled the sender is dropped and the receiver disconnects.
pub fn spawn_resolve<R>(
    region: Arc<R>,
    set: SignatureSet,
    cache_dir: PathBuf,
    version: HostVersion,
    cancel: Arc<CancelSignal>,
) -> mpsc::Receiver<ResolutionMap>
where
    R: ReadMemory + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        purge_stale(&cache_dir, &version);
        let mut cache = SignatureCache::load(&cache_dir, &version);

        debug!(
            "Background resolution started ({} signatures, {} cached)",
            set.defs.len(),
            cache.len()
        );

        let map = Resolver::new(region.as_ref())
            .with_cancel(&cancel)
            .resolve(&set, Some(&mut cache));

        if cancel.is_cancelled() {
            debug!("Background resolution cancelled, discarding results");
            return;
        }

        info!(
            "Background resolution finished: {}/{} resolved",
            map.iter().filter(|(_, r)| r.is_resolved()).count(),
            map.len()
        );

        // The receiving side may be gone during shutdown; nothing to do.
        let _ = tx.send(map);
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Region;
    use crate::signature::SignatureDef;
    use std::time::Instant;

    #[test]
    fn test_cancel_initial_state() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        signal.trigger();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_wait_timeout() {
        let signal = CancelSignal::new();
        let start = Instant::now();
        let interrupted = signal.wait(Duration::from_millis(50));
        assert!(!interrupted);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_interrupted() {
        let signal = Arc::new(CancelSignal::new());
        let clone = Arc::clone(&signal);

        let handle = thread::spawn(move || clone.wait(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_spawn_resolve_delivers_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0u8; 512];
        bytes[99..102].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        let region = Arc::new(Region::from_bytes(0x1000, bytes));

        let set = SignatureSet {
            host_version: "1.0".to_string(),
            defs: vec![SignatureDef {
                name: "anchor".to_string(),
                pattern: "AA BB CC".to_string(),
                rip: None,
            }],
        };

        let rx = spawn_resolve(
            region,
            set,
            dir.path().to_path_buf(),
            HostVersion::new("1.0"),
            Arc::new(CancelSignal::new()),
        );

        let map = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(map.address("anchor"), Some(0x1000 + 99));

        // The pass wrote its resolution back to the cache directory.
        let cache = SignatureCache::load(dir.path(), &HostVersion::new("1.0"));
        assert_eq!(cache.offset("anchor"), Some(99));
    }

    #[test]
    fn test_cancelled_pass_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let region = Arc::new(Region::from_bytes(0, vec![0u8; 64]));
        let cancel = Arc::new(CancelSignal::new());
        cancel.trigger();

        let rx = spawn_resolve(
            region,
            SignatureSet::default(),
            dir.path().to_path_buf(),
            HostVersion::new("1.0"),
            cancel,
        );

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
    }
}
