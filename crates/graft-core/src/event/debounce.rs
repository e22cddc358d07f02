//! Quiet-period collapsing for bursty notifications.
//!
//! A batch of low-level change signals (several inventory slots changing
//! in one transaction) should produce one downstream refresh, not one per
//! signal. Each scheduled action is keyed; scheduling again during the
//! quiet period replaces the pending deadline and payload, so only the
//! most recent request survives a burst. Replacement is a deliberate
//! supersede, not a failure, and nothing is retried afterwards.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

type Action = Box<dyn FnOnce() + Send>;
type Guard = Box<dyn Fn() -> bool + Send>;

struct Pending {
    deadline: Instant,
    action: Action,
    guard: Option<Guard>,
}

/// Pending-timer state for debounced actions, polled from the frame tick.
#[derive(Default)]
pub struct Debouncer {
    pending: BTreeMap<String, Pending>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to run once `quiet` has passed since `now`.
    /// A pending action under the same key is replaced, deadline and all.
    pub fn schedule(
        &mut self,
        now: Instant,
        key: &str,
        quiet: Duration,
        action: impl FnOnce() + Send + 'static,
    ) {
        self.insert(now, key, quiet, Box::new(action), None);
    }

    /// Like [`schedule`](Self::schedule), but `guard` is consulted at
    /// fire time: if it returns false the action is dropped. The policy
    /// of whether a refresh still applies belongs to the module that
    /// scheduled it, not to the dispatch layer.
    pub fn schedule_if(
        &mut self,
        now: Instant,
        key: &str,
        quiet: Duration,
        guard: impl Fn() -> bool + Send + 'static,
        action: impl FnOnce() + Send + 'static,
    ) {
        self.insert(now, key, quiet, Box::new(action), Some(Box::new(guard)));
    }

    fn insert(
        &mut self,
        now: Instant,
        key: &str,
        quiet: Duration,
        action: Action,
        guard: Option<Guard>,
    ) {
        if self.pending.contains_key(key) {
            debug!("Superseding pending action '{}'", key);
        }
        self.pending.insert(
            key.to_string(),
            Pending {
                deadline: now + quiet,
                action,
                guard,
            },
        );
    }

    /// Drop a pending action without running it.
    pub fn cancel(&mut self, key: &str) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Run every action whose quiet period has elapsed at `now`. Returns
    /// the number of actions that ran.
    pub fn poll(&mut self, now: Instant) -> usize {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut fired = 0;
        for key in due {
            let Some(pending) = self.pending.remove(&key) else {
                continue;
            };

            if let Some(guard) = &pending.guard
                && !guard()
            {
                debug!("Pending action '{}' no longer applies, dropping", key);
                continue;
            }

            (pending.action)();
            fired += 1;
        }

        fired
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
