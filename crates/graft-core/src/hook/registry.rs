//! Ownership and state tracking for installed hooks.
//!
//! The registry exclusively owns every hook. Modules hold handles, never
//! hooks, so teardown can always restore the host image even when the
//! requesting module is long gone.
//!
//! Detours run from call sites the module does not control and may
//! re-enter before a prior invocation returns (a detour can trigger the
//! very host behavior it intercepts). Any mutable state a detour touches
//! must be guarded accordingly.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hook::{BytePatch, JUMP_LEN, encode_jump};
use crate::memory::PatchMemory;

/// The explicit path back to intercepted behavior: a copy of the bytes
/// the detour jump displaced, followed by a jump to the remainder of the
/// original function. A detour that wants pass-through behavior invokes
/// this; the registry never does it implicitly.
#[derive(Debug)]
pub struct Trampoline {
    entry: Vec<u8>,
    resume_at: u64,
}

impl Trampoline {
    fn build(displaced: &[u8], resume_at: u64) -> Self {
        let mut entry = displaced.to_vec();
        entry.extend_from_slice(&encode_jump(resume_at));
        Self { entry, resume_at }
    }

    /// The relocated entry code. Executing it runs the displaced prologue
    /// and continues into the unpatched rest of the function.
    pub fn entry_bytes(&self) -> &[u8] {
        &self.entry
    }

    /// Where the trampoline jumps back into the original function.
    pub fn resume_address(&self) -> u64 {
        self.resume_at
    }
}

/// Opaque reference to an installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle(usize);

struct Slot {
    target: u64,
    detour: u64,
    enabled: bool,
    patch: Option<BytePatch>,
    trampoline: Option<Trampoline>,
    removed: bool,
}

pub struct HookRegistry {
    memory: Arc<dyn PatchMemory + Send + Sync>,
    slots: Vec<Slot>,
}

impl HookRegistry {
    pub fn new(memory: Arc<dyn PatchMemory + Send + Sync>) -> Self {
        Self {
            memory,
            slots: Vec::new(),
        }
    }

    /// Record a hook from `target` to `detour`. The hook starts disabled;
    /// nothing is written until [`enable`](Self::enable).
    ///
    /// One live hook per address: installing over an address owned by
    /// another hook is rejected, whether or not that hook is currently
    /// enabled.
    pub fn install(&mut self, target: u64, detour: u64) -> Result<HookHandle> {
        if !self.memory.contains(target, JUMP_LEN) {
            return Err(Error::OutOfBounds {
                address: target,
                len: JUMP_LEN,
            });
        }

        if self.slots.iter().any(|s| !s.removed && s.target == target) {
            return Err(Error::HookConflict { address: target });
        }

        self.slots.push(Slot {
            target,
            detour,
            enabled: false,
            patch: None,
            trampoline: None,
            removed: false,
        });

        debug!("Installed hook at {:#x} (detour {:#x})", target, detour);
        Ok(HookHandle(self.slots.len() - 1))
    }

    fn slot(&self, handle: HookHandle) -> Result<&Slot> {
        self.slots
            .get(handle.0)
            .filter(|s| !s.removed)
            .ok_or(Error::StaleHandle)
    }

    fn slot_mut(&mut self, handle: HookHandle) -> Result<&mut Slot> {
        self.slots
            .get_mut(handle.0)
            .filter(|s| !s.removed)
            .ok_or(Error::StaleHandle)
    }

    /// Write the detour jump. No-op if the hook is already enabled.
    pub fn enable(&mut self, handle: HookHandle) -> Result<()> {
        let memory = Arc::clone(&self.memory);
        let slot = self.slot_mut(handle)?;

        if slot.enabled {
            return Ok(());
        }

        let jump = encode_jump(slot.detour);
        let patch = BytePatch::apply(memory.as_ref(), slot.target, &jump)?;
        slot.trampoline = Some(Trampoline::build(patch.original(), slot.target + JUMP_LEN as u64));
        slot.patch = Some(patch);
        slot.enabled = true;

        debug!("Enabled hook at {:#x}", slot.target);
        Ok(())
    }

    /// Restore the original bytes. No-op if the hook is not enabled;
    /// calling it twice is the same as calling it once.
    pub fn disable(&mut self, handle: HookHandle) -> Result<()> {
        let memory = Arc::clone(&self.memory);
        let slot = self.slot_mut(handle)?;

        if !slot.enabled {
            return Ok(());
        }

        if let Some(patch) = slot.patch.take() {
            patch.restore(memory.as_ref())?;
        }
        slot.trampoline = None;
        slot.enabled = false;

        debug!("Disabled hook at {:#x}", slot.target);
        Ok(())
    }

    /// The original-call path for an enabled hook. `None` while the hook
    /// is disabled: the unpatched function itself is the original path.
    pub fn trampoline(&self, handle: HookHandle) -> Result<Option<&Trampoline>> {
        Ok(self.slot(handle)?.trampoline.as_ref())
    }

    pub fn is_enabled(&self, handle: HookHandle) -> Result<bool> {
        Ok(self.slot(handle)?.enabled)
    }

    pub fn target(&self, handle: HookHandle) -> Result<u64> {
        Ok(self.slot(handle)?.target)
    }

    /// Tear the hook down for good. An enabled hook is disabled first so
    /// no unowned patch is left in the host. The address becomes
    /// installable again; the handle is dead afterwards.
    pub fn remove(&mut self, handle: HookHandle) -> Result<()> {
        self.disable(handle)?;
        let slot = self.slot_mut(handle)?;
        slot.removed = true;
        debug!("Removed hook at {:#x}", slot.target);
        Ok(())
    }

    /// Disable every live hook. Used at teardown; failures are logged and
    /// the sweep continues so one bad slot cannot strand the rest.
    pub fn disable_all(&mut self) {
        for index in 0..self.slots.len() {
            let handle = HookHandle(index);
            if self.slots[index].removed {
                continue;
            }
            if let Err(e) = self.disable(handle) {
                warn!(
                    "Failed to disable hook at {:#x}: {}",
                    self.slots[index].target, e
                );
            }
        }
    }

    /// Number of live (not removed) hooks.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| !s.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
