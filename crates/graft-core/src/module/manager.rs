//! The state machine driving every module.
//!
//! Valid transitions: `Uninitialized → Initialized → Enabled ⇄ Disabled
//! → Disposed`, with the `Outdated` side-branch out of initialization.
//! Modules are processed in registration order for every sweep; the
//! order is deterministic across runs but carries no priority meaning —
//! modules are independent by design.

use tracing::{debug, error, warn};

use crate::event::HostEvent;
use crate::module::{Module, ModuleContext, ModuleStatus};

struct Slot {
    module: Box<dyn Module>,
    status: ModuleStatus,
}

#[derive(Default)]
pub struct ModuleManager {
    slots: Vec<Slot>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the registry. Names are unique; a duplicate is
    /// dropped with a warning rather than shadowing the first.
    pub fn register(&mut self, module: Box<dyn Module>) {
        if self.slots.iter().any(|s| s.module.name() == module.name()) {
            warn!(
                "Module '{}' is already registered, ignoring duplicate",
                module.name()
            );
            return;
        }
        self.slots.push(Slot {
            module,
            status: ModuleStatus::Uninitialized,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn status(&self, name: &str) -> Option<ModuleStatus> {
        self.slots
            .iter()
            .find(|s| s.module.name() == name)
            .map(|s| s.status)
    }

    /// Snapshot of every module's status, in registration order. This is
    /// what the overview surface renders.
    pub fn statuses(&self) -> Vec<(&'static str, ModuleStatus)> {
        self.slots
            .iter()
            .map(|s| (s.module.name(), s.status))
            .collect()
    }

    /// Initialize every uninitialized module.
    ///
    /// A module whose required addresses did not all resolve goes to
    /// `Outdated` without its `initialize` running; so does one whose own
    /// initialization faults (a hook conflict surfaces here). Either way
    /// the sweep continues with the remaining modules.
    pub fn initialize_all(&mut self, ctx: &mut ModuleContext) {
        for slot in &mut self.slots {
            if slot.status != ModuleStatus::Uninitialized {
                continue;
            }
            let name = slot.module.name();

            let unresolved: Vec<&str> = slot
                .module
                .required_addresses()
                .iter()
                .copied()
                .filter(|required| ctx.addresses.address(required).is_none())
                .collect();

            if !unresolved.is_empty() {
                warn!(
                    "Module '{}' is outdated: unresolved address(es) {:?}",
                    name, unresolved
                );
                slot.status = ModuleStatus::Outdated;
                continue;
            }

            match slot.module.initialize(ctx) {
                Ok(()) => {
                    debug!("Initialized module '{}'", name);
                    slot.status = ModuleStatus::Initialized;
                }
                Err(e) => {
                    error!("Failed initializing module '{}': {:#}", name, e);
                    slot.status = ModuleStatus::Outdated;
                }
            }
        }
    }

    /// Enable one module by name. Valid from `Initialized` or `Disabled`;
    /// enabling an enabled module is a no-op. A fault in the module's own
    /// enable logic leaves it `Disabled`.
    pub fn enable(&mut self, ctx: &mut ModuleContext, name: &str) {
        let Some(slot) = self.slots.iter_mut().find(|s| s.module.name() == name) else {
            warn!("Cannot enable unknown module '{}'", name);
            return;
        };
        Self::enable_slot(slot, ctx);
    }

    /// Enable every module the predicate selects, in registration order.
    /// One module's failure never prevents the rest from being processed.
    pub fn enable_where(&mut self, ctx: &mut ModuleContext, selected: impl Fn(&str) -> bool) {
        for slot in &mut self.slots {
            if selected(slot.module.name()) {
                Self::enable_slot(slot, ctx);
            }
        }
    }

    fn enable_slot(slot: &mut Slot, ctx: &mut ModuleContext) {
        let name = slot.module.name();
        match slot.status {
            ModuleStatus::Enabled => {}
            ModuleStatus::Initialized | ModuleStatus::Disabled => {
                match slot.module.enable(ctx) {
                    Ok(()) => {
                        debug!("Enabled module '{}'", name);
                        slot.status = ModuleStatus::Enabled;
                    }
                    Err(e) => {
                        error!("Failed enabling module '{}': {:#}", name, e);
                        slot.status = ModuleStatus::Disabled;
                    }
                }
            }
            status => {
                debug!("Not enabling module '{}' in state {}", name, status);
            }
        }
    }

    /// Disable one module. Valid from `Enabled`; calling it twice has the
    /// same effect as calling it once.
    pub fn disable(&mut self, ctx: &mut ModuleContext, name: &str) {
        let Some(slot) = self.slots.iter_mut().find(|s| s.module.name() == name) else {
            warn!("Cannot disable unknown module '{}'", name);
            return;
        };
        Self::disable_slot(slot, ctx);
    }

    fn disable_slot(slot: &mut Slot, ctx: &mut ModuleContext) {
        if slot.status != ModuleStatus::Enabled {
            return;
        }
        let name = slot.module.name();

        if let Err(e) = slot.module.disable(ctx) {
            error!("Failed disabling module '{}': {:#}", name, e);
        }
        // Disabled regardless: the module must not keep receiving events
        // after a teardown was requested.
        slot.status = ModuleStatus::Disabled;
        debug!("Disabled module '{}'", name);
    }

    /// Dispose every module. Enabled modules are disabled first; faults
    /// are logged and the sweep continues, so every module gets its
    /// disposal attempt. Terminal.
    pub fn dispose_all(&mut self, ctx: &mut ModuleContext) {
        for slot in &mut self.slots {
            if slot.status == ModuleStatus::Disposed {
                continue;
            }
            let name = slot.module.name();

            Self::disable_slot(slot, ctx);

            if let Err(e) = slot.module.dispose(ctx) {
                error!("Failed disposing module '{}': {:#}", name, e);
            }
            slot.status = ModuleStatus::Disposed;
        }
    }

    /// Deliver a host signal to every enabled module, in registration
    /// order, synchronously. A fault in one handler is logged with the
    /// module's identity and delivery continues with the rest.
    pub fn dispatch(&mut self, ctx: &mut ModuleContext, event: &HostEvent) {
        for slot in &mut self.slots {
            if slot.status != ModuleStatus::Enabled {
                continue;
            }

            let result = match event {
                HostEvent::FrameTick => slot.module.on_frame(ctx),
                HostEvent::PanelOpened(name) => slot.module.on_panel_open(ctx, name),
                HostEvent::PanelClosed(name) => slot.module.on_panel_close(ctx, name),
                HostEvent::Login => slot.module.on_login(ctx),
                HostEvent::Logout => slot.module.on_logout(ctx),
                HostEvent::ZoneChanged(zone) => slot.module.on_zone_change(ctx, *zone),
                HostEvent::InventoryChanged(changes) => {
                    slot.module.on_inventory_change(ctx, changes)
                }
                HostEvent::LanguageChanged(language) => {
                    slot.module.on_language_change(ctx, language)
                }
            };

            if let Err(e) = result {
                error!(
                    "Module '{}' failed handling {} event: {:#}",
                    slot.module.name(),
                    event.kind(),
                    e
                );
            }
        }
    }
}
