//! Feature modules and their lifecycle.

mod manager;

pub use manager::ModuleManager;

use std::time::Instant;

use strum::Display;

use crate::event::{Debouncer, InventoryChange};
use crate::hook::HookRegistry;
use crate::host::CommandRegistry;
use crate::signature::ResolutionMap;

/// Where a module is in its lifecycle.
///
/// `Outdated` is a terminal side-branch: a required address failed to
/// resolve (or initialization itself failed), so the module can never be
/// enabled against this host build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModuleStatus {
    Uninitialized,
    Initialized,
    Enabled,
    Disabled,
    Outdated,
    Disposed,
}

/// Services handed into every module callback. Ownership stays with the
/// runtime; modules borrow for the duration of the call.
pub struct ModuleContext<'a> {
    /// Addresses produced by the signature resolution pass.
    pub addresses: &'a ResolutionMap,
    pub hooks: &'a mut HookRegistry,
    pub commands: &'a mut CommandRegistry,
    pub debounce: &'a mut Debouncer,
    /// Timestamp of the current frame, for debounce scheduling.
    pub now: Instant,
}

/// An independently toggleable feature unit.
///
/// Modules are registered statically at startup; the manager drives every
/// transition and contains faults, so one broken module never takes its
/// neighbors down. All callbacks default to no-ops — a module implements
/// only what it needs.
pub trait Module: Send {
    /// Unique internal name. Also the key in enablement configuration.
    fn name(&self) -> &'static str;

    /// Signature names this module cannot function without. Any of them
    /// failing to resolve marks the module `Outdated`.
    fn required_addresses(&self) -> &'static [&'static str] {
        &[]
    }

    /// Install hooks (disabled) and acquire resources. Runs once.
    fn initialize(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Turn the feature on: enable hooks, register commands.
    fn enable(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Turn the feature off, leaving it re-enableable.
    fn disable(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Final teardown. The manager removes the module's hooks afterwards
    /// regardless of the outcome.
    fn dispose(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_frame(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_panel_open(&mut self, _ctx: &mut ModuleContext, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_panel_close(&mut self, _ctx: &mut ModuleContext, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_login(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_logout(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_zone_change(&mut self, _ctx: &mut ModuleContext, _zone: u32) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_inventory_change(
        &mut self,
        _ctx: &mut ModuleContext,
        _changes: &[InventoryChange],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_language_change(&mut self, _ctx: &mut ModuleContext, _language: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
