//! Host-originated signals and the supporting dispatch toolkit.

mod debounce;
mod frame;

pub use debounce::Debouncer;
pub use frame::FrameQueue;

use strum::{Display, EnumDiscriminants};

/// One change record in an inventory batch. The payload passes through
/// the dispatch layer untouched; only modules interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryChange {
    pub container: u32,
    pub slot: u32,
    pub delta: i32,
}

/// A signal delivered by the host, forwarded to enabled modules in
/// registration order.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(HostEventKind), derive(Display))]
pub enum HostEvent {
    FrameTick,
    PanelOpened(String),
    PanelClosed(String),
    Login,
    Logout,
    ZoneChanged(u32),
    InventoryChanged(Vec<InventoryChange>),
    LanguageChanged(String),
}

impl HostEvent {
    pub fn kind(&self) -> HostEventKind {
        self.into()
    }
}
