//! # graft-core
//!
//! Extension core for a third-party host application whose internal
//! addresses are undocumented and shift between releases.
//!
//! This crate provides:
//! - Byte-signature scanning over the host's loaded image
//! - A per-version cache of resolved addresses, so later runs skip the scan
//! - A hook registry that installs and removes function interceptions
//!   with an explicit path back to original behavior
//! - A supervised lifecycle for independently toggleable feature modules,
//!   with per-module fault containment and host event fan-out
//!
//! The host hands over one mapped memory region and a build version at
//! startup; everything else flows from those two inputs. No failure in
//! this crate is allowed to take the host process down — bad signatures,
//! corrupt caches and broken modules all degrade to a reduced feature
//! set.

pub mod config;
pub mod error;
pub mod event;
pub mod hook;
pub mod host;
pub mod memory;
pub mod module;
pub mod runtime;
pub mod signature;

pub use error::{Error, Result};
pub use event::{Debouncer, FrameQueue, HostEvent, HostEventKind, InventoryChange};
pub use hook::{BytePatch, HookHandle, HookRegistry, JUMP_LEN, Trampoline, encode_jump};
pub use host::{CommandRegistry, HostVersion};
pub use memory::{PatchMemory, ReadMemory, Region};
pub use module::{Module, ModuleContext, ModuleManager, ModuleStatus};
pub use runtime::Runtime;
pub use signature::{
    CancelSignal, Pattern, Resolution, ResolutionMap, Resolver, RipRelative, SignatureCache,
    SignatureDef, SignatureSet, load_signatures, purge_stale, save_signatures, spawn_resolve,
};
