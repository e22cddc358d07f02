//! Wires the pieces into one host-facing extension.
//!
//! Startup order: resolve signatures (cache-first, optionally on a
//! background worker), initialize modules, enable the ones the
//! enablement state selects, then forward host signals until shutdown
//! tears everything back down. Structural mutation — hook patching,
//! module transitions — happens on the host's frame tick; the resolver
//! is the only piece allowed off it, because it only reads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Instant;

use tracing::{debug, info};

use crate::event::{Debouncer, FrameQueue, HostEvent};
use crate::hook::HookRegistry;
use crate::host::{CommandRegistry, HostVersion};
use crate::memory::{PatchMemory, Region};
use crate::module::{Module, ModuleContext, ModuleManager, ModuleStatus};
use crate::signature::{
    CancelSignal, Resolver, ResolutionMap, SignatureCache, SignatureSet, purge_stale,
    spawn_resolve,
};

/// The services every module callback borrows.
struct Services {
    resolutions: ResolutionMap,
    hooks: HookRegistry,
    commands: CommandRegistry,
    debounce: Debouncer,
}

impl Services {
    fn ctx(&mut self, now: Instant) -> ModuleContext<'_> {
        ModuleContext {
            addresses: &self.resolutions,
            hooks: &mut self.hooks,
            commands: &mut self.commands,
            debounce: &mut self.debounce,
            now,
        }
    }
}

pub struct Runtime {
    version: HostVersion,
    region: Arc<Region>,
    manager: ModuleManager,
    services: Services,
    frame_queue: Arc<FrameQueue>,
    pending_resolution: Option<mpsc::Receiver<ResolutionMap>>,
    cancel: Arc<CancelSignal>,
    enabled: HashSet<String>,
    started: bool,
}

impl Runtime {
    pub fn new(region: Arc<Region>, version: HostVersion) -> Self {
        let hooks = HookRegistry::new(Arc::clone(&region) as Arc<dyn PatchMemory + Send + Sync>);
        Self {
            version,
            region,
            manager: ModuleManager::new(),
            services: Services {
                resolutions: ResolutionMap::default(),
                hooks,
                commands: CommandRegistry::new(),
                debounce: Debouncer::new(),
            },
            frame_queue: Arc::new(FrameQueue::new()),
            pending_resolution: None,
            cancel: Arc::new(CancelSignal::new()),
            enabled: HashSet::new(),
            started: false,
        }
    }

    /// Add a module to the static registry. Call before resolution
    /// finishes; registration order is the processing order everywhere.
    pub fn register_module(&mut self, module: Box<dyn Module>) {
        self.manager.register(module);
    }

    /// Set which modules the enablement state selects. The set only
    /// gates the automatic enable sweep after initialization; hot
    /// toggles go through [`enable_module`](Self::enable_module).
    pub fn set_enabled_modules(&mut self, names: impl IntoIterator<Item = String>) {
        self.enabled = names.into_iter().collect();
    }

    pub fn version(&self) -> &HostVersion {
        &self.version
    }

    /// Whether the post-resolution module start has happened.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// A queue background threads use to marshal work onto the frame
    /// tick.
    pub fn frame_queue(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.frame_queue)
    }

    pub fn statuses(&self) -> Vec<(&'static str, ModuleStatus)> {
        self.manager.statuses()
    }

    pub fn resolutions(&self) -> &ResolutionMap {
        &self.services.resolutions
    }

    /// Resolve synchronously on the calling thread, then bring modules
    /// up. Intended for hosts that start the extension before their
    /// frame loop exists.
    pub fn resolve_now(&mut self, set: &SignatureSet, cache_dir: &Path) {
        purge_stale(cache_dir, &self.version);
        let mut cache = SignatureCache::load(cache_dir, &self.version);
        self.services.resolutions =
            Resolver::new(self.region.as_ref()).resolve(set, Some(&mut cache));
        self.start_modules(Instant::now());
    }

    /// Start resolution on a background worker. Modules come up on the
    /// frame tick that observes the finished map.
    pub fn resolve_in_background(&mut self, set: SignatureSet, cache_dir: PathBuf) {
        debug!("Starting background resolution for host {}", self.version);
        self.pending_resolution = Some(spawn_resolve(
            Arc::clone(&self.region),
            set,
            cache_dir,
            self.version.clone(),
            Arc::clone(&self.cancel),
        ));
    }

    fn start_modules(&mut self, now: Instant) {
        let mut ctx = self.services.ctx(now);
        self.manager.initialize_all(&mut ctx);

        let enabled = &self.enabled;
        self.manager
            .enable_where(&mut ctx, |name| enabled.contains(name));

        self.started = true;
        info!("Modules started: {:?}", self.manager.statuses());
    }

    /// One host frame. Drains marshaled work, picks up a finished
    /// background resolution, fires due debounced actions, and forwards
    /// the tick to enabled modules.
    pub fn on_frame(&mut self) {
        self.on_frame_at(Instant::now());
    }

    pub fn on_frame_at(&mut self, now: Instant) {
        self.frame_queue.drain();

        let finished = self
            .pending_resolution
            .as_ref()
            .and_then(|rx| rx.try_recv().ok());
        if let Some(map) = finished {
            self.pending_resolution = None;
            self.services.resolutions = map;
            self.start_modules(now);
        }

        self.services.debounce.poll(now);
        self.dispatch_at(now, &HostEvent::FrameTick);
    }

    /// Forward a host signal to enabled modules.
    pub fn dispatch(&mut self, event: &HostEvent) {
        self.dispatch_at(Instant::now(), event);
    }

    pub fn dispatch_at(&mut self, now: Instant, event: &HostEvent) {
        let mut ctx = self.services.ctx(now);
        self.manager.dispatch(&mut ctx, event);
    }

    /// Hot-enable one module.
    pub fn enable_module(&mut self, name: &str) {
        let mut ctx = self.services.ctx(Instant::now());
        self.manager.enable(&mut ctx, name);
    }

    /// Hot-disable one module.
    pub fn disable_module(&mut self, name: &str) {
        let mut ctx = self.services.ctx(Instant::now());
        self.manager.disable(&mut ctx, name);
    }

    /// Route an operator command. Returns false for an unknown name.
    pub fn invoke_command(&mut self, name: &str, args: &str) -> bool {
        self.services.commands.invoke(name, args)
    }

    /// Tear everything down: cancel an in-flight resolution, dispose all
    /// modules, and sweep any hook still patched into the host.
    pub fn shutdown(&mut self) {
        self.cancel.trigger();
        self.pending_resolution = None;

        let mut ctx = self.services.ctx(Instant::now());
        self.manager.dispose_all(&mut ctx);

        self.services.hooks.disable_all();
        info!("Runtime shut down");
    }
}
