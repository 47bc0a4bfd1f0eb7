//! # Sync Session
//!
//! One authenticated session's worth of shared services, constructed
//! explicitly and passed to whoever needs them: the derived-result cache
//! behind its analysis gate, the notification store, the realtime bus and
//! the section endpoint editable units save through.
//!
//! [`SyncSession::shutdown`] ends the session: open units are disposed, the
//! push transport and background consumers are stopped.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::cache::analysis_gate::AnalysisGate;
use crate::cache::derived_cache::DerivedResultCache;
use crate::core::lock;
use crate::core::model::{SavedSection, SectionSnapshot, UnitId};
use crate::core::save_coordinator::{AutosaveOptions, SaveCoordinator};
use crate::errors::Result;
use crate::realtime::bus::RealtimeBus;
use crate::realtime::notifications::NotificationStore;
use crate::realtime::watcher::spawn_cache_invalidator;
use crate::retrieve::api::{AnalysisApi, NotificationApi, SectionApi};

/// Shared services of one session.
pub struct SyncSession {
    sections: Arc<dyn SectionApi>,
    gate: AnalysisGate,
    bus: Arc<RealtimeBus>,
    options: AutosaveOptions,
    units: Mutex<Vec<SaveCoordinator>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncSession {
    /// Wires a session from its collaborators.
    pub fn new(
        sections: Arc<dyn SectionApi>,
        analysis: Arc<dyn AnalysisApi>,
        notifications: Arc<dyn NotificationApi>,
        cache: DerivedResultCache,
        options: AutosaveOptions,
    ) -> Self {
        let store = Arc::new(NotificationStore::new(notifications));
        Self {
            sections,
            gate: AnalysisGate::new(Arc::new(cache), analysis),
            bus: RealtimeBus::new(store),
            options,
            units: Mutex::new(Vec::new()),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Builds a session against the REST backend described by `config`.
    ///
    /// The cache lives in `cacheDir/<namespace>.json` when a directory is
    /// configured and in memory otherwise.
    #[cfg(feature = "http")]
    pub fn from_config(config: &crate::configs::SyncConfig) -> Result<Self> {
        use crate::cache::storage::{FileStorage, MemoryStorage};
        use crate::retrieve::backend::HttpBackend;

        let backend = Arc::new(HttpBackend::new(config.require_api_base_url()?, config.auth_token.clone())?);
        let cache = match &config.cache_dir {
            Some(dir) => DerivedResultCache::open(FileStorage::new(dir, config.cache_namespace())),
            None => DerivedResultCache::open(MemoryStorage::new()),
        };
        let options = AutosaveOptions {
            debounce: config.debounce(),
            toast_window: config.toast_window(),
        };
        Ok(Self::new(backend.clone(), backend.clone(), backend, cache, options))
    }

    /// Starts tracking a section loaded from the server.
    pub fn open_section(&self, section: &SavedSection) -> Result<SaveCoordinator> {
        let unit = UnitId::new(section.id.clone(), section.owner_id.clone().unwrap_or_default());
        self.open_unit(unit, section.snapshot())
    }

    /// Starts tracking a unit with an explicit persisted snapshot.
    pub fn open_unit(&self, unit: UnitId, loaded: SectionSnapshot) -> Result<SaveCoordinator> {
        let coordinator = SaveCoordinator::new(unit, loaded, Arc::clone(&self.sections), self.options)?;
        let mut units = lock(&self.units);
        units.retain(SaveCoordinator::is_live);
        units.push(coordinator.clone());
        Ok(coordinator)
    }

    /// Cache-first analysis access.
    pub fn analysis(&self) -> &AnalysisGate {
        &self.gate
    }

    /// The derived-result cache.
    pub fn cache(&self) -> &Arc<DerivedResultCache> {
        self.gate.cache()
    }

    /// The realtime bus.
    pub fn bus(&self) -> &Arc<RealtimeBus> {
        &self.bus
    }

    /// The notification list.
    pub fn notifications(&self) -> &Arc<NotificationStore> {
        self.bus.notifications()
    }

    /// Evicts cached analyses of `collection` owners named by status-change pushes.
    pub fn watch_cache_invalidation(&self, collection: &str) {
        let task = spawn_cache_invalidator(&self.bus, Arc::clone(self.cache()), collection, self.bus.shutdown_token());
        lock(&self.background).push(task);
    }

    /// Opens the session's single push connection.
    #[cfg(feature = "ws")]
    pub fn connect_push(&self, config: crate::realtime::ws_transport::WsTransportConfig) -> Result<()> {
        let task = crate::realtime::ws_transport::WsPushTransport::spawn(config, &self.bus)?;
        lock(&self.background).push(task);
        Ok(())
    }

    /// Tracks a host-spawned task so `shutdown` waits for it.
    pub fn track(&self, task: JoinHandle<()>) {
        lock(&self.background).push(task);
    }

    /// Ends the session.
    pub async fn shutdown(&self) {
        let units: Vec<SaveCoordinator> = lock(&self.units).drain(..).collect();
        for unit in &units {
            unit.dispose();
        }
        self.bus.shutdown();

        let tasks: Vec<JoinHandle<()>> = lock(&self.background).drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("Session task ended abnormally: {}", e);
            }
        }
        log::info!("Sync session closed ({} units disposed)", units.len());
    }
}
