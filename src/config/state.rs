// Application state module
// Shared between all connection tasks

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Notify;

use super::types::Config;
use crate::device::DeviceRegistry;

/// Application state
pub struct AppState {
    pub config: Config,
    pub registry: DeviceRegistry,
    pub shutdown_signal: Arc<Notify>,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            registry: DeviceRegistry::new(config.registry.max_entries),
            shutdown_signal: Arc::new(Notify::new()),
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        }
    }
}
