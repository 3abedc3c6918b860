//! Config supervision and hot reload
//!
//! Watches the config file's parent directory (editors replace files rather
//! than writing in place), debounces change bursts, then parses, validates
//! and atomically publishes a fresh routing core. A failed parse keeps the
//! previous configuration live. Group cooldowns reset on successful reload:
//! stale cooldowns surviving an operator's fix are more surprising than an
//! extra probe round.

use crate::config::Config;
use crate::core::RelayCore;
use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

/// Quiet window before a change burst is acted upon
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Invoked with the fresh core after every successful reload
pub type ReloadCallback = Arc<dyn Fn(&Arc<RelayCore>) + Send + Sync>;

/// Watches the config file and republishes the routing core
pub struct ConfigSupervisor {
    path: PathBuf,
    promote: Option<String>,
    core: Arc<ArcSwap<RelayCore>>,
    generation: AtomicU64,
    callbacks: Mutex<Vec<ReloadCallback>>,
}

impl ConfigSupervisor {
    /// Create a supervisor over the given config path and live core handle
    pub fn new(
        path: impl Into<PathBuf>,
        promote: Option<String>,
        core: Arc<ArcSwap<RelayCore>>,
        initial_generation: u64,
    ) -> Self {
        Self {
            path: path.into(),
            promote,
            core,
            generation: AtomicU64::new(initial_generation),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback run after each successful reload
    pub fn on_reload(&self, callback: ReloadCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Current configuration generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start watching; returns once the watcher is installed
    pub fn spawn(self: Arc<Self>) -> crate::utils::error::Result<tokio::task::JoinHandle<()>> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                return;
            }
            let ours = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if ours {
                let _ = tx.send(());
            }
        })
        .map_err(|e| {
            crate::utils::error::RelayError::Config(format!("Failed to create watcher: {}", e))
        })?;

        let watch_root = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher
            .watch(watch_root, RecursiveMode::NonRecursive)
            .map_err(|e| {
                crate::utils::error::RelayError::Config(format!(
                    "Failed to watch {:?}: {}",
                    watch_root, e
                ))
            })?;

        info!(path = ?self.path, "Config supervisor watching for changes");

        Ok(tokio::spawn(async move {
            // The watcher lives inside the task; dropping it would end
            // event delivery
            let _watcher = watcher;
            while rx.recv().await.is_some() {
                // Swallow the burst: editors emit several events per save
                while let Ok(Some(())) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {}
                self.reload().await;
            }
        }))
    }

    /// Parse, validate and publish a new core; keep the old one on failure
    pub async fn reload(&self) {
        debug!(path = ?self.path, "Config change detected, reloading");

        let config = match Config::from_file(&self.path, self.promote.as_deref()).await {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Config reload failed, retaining previous configuration");
                return;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let core = match RelayCore::from_config(Arc::new(config), generation) {
            Ok(core) => Arc::new(core),
            Err(e) => {
                error!(error = %e, "Core rebuild failed, retaining previous configuration");
                return;
            }
        };

        self.core.store(core.clone());
        info!(
            generation,
            "Configuration reloaded; group cooldowns and counters reset"
        );

        // Callbacks run serially with no supervisor lock held
        let callbacks: Vec<ReloadCallback> = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(&core);
        }
    }
}
