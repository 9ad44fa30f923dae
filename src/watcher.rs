//! Catalog watcher for long-running processes.
//!
//! Watches the directory containing the project catalog, reloads the catalog
//! once changes have settled for the debounce period, and schedules an index
//! rebuild. Editors and our own atomic saves replace the file via rename, so
//! the parent directory is watched rather than the file itself.

use crate::projects::ProjectCatalog;
use crate::rebuild::RebuildTrigger;
use crate::service::SimilarityService;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep};

/// Errors specific to catalog watching
#[derive(Error, Debug)]
pub enum WatchError {
    #[error(
        "Failed to initialize file watcher: {reason}\nSuggestion: Check file system permissions and inotify limits"
    )]
    WatcherInitFailed { reason: String },

    #[error(
        "Cannot watch path {path:?}: {reason}\nSuggestion: Verify the path exists and you have read permissions"
    )]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Catalog has no file path; in-memory catalogs cannot be watched")]
    NoCatalogPath,
}

pub struct CatalogWatcher {
    catalog: ProjectCatalog,
    service: Arc<SimilarityService>,
    catalog_path: PathBuf,
    debounce: Duration,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    /// The actual file watcher (kept alive by storing it)
    _watcher: notify::RecommendedWatcher,
}

impl CatalogWatcher {
    pub fn new(
        catalog: ProjectCatalog,
        service: Arc<SimilarityService>,
        debounce_ms: u64,
    ) -> Result<Self, WatchError> {
        let catalog_path = catalog
            .path()
            .map(Path::to_path_buf)
            .ok_or(WatchError::NoCatalogPath)?;
        let watch_dir = match catalog_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&watch_dir).map_err(|e| WatchError::PathWatchFailed {
            path: watch_dir.clone(),
            reason: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(100);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The callback is sync
            let _ = tx.blocking_send(res);
        })
        .map_err(|e| WatchError::WatcherInitFailed {
            reason: e.to_string(),
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: watch_dir.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            catalog,
            service,
            catalog_path,
            debounce: Duration::from_millis(debounce_ms),
            event_rx: rx,
            _watcher: watcher,
        })
    }

    fn is_catalog_event(&self, event: &Event) -> bool {
        let relevant_kind = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        relevant_kind
            && event
                .paths
                .iter()
                .any(|path| path.file_name() == self.catalog_path.file_name())
    }

    /// Reload the catalog and schedule a rebuild.
    fn apply_change(&self) {
        if !self.catalog_path.exists() {
            tracing::warn!(
                "Catalog {} was removed, keeping the current index",
                self.catalog_path.display()
            );
            return;
        }

        if let Err(e) = self.catalog.reload() {
            tracing::warn!("Ignoring catalog change: {e}");
            return;
        }

        let trigger = self.service.notify_projects_changed();
        tracing::info!(
            "Catalog changed ({} projects), rebuild {}",
            self.catalog.len(),
            match trigger {
                RebuildTrigger::Started => "started",
                RebuildTrigger::Coalesced => "scheduled",
                RebuildTrigger::Dropped => "already pending",
            }
        );
    }

    /// Run until the event channel closes.
    pub async fn watch(mut self) -> Result<(), WatchError> {
        tracing::info!(
            "Watching {} for changes (debounce {:?})",
            self.catalog_path.display(),
            self.debounce
        );

        let mut last_change: Option<Instant> = None;

        loop {
            let tick = sleep(Duration::from_millis(100));
            tokio::pin!(tick);

            tokio::select! {
                received = self.event_rx.recv() => {
                    match received {
                        Some(Ok(event)) => {
                            if self.is_catalog_event(&event) {
                                last_change = Some(Instant::now());
                            }
                        }
                        Some(Err(e)) => tracing::warn!("File watch error: {e}"),
                        None => return Ok(()),
                    }
                }

                _ = &mut tick => {
                    if let Some(changed_at) = last_change {
                        if changed_at.elapsed() >= self.debounce {
                            last_change = None;
                            self.apply_change();
                        }
                    }
                }
            }
        }
    }
}
