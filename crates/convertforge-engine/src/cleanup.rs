//! Deferred, best-effort removal of temporary files.
//!
//! Every scheduled removal runs on its own timer task. Failures are logged
//! (and published as [`EventPayload::CleanupFailed`] when an event bus is
//! attached) but never reach the caller, and nothing is retried.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventBus, EventPayload};

/// Schedules delayed deletion of paths.
#[derive(Debug, Clone, Default)]
pub struct CleanupScheduler {
    events: Option<Arc<EventBus>>,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish cleanup failures on `events`.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Delete `path` after `delay`, fire-and-forget.
    ///
    /// Scheduling the same path twice is harmless: the later attempt finds
    /// nothing and does nothing. Returns `None` when called outside a Tokio
    /// runtime, in which case nothing is scheduled.
    pub fn schedule(&self, path: impl Into<PathBuf>, delay: Duration) -> Option<JoinHandle<()>> {
        let path = path.into();
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(path = %path.display(), "no runtime; cleanup not scheduled");
                return None;
            }
        };

        debug!(path = %path.display(), ?delay, "cleanup scheduled");
        let scheduler = self.clone();
        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.remove_now(&path).await;
        }))
    }

    /// Delete `path` immediately. Returns whether a file was removed.
    pub async fn remove_now(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "cleaned up");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cleanup failed");
                if let Some(events) = &self.events {
                    events.publish(EventPayload::CleanupFailed {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    });
                }
                false
            }
        }
    }

    /// Remove regular files in `dir` last modified more than `max_age` ago.
    ///
    /// Timers do not survive a restart, so the server runs this on startup
    /// for files a previous process left behind. A missing directory counts
    /// as empty.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory exists but cannot be listed.
    pub async fn sweep(&self, dir: &Path, max_age: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age >= max_age && self.remove_now(&entry.path()).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(dir = %dir.display(), removed, "swept stale files");
        }
        Ok(removed)
    }
}
