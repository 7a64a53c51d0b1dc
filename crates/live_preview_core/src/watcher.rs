//! Watching the previewed document for changes.
//!
//! Uses the platform notifier (inotify, FSEvents, ...) when available and
//! falls back to polling the modification time otherwise. Changes are
//! published as a revision counter on a [`watch`] channel, so a slow
//! consumer only ever sees the latest revision instead of a backlog.

use crate::error::PreviewError;
use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Configuration for the file watcher.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Polling interval in milliseconds for fallback polling mode
    pub poll_interval_ms: u64,
    /// Skip the platform notifier and always poll.
    pub force_polling: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            force_polling: false,
        }
    }
}

enum Backend {
    Notify(RecommendedWatcher),
    Polling(JoinHandle<()>),
}

/// Watches one file. The revision starts at 0 and grows on every change.
pub struct DocumentWatcher {
    path: PathBuf,
    revisions: watch::Receiver<u64>,
    backend: Backend,
}

impl DocumentWatcher {
    /// Start watching `path`. Must be called within a tokio runtime.
    pub fn new(path: &Path, config: WatcherConfig) -> Result<Self, PreviewError> {
        let path = path.to_path_buf();
        let (tx, revisions) = watch::channel(0u64);

        let backend = if config.force_polling {
            Backend::Polling(spawn_polling_watcher(&path, &config, tx))
        } else {
            match try_notify_watcher(&path, tx.clone()) {
                Ok(watcher) => {
                    tracing::info!(path = ?path, "Started notify-based file watcher");
                    Backend::Notify(watcher)
                }
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        path = ?path,
                        "notify file watcher failed, falling back to polling"
                    );
                    Backend::Polling(spawn_polling_watcher(&path, &config, tx))
                }
            }
        };

        Ok(Self {
            path,
            revisions,
            backend,
        })
    }

    /// Receiver of the revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.backend, Backend::Polling(_))
    }
}

impl Drop for DocumentWatcher {
    fn drop(&mut self) {
        if let Backend::Polling(task) = &self.backend {
            task.abort();
        }
    }
}

fn bump(tx: &watch::Sender<u64>) {
    tx.send_modify(|revision| *revision += 1);
}

fn try_notify_watcher(
    file_path: &Path,
    tx: watch::Sender<u64>,
) -> Result<RecommendedWatcher, PreviewError> {
    // Editors often replace the file on save, so watch the directory and
    // filter by name.
    let (Some(parent), Some(file_name)) = (file_path.parent(), file_path.file_name()) else {
        return Err(PreviewError::Watch(format!(
            "invalid file path: {}",
            file_path.display()
        )));
    };
    let file_name = file_name.to_os_string();
    let watch_target = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| match res {
            Ok(event) => {
                let is_target_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));

                if is_target_file
                    && (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove())
                {
                    bump(&tx);
                }
            }
            Err(e) => {
                tracing::error!(?e, "File watcher error");
            }
        },
        notify::Config::default(),
    )
    .map_err(|err| PreviewError::Watch(err.to_string()))?;

    watcher
        .watch(watch_target, RecursiveMode::NonRecursive)
        .map_err(|err| PreviewError::Watch(err.to_string()))?;

    Ok(watcher)
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn spawn_polling_watcher(
    file_path: &Path,
    config: &WatcherConfig,
    tx: watch::Sender<u64>,
) -> JoinHandle<()> {
    let file_path = file_path.to_path_buf();
    let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
    let mut last_mtime = modified(&file_path);

    tracing::info!(
        path = ?file_path,
        poll_interval_ms = config.poll_interval_ms,
        "Started polling-based file watcher"
    );

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(poll_interval).await;

            let current_mtime = modified(&file_path);
            if current_mtime != last_mtime {
                // A vanished file counts as a change too, the reader reports it.
                last_mtime = current_mtime;
                bump(&tx);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(!config.force_polling);
    }

    #[tokio::test]
    async fn test_polling_watcher_sees_modification() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# One").unwrap();

        let config = WatcherConfig {
            poll_interval_ms: 10,
            force_polling: true,
        };
        let watcher = DocumentWatcher::new(file.path(), config).unwrap();
        assert!(watcher.is_polling());
        let mut revisions = watcher.subscribe();
        assert_eq!(*revisions.borrow(), 0);

        // Make sure the new mtime differs even on coarse-grained filesystems.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let later = SystemTime::now() + Duration::from_secs(5);
        file.as_file().set_modified(later).unwrap();

        tokio::time::timeout(Duration::from_secs(5), revisions.changed())
            .await
            .expect("the change is noticed")
            .unwrap();
        assert!(*revisions.borrow() >= 1);
    }
}
