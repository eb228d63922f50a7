use std::path::PathBuf;
use std::sync::Arc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::Result;

/// Counters reported when the watcher stops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub folders_seen: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Watches one directory (non-recursively) for new session folders and
/// hands each to the [`Dispatcher`] on its own task.
#[derive(Debug)]
pub struct FolderWatcher {
    watch_dir: PathBuf,
    dispatcher: Arc<Dispatcher>,
}

impl FolderWatcher {
    pub fn new(watch_dir: impl Into<PathBuf>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            dispatcher,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<WatchSummary> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        if tx.send(path).is_err() {
                            debug!("watch channel closed; dropping event");
                        }
                    }
                }
                Err(err) => error!(error = %err, "watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&self.watch_dir, RecursiveMode::NonRecursive)?;
        info!(dir = %self.watch_dir.display(), "watching for new session folders");

        let mut summary = WatchSummary::default();
        let mut tasks: JoinSet<Option<DispatchOutcome>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(path) = rx.recv() => {
                    let is_dir = tokio::fs::metadata(&path)
                        .await
                        .map(|md| md.is_dir())
                        .unwrap_or(false);
                    if !is_dir {
                        continue;
                    }
                    summary.folders_seen += 1;
                    info!(folder = %path.display(), "new folder detected");

                    let dispatcher = Arc::clone(&self.dispatcher);
                    tasks.spawn(async move {
                        match dispatcher.handle_new_folder(&path).await {
                            Ok(outcome) => Some(outcome),
                            Err(err) => {
                                error!(folder = %path.display(), error = %err, "dispatch failed");
                                None
                            }
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    summary.record(joined);
                }
            }
        }

        drop(watcher);
        // In-flight dispatches are abandoned with the watcher.
        tasks.shutdown().await;
        info!(
            seen = summary.folders_seen,
            submitted = summary.submitted,
            skipped = summary.skipped,
            failed = summary.failed,
            "folder watcher stopped"
        );
        Ok(summary)
    }
}

impl WatchSummary {
    fn record(&mut self, joined: std::result::Result<Option<DispatchOutcome>, JoinError>) {
        match joined {
            Ok(Some(DispatchOutcome::Submitted { .. })) => self.submitted += 1,
            Ok(Some(DispatchOutcome::Skipped { .. })) => self.skipped += 1,
            Ok(None) => self.failed += 1,
            Err(err) => {
                warn!(error = %err, "dispatch task aborted");
                self.failed += 1;
            }
        }
    }
}
