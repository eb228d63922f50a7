use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Transfer, TransferReport, connector_for};
use crate::config::TransferConfig;
use crate::error::{PipelineError, Result};
use crate::viewpoint::ViewpointSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// Copy only folders holding exactly this many files.
    Complete { expected_files: usize },
    /// Mirror the whole tree.
    Mirror,
}

/// Runs a [`Transfer`] pass on a fixed interval until cancelled.
///
/// A failed pass is logged and abandoned; the next tick starts fresh.
/// Cancellation is observed mid-pass as well; the blocking pass itself is
/// left to finish or time out in the background.
#[derive(Clone, Debug)]
pub struct TransferPoller {
    name: &'static str,
    transfer: Arc<Transfer>,
    kind: PassKind,
    interval: Duration,
}

impl TransferPoller {
    pub fn new(name: &'static str, transfer: Transfer, kind: PassKind, interval: Duration) -> Self {
        Self {
            name,
            transfer: Arc::new(transfer),
            kind,
            interval,
        }
    }

    /// Input leg: completeness-gated sync from the configured source.
    ///
    /// The expected file count defaults to the number of viewpoints.
    pub fn input_leg(config: &TransferConfig, views: &ViewpointSet) -> Result<Self> {
        let (connector, source_root) = connector_for(&config.source)?;
        let expected_files = config.expected_files.unwrap_or(views.len());
        Ok(Self::new(
            "sync",
            Transfer::new(connector, source_root, &config.dest_root),
            PassKind::Complete { expected_files },
            config.poll_interval(),
        ))
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    /// One pass on the blocking pool.
    pub async fn run_once(&self) -> Result<TransferReport> {
        let transfer = Arc::clone(&self.transfer);
        let kind = self.kind;
        tokio::task::spawn_blocking(move || match kind {
            PassKind::Complete { expected_files } => transfer.sync_complete(expected_files),
            PassKind::Mirror => transfer.mirror(),
        })
        .await
        .map_err(|err| PipelineError::Internal(format!("transfer pass panicked: {err}")))?
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            poller = self.name,
            source = %self.transfer.source_root().display(),
            dest = %self.transfer.dest_root().display(),
            interval_ms = self.interval.as_millis() as u64,
            "poller started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(poller = self.name, "pass abandoned on shutdown");
                    break;
                }
                result = self.run_once() => {
                    if let Err(err) = result {
                        warn!(
                            poller = self.name,
                            error = %err,
                            "pass failed; retrying next interval"
                        );
                    }
                }
            }
        }

        info!(poller = self.name, "poller stopped");
    }
}
