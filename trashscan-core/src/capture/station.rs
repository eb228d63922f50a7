//! Single cooperative loop driving the trigger and the sequencer.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::frame::FrameSnapshot;
use super::sequencer::{CaptureSequencer, MotorDriver, SessionOutcome};
use super::trigger::AutoTrigger;
use crate::config::CaptureConfig;
use crate::viewpoint::ViewpointSet;

/// Width of the storage bar in the status summary.
const STORAGE_BAR_CELLS: usize = 30;

/// Counters reported when the station loop exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StationSummary {
    pub sessions_started: usize,
    pub sessions_completed: usize,
    /// Completed sessions with at least one missing viewpoint.
    pub sessions_incomplete: usize,
    /// Session that was in progress when the loop was cancelled.
    pub abandoned: Option<String>,
}

/// Requests a session outside the auto-trigger schedule.
#[derive(Clone, Debug)]
pub struct StationHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl StationHandle {
    /// Returns false once the station has shut down.
    pub fn trigger(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

pub struct CaptureStation<F: FrameSnapshot, M: MotorDriver> {
    sequencer: CaptureSequencer<F, M>,
    trigger: AutoTrigger,
    tick_interval: Duration,
    manual_tx: mpsc::UnboundedSender<()>,
    manual_rx: mpsc::UnboundedReceiver<()>,
    summary: StationSummary,
}

impl<F: FrameSnapshot, M: MotorDriver> CaptureStation<F, M> {
    pub fn new(config: &CaptureConfig, views: ViewpointSet, frames: F, motor: M) -> Self {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        Self {
            sequencer: CaptureSequencer::new(config, views, frames, motor),
            trigger: AutoTrigger::new(config.auto_trigger_interval()),
            tick_interval: config.tick_interval(),
            manual_tx,
            manual_rx,
            summary: StationSummary::default(),
        }
    }

    pub fn handle(&self) -> StationHandle {
        StationHandle {
            tx: self.manual_tx.clone(),
        }
    }

    pub fn sequencer(&self) -> &CaptureSequencer<F, M> {
        &self.sequencer
    }

    pub fn summary(&self) -> &StationSummary {
        &self.summary
    }

    /// One iteration of the cooperative loop. Never blocks on timing.
    pub fn step(&mut self, now: Instant) -> Option<SessionOutcome> {
        let mut manual = false;
        while self.manual_rx.try_recv().is_ok() {
            manual = true;
        }

        let active = self.sequencer.is_active();
        if manual {
            if active {
                info!("manual trigger ignored; a session is in progress");
            } else {
                self.sequencer.status_mut().push(">> MANUAL TRIGGER");
                self.trigger.note_manual_trigger(now);
                self.start_session(now);
            }
        } else if self.trigger.poll(now, active) {
            self.sequencer.status_mut().push(">> AUTO TRIGGER");
            self.start_session(now);
        }

        if !self.sequencer.is_active() {
            return None;
        }

        let outcome = self.sequencer.tick(now)?;
        self.summary.sessions_completed += 1;
        if !outcome.is_complete() {
            self.summary.sessions_incomplete += 1;
        }
        let [used, capacity, bar] = self.sequencer.storage().summary_lines(STORAGE_BAR_CELLS);
        info!(target: "capture::status", %used, %capacity, %bar, "storage");
        Some(outcome)
    }

    /// Run until `cancel` fires. A session in progress is abandoned as-is.
    pub async fn run(mut self, cancel: CancellationToken) -> StationSummary {
        {
            let interval_secs = self.trigger.interval().as_secs();
            let status = self.sequencer.status_mut();
            status.push("SYSTEM READY");
            status.push("AUTO MODE ENABLED");
            status.push(format!("INTERVAL: {interval_secs}s"));
        }

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let tick = tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticker.tick() => tick,
            };
            self.step(tick.into_std());
        }

        if let Some(session) = self.sequencer.session() {
            warn!(
                session = %session.id,
                captured = session.captured.len(),
                "capture loop stopped mid-session; partial folder left in place"
            );
            self.summary.abandoned = Some(session.id.clone());
        }

        info!(
            started = self.summary.sessions_started,
            completed = self.summary.sessions_completed,
            "capture station stopped"
        );
        self.summary
    }

    fn start_session(&mut self, now: Instant) {
        match self.sequencer.begin(now) {
            Ok(_) => self.summary.sessions_started += 1,
            Err(err) => {
                self.sequencer.status_mut().push("!! SESSION START FAILED");
                error!(error = %err, "failed to start capture session");
            }
        }
    }
}

impl<F: FrameSnapshot, M: MotorDriver> fmt::Debug for CaptureStation<F, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureStation")
            .field("sequencer", &self.sequencer)
            .field("trigger", &self.trigger)
            .field("tick_interval", &self.tick_interval)
            .field("summary", &self.summary)
            .finish()
    }
}
