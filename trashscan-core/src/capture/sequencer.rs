//! Timed multi-view capture state machine.
//!
//! ```text
//! IDLE -> MOVE -> MOVE_WAIT -> CAPTURE -> SHOT_WAIT -> MOVE ... -> CAPTURE -> DONE
//! ```
//!
//! The sequencer never sleeps. Callers drive it with [`CaptureSequencer::tick`]
//! and an explicit `now`; waiting states compare elapsed time against their
//! configured delay and return immediately when it has not passed yet. States
//! that do not wait fall through within the same tick, so transition times are
//! exact multiples of the configured delays.

use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use image::ImageFormat;
use tracing::{debug, info, warn};

use super::frame::{Frame, FrameSnapshot};
use super::status::StatusLog;
use super::storage::StorageGauge;
use crate::config::CaptureConfig;
use crate::error::{PipelineError, Result};
use crate::transfer::partial_file_in;
use crate::viewpoint::{Viewpoint, ViewpointSet};

/// Extension of captured images.
pub const CAPTURE_EXTENSION: &str = "png";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureState {
    Idle,
    Move,
    MoveWait,
    Capture,
    ShotWait,
    Done,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "IDLE",
            CaptureState::Move => "MOVE",
            CaptureState::MoveWait => "MOVE_WAIT",
            CaptureState::Capture => "CAPTURE",
            CaptureState::ShotWait => "SHOT_WAIT",
            CaptureState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Positioning collaborator. Instructions are fire-and-forget; the sequencer
/// only relies on the positioning delay.
pub trait MotorDriver: Send {
    fn position(&mut self, viewpoint: &Viewpoint, index: usize);
}

/// Motor driver that only records the instruction in the log.
#[derive(Debug, Default)]
pub struct LoggingMotor;

impl MotorDriver for LoggingMotor {
    fn position(&mut self, viewpoint: &Viewpoint, index: usize) {
        debug!(viewpoint = %viewpoint, index, "motor positioning instruction");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequencerTiming {
    pub positioning_delay: Duration,
    pub inter_shot_delay: Duration,
}

impl From<&CaptureConfig> for SequencerTiming {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            positioning_delay: config.positioning_delay(),
            inter_shot_delay: config.inter_shot_delay(),
        }
    }
}

/// One object scan in progress.
#[derive(Clone, Debug)]
pub struct CaptureSession {
    pub id: String,
    pub dir: PathBuf,
    pub started_at: Instant,
    /// Viewpoints whose image was written.
    pub captured: Vec<String>,
    /// Viewpoints whose image could not be produced.
    pub missing: Vec<String>,
    /// Number of CAPTURE steps executed.
    pub capture_steps: usize,
}

/// Summary returned when a session reaches DONE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    pub id: String,
    pub dir: PathBuf,
    pub captured: Vec<String>,
    pub missing: Vec<String>,
    pub capture_steps: usize,
    pub elapsed: Duration,
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct CaptureSequencer<F: FrameSnapshot, M: MotorDriver = LoggingMotor> {
    views: ViewpointSet,
    timing: SequencerTiming,
    capture_root: PathBuf,
    frames: F,
    motor: M,
    storage: StorageGauge,
    status: StatusLog,
    state: CaptureState,
    state_entered: Instant,
    view_index: usize,
    session: Option<CaptureSession>,
}

impl<F: FrameSnapshot, M: MotorDriver> CaptureSequencer<F, M> {
    pub fn new(
        config: &CaptureConfig,
        views: ViewpointSet,
        frames: F,
        motor: M,
    ) -> Self {
        Self {
            views,
            timing: SequencerTiming::from(config),
            capture_root: config.capture_root.clone(),
            frames,
            motor,
            storage: StorageGauge::new(config.max_capacity_mb),
            status: StatusLog::new(config.status_lines),
            state: CaptureState::Idle,
            state_entered: Instant::now(),
            view_index: 0,
            session: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn storage(&self) -> &StorageGauge {
        &self.storage
    }

    pub fn status(&self) -> &StatusLog {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusLog {
        &mut self.status
    }

    /// Start a session named after the current local time. A numeric suffix
    /// keeps the folder unique when two sessions start within one second.
    pub fn begin(&mut self, now: Instant) -> Result<&CaptureSession> {
        let base = Local::now().format("object_%Y%m%d_%H%M%S").to_string();
        let mut id = base.clone();
        let mut attempt = 1;
        while self.capture_root.join(&id).exists() {
            attempt += 1;
            id = format!("{base}_{attempt}");
        }
        self.begin_named(id, now)
    }

    /// Start a session with an explicit folder name. Fails if a session is
    /// already active.
    pub fn begin_named(&mut self, id: impl Into<String>, now: Instant) -> Result<&CaptureSession> {
        if let Some(active) = &self.session {
            return Err(PipelineError::Internal(format!(
                "capture session {} is still active",
                active.id
            )));
        }

        let id = id.into();
        let dir = self.capture_root.join(&id);
        std::fs::create_dir_all(&dir).map_err(|err| PipelineError::io_at(&dir, err))?;

        self.status.push(format!("CAPTURE START: {id}"));
        info!(session = %id, dir = %dir.display(), "capture session started");

        self.view_index = 0;
        self.enter(CaptureState::Move, now);
        Ok(&*self.session.insert(CaptureSession {
            id,
            dir,
            started_at: now,
            captured: Vec::new(),
            missing: Vec::new(),
            capture_steps: 0,
        }))
    }

    /// Advance the state machine as far as `now` allows. Returns the session
    /// summary on the tick that completes it.
    pub fn tick(&mut self, now: Instant) -> Option<SessionOutcome> {
        loop {
            let before = self.state;
            if let Some(outcome) = self.step(now) {
                return Some(outcome);
            }
            if self.state == before {
                return None;
            }
        }
    }

    fn step(&mut self, now: Instant) -> Option<SessionOutcome> {
        match self.state {
            CaptureState::Idle => None,
            CaptureState::Move => {
                let view = self.current_view()?;
                self.status.push(format!(">> positioning for {}", view.name));
                self.motor.position(&view, self.view_index);
                self.enter(CaptureState::MoveWait, now);
                None
            }
            CaptureState::MoveWait => {
                if self.elapsed(now) >= self.timing.positioning_delay {
                    self.enter(CaptureState::Capture, now);
                }
                None
            }
            CaptureState::Capture => {
                let view = self.current_view()?;
                self.capture_view(&view);
                if self.view_index + 1 < self.views.len() {
                    self.enter(CaptureState::ShotWait, now);
                } else {
                    self.enter(CaptureState::Done, now);
                }
                None
            }
            CaptureState::ShotWait => {
                if self.elapsed(now) >= self.timing.inter_shot_delay {
                    self.view_index += 1;
                    self.enter(CaptureState::Move, now);
                }
                None
            }
            CaptureState::Done => {
                let session = self.session.take()?;
                self.status.push("CAPTURE COMPLETE");
                let outcome = SessionOutcome {
                    elapsed: now.saturating_duration_since(session.started_at),
                    id: session.id,
                    dir: session.dir,
                    captured: session.captured,
                    missing: session.missing,
                    capture_steps: session.capture_steps,
                };
                if outcome.is_complete() {
                    info!(
                        session = %outcome.id,
                        elapsed = ?outcome.elapsed,
                        "capture session complete"
                    );
                } else {
                    warn!(
                        session = %outcome.id,
                        missing = ?outcome.missing,
                        "capture session finished with missing viewpoints"
                    );
                }
                Some(outcome)
            }
        }
    }

    fn capture_view(&mut self, view: &Viewpoint) {
        let file_name = format!("{}.{CAPTURE_EXTENSION}", view.name);
        self.status.push(format!(">> capturing {file_name}"));

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.capture_steps += 1;
        let path = session.dir.join(&file_name);

        let Some(frame) = self.frames.snapshot() else {
            self.status.push("!! CAMERA FRAME MISSING");
            warn!(
                session = %session.id,
                viewpoint = %view,
                "no frame available; viewpoint skipped"
            );
            session.missing.push(view.name.clone());
            return;
        };

        match write_frame(&frame, &path) {
            Ok(bytes) => {
                self.storage.record_bytes(bytes);
                session.captured.push(view.name.clone());
                debug!(
                    session = %session.id,
                    viewpoint = %view,
                    path = %path.display(),
                    bytes,
                    "viewpoint captured"
                );
            }
            Err(err) => {
                self.status.push(format!("!! WRITE FAILED: {file_name}"));
                warn!(
                    session = %session.id,
                    viewpoint = %view,
                    error = %err,
                    "failed to persist frame; viewpoint skipped"
                );
                session.missing.push(view.name.clone());
            }
        }
    }

    fn current_view(&self) -> Option<Viewpoint> {
        self.views.get(self.view_index).cloned()
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state_entered)
    }

    fn enter(&mut self, state: CaptureState, now: Instant) {
        debug!(from = %self.state, to = %state, "capture state transition");
        self.state = state;
        self.state_entered = now;
    }
}

impl<F: FrameSnapshot, M: MotorDriver> fmt::Debug for CaptureSequencer<F, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSequencer")
            .field("state", &self.state)
            .field("view_index", &self.view_index)
            .field("session", &self.session.as_ref().map(|s| s.id.as_str()))
            .field("storage", &self.storage)
            .finish()
    }
}

/// Encode `frame` as PNG at `path`, returning the written size in bytes.
///
/// The image only appears under its final name once fully written, so a
/// transfer pass never counts a half-written view.
fn write_frame(frame: &Arc<Frame>, path: &Path) -> Result<u64> {
    let dir = path
        .parent()
        .ok_or_else(|| PipelineError::Internal(format!("{} has no parent", path.display())))?;
    let mut partial = partial_file_in(dir)?;
    {
        let mut writer = BufWriter::new(partial.as_file_mut());
        frame.image.write_to(&mut writer, ImageFormat::Png)?;
        writer.flush()?;
    }
    let written = partial
        .as_file()
        .metadata()
        .map_err(|err| PipelineError::io_at(partial.path(), err))?;
    partial
        .persist(path)
        .map_err(|err| PipelineError::io_at(path, err.error))?;
    Ok(written.len())
}
