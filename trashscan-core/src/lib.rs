//! # Trashscan Core
//!
//! Orchestration for an unattended multi-view 3D scanning pipeline: a capture
//! station photographs an object from a fixed set of viewpoints, the session
//! folder is moved between machines, a watcher dispatches each complete
//! view-set to an external rendering engine, and finished models are mirrored
//! to a stable location.
//!
//! ## Overview
//!
//! - **Capture**: latest-frame source, a tick-driven sequencer
//!   (`IDLE → MOVE → MOVE_WAIT → CAPTURE → SHOT_WAIT → DONE`), the auto-trigger
//!   and a storage gauge
//! - **Transfer**: completeness-gated, additive copying keyed on destination
//!   existence, over a local mount or SFTP
//! - **Dispatch**: folder watcher, view-set validation, job template filling
//!   and HTTP submission, serialized around the engine's single input slot
//! - **Mirror**: periodic additive mirror of engine output
//!
//! ## Feature Flags
//!
//! - `v4l`: V4L2 camera grabber (Linux)
//! - `sftp`: SFTP transfer source
//!
//! ## Examples
//!
//! ```no_run
//! use std::time::Instant;
//!
//! use trashscan_core::capture::{CaptureSequencer, LoggingMotor, start_camera};
//! use trashscan_core::config::CaptureConfig;
//! use trashscan_core::viewpoint::ViewpointSet;
//!
//! fn scan_once() -> trashscan_core::Result<()> {
//!     let config = CaptureConfig::default();
//!     let camera = start_camera(&config.camera, true)?;
//!     let mut sequencer =
//!         CaptureSequencer::new(&config, ViewpointSet::default(), camera.reader(), LoggingMotor);
//!
//!     sequencer.begin(Instant::now())?;
//!     while sequencer.tick(Instant::now()).is_none() {
//!         std::thread::sleep(config.tick_interval());
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Frame source, capture sequencer, trigger and station loop
pub mod capture;

/// Per-component configuration with deployment defaults
pub mod config;

/// Watch-and-dispatch to the rendering engine
pub mod dispatch;

/// Error types
pub mod error;

/// Output mirror loop
pub mod mirror;

/// Completeness-gated and mirror transfer
pub mod transfer;

/// Ordered viewpoint set
pub mod viewpoint;

pub use error::{PipelineError, Result};
pub use viewpoint::{Viewpoint, ViewpointSet};
