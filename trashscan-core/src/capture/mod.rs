//! Capture station: frame acquisition, the timed multi-view sequencer, and the
//! auto-trigger loop that starts a session whenever the rig is idle.

pub mod frame;
pub mod sequencer;
pub mod station;
pub mod status;
pub mod storage;
pub mod trigger;
#[cfg(feature = "v4l")]
pub mod v4l;

pub use frame::{Frame, FrameGrabber, FrameReader, FrameSnapshot, FrameSource, TestPatternGrabber};
pub use sequencer::{
    CaptureSequencer, CaptureSession, CaptureState, LoggingMotor, MotorDriver, SessionOutcome,
};
pub use station::{CaptureStation, StationHandle, StationSummary};
pub use status::StatusLog;
pub use storage::StorageGauge;
pub use trigger::AutoTrigger;

use crate::config::CameraConfig;
use crate::error::Result;

/// Start the frame source for the configured camera.
///
/// With the `v4l` feature this opens `/dev/video<N>`; otherwise (or when
/// `synthetic` is set) a generated test pattern is used.
pub fn start_camera(config: &CameraConfig, synthetic: bool) -> Result<FrameSource> {
    #[cfg(feature = "v4l")]
    if !synthetic {
        return FrameSource::start(v4l::V4lGrabber::open(config)?);
    }

    if !synthetic {
        tracing::warn!("built without the `v4l` feature; using the synthetic test pattern");
    }
    FrameSource::start(TestPatternGrabber::new(
        config.width,
        config.height,
        config.fps,
    ))
}
