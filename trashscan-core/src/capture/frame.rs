//! Continuous frame acquisition into a single shared slot.
//!
//! The grabber runs on a dedicated OS thread at whatever rate the device
//! delivers frames. Consumers never wait on it: [`FrameReader::read`] returns
//! a snapshot of the latest frame, or `None` if nothing was acquired yet.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// The most recently acquired camera image.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
    /// Monotonic acquisition counter, starting at 1.
    pub sequence: u64,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("captured_at", &self.captured_at)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// A camera backend. `grab` may block until the device delivers a frame.
pub trait FrameGrabber: Send + 'static {
    fn grab(&mut self) -> Result<RgbImage>;

    fn describe(&self) -> String;
}

/// Read access to the latest frame.
pub trait FrameSnapshot {
    fn snapshot(&self) -> Option<Arc<Frame>>;
}

/// Cheap, cloneable read handle onto the frame slot.
#[derive(Clone, Default)]
pub struct FrameReader {
    slot: Arc<RwLock<Option<Arc<Frame>>>>,
}

impl FrameReader {
    pub fn read(&self) -> Option<Arc<Frame>> {
        self.slot.read().clone()
    }
}

impl FrameSnapshot for FrameReader {
    fn snapshot(&self) -> Option<Arc<Frame>> {
        self.read()
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latest = self.slot.read().as_ref().map(|frame| frame.sequence);
        f.debug_struct("FrameReader")
            .field("latest_sequence", &latest)
            .finish()
    }
}

/// Owns the acquisition thread. Dropping or calling [`FrameSource::stop`]
/// halts acquisition and releases the device.
pub struct FrameSource {
    reader: FrameReader,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Spawn the acquisition thread for `grabber`.
    pub fn start<G: FrameGrabber>(grabber: G) -> Result<Self> {
        let reader = FrameReader::default();
        let stop = Arc::new(AtomicBool::new(false));

        info!(device = %grabber.describe(), "starting frame source");

        let slot = Arc::clone(&reader.slot);
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("frame-source".into())
            .spawn(move || acquisition_loop(grabber, slot, stop_flag))
            .map_err(|err| {
                PipelineError::Acquisition(format!("failed to spawn frame source thread: {err}"))
            })?;

        Ok(Self {
            reader,
            stop,
            handle: Some(handle),
        })
    }

    pub fn read(&self) -> Option<Arc<Frame>> {
        self.reader.read()
    }

    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("frame source thread panicked");
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSource")
            .field("reader", &self.reader)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn acquisition_loop<G: FrameGrabber>(
    mut grabber: G,
    slot: Arc<RwLock<Option<Arc<Frame>>>>,
    stop: Arc<AtomicBool>,
) {
    let mut sequence = 0u64;
    let mut failures = 0u32;

    while !stop.load(Ordering::Acquire) {
        match grabber.grab() {
            Ok(image) => {
                sequence += 1;
                let frame = Frame {
                    image,
                    captured_at: Utc::now(),
                    sequence,
                };
                *slot.write() = Some(Arc::new(frame));

                if failures > 0 {
                    info!(failures, "frame acquisition recovered");
                    failures = 0;
                }
            }
            Err(err) => {
                failures += 1;
                if failures == 1 {
                    warn!(error = %err, "frame acquisition failed; keeping previous frame");
                } else {
                    debug!(error = %err, failures, "frame acquisition still failing");
                }
                thread::sleep(RETRY_BACKOFF);
            }
        }
    }

    debug!(frames = sequence, "frame source stopped");
    // `grabber` drops here, releasing the device.
}

/// Generated test pattern for hosts without a camera.
#[derive(Debug)]
pub struct TestPatternGrabber {
    width: u32,
    height: u32,
    frame_interval: Duration,
    counter: u32,
}

impl TestPatternGrabber {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_interval: Duration::from_secs(1) / fps.max(1),
            counter: 0,
        }
    }
}

impl FrameGrabber for TestPatternGrabber {
    fn grab(&mut self) -> Result<RgbImage> {
        thread::sleep(self.frame_interval);
        self.counter = self.counter.wrapping_add(1);
        let shift = (self.counter % 256) as u8;
        let (w, h) = (self.width, self.height);
        Ok(RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                ((x * 255) / w) as u8,
                ((y * 255) / h) as u8,
                shift,
            ])
        }))
    }

    fn describe(&self) -> String {
        format!("test-pattern {}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    use super::*;

    struct FlakyGrabber {
        calls: Arc<AtomicU32>,
    }

    impl FrameGrabber for FlakyGrabber {
        fn grab(&mut self) -> Result<RgbImage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            // First frame succeeds, everything after fails.
            if call == 0 {
                Ok(RgbImage::new(2, 2))
            } else {
                Err(PipelineError::Acquisition("device unplugged".into()))
            }
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn empty_reader_returns_none() {
        assert!(FrameReader::default().read().is_none());
    }

    #[test]
    fn latest_frame_is_retained_across_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = FrameSource::start(FlakyGrabber {
            calls: Arc::clone(&calls),
        })
        .unwrap();

        wait_for(|| calls.load(Ordering::SeqCst) > 5);
        let frame = source.read().expect("first frame retained");
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.image.dimensions(), (2, 2));
        source.stop();
    }

    #[test]
    fn test_pattern_refreshes_slot() {
        let source = FrameSource::start(TestPatternGrabber::new(8, 4, 500)).unwrap();
        let reader = source.reader();
        wait_for(|| reader.read().is_some_and(|f| f.sequence >= 3));
        let frame = reader.read().unwrap();
        assert_eq!(frame.image.dimensions(), (8, 4));
        drop(source);
    }
}
