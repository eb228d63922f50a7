//! V4L2 (USB webcam) grabber requesting MJPG frames.

use image::{ImageFormat, RgbImage};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::frame::FrameGrabber;
use crate::config::CameraConfig;
use crate::error::{PipelineError, Result};

const BUFFER_COUNT: u32 = 4;

pub struct V4lGrabber {
    index: usize,
    width: u32,
    height: u32,
    stream: Stream<'static>,
}

impl V4lGrabber {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let device = Device::new(config.device_index).map_err(|err| {
            PipelineError::Acquisition(format!(
                "failed to open /dev/video{}: {err}",
                config.device_index
            ))
        })?;

        let mut format = device.format()?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = FourCC::new(b"MJPG");
        let format = device.set_format(&format)?;
        if format.fourcc != FourCC::new(b"MJPG") {
            return Err(PipelineError::Acquisition(format!(
                "device does not support MJPG (negotiated {})",
                format.fourcc
            )));
        }

        let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;

        Ok(Self {
            index: config.device_index,
            width: format.width,
            height: format.height,
            stream,
        })
    }
}

impl FrameGrabber for V4lGrabber {
    fn grab(&mut self) -> Result<RgbImage> {
        let (buffer, _meta) = self.stream.next()?;
        let decoded = image::load_from_memory_with_format(buffer, ImageFormat::Jpeg)?;
        Ok(decoded.into_rgb8())
    }

    fn describe(&self) -> String {
        format!("/dev/video{} {}x{} MJPG", self.index, self.width, self.height)
    }
}

impl std::fmt::Debug for V4lGrabber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4lGrabber")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
