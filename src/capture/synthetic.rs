//! Software camera rendering a moving test pattern, for running without hardware.

use std::time::{Duration, Instant};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tracing::{debug, info};

use super::{CameraDriver, CameraHandle, Frame, FrameMetadata};
use crate::error::{Error, Result};
use crate::profile::{DeviceSettings, Resolution};

/// Opens [`SyntheticCamera`]s.
#[derive(Debug, Clone)]
pub struct SyntheticDriver {
    quality: u8,
}

impl SyntheticDriver {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for SyntheticDriver {
    fn default() -> Self {
        Self::new(80)
    }
}

impl CameraDriver for SyntheticDriver {
    type Handle = SyntheticCamera;

    fn open(&mut self) -> Result<SyntheticCamera> {
        info!("Opening synthetic camera (JPEG quality {})", self.quality);
        Ok(SyntheticCamera {
            quality: self.quality,
            settings: None,
            running: false,
            sequence: 0,
            next_due: Instant::now(),
        })
    }
}

pub struct SyntheticCamera {
    quality: u8,
    settings: Option<DeviceSettings>,
    running: bool,
    sequence: u64,
    next_due: Instant,
}

impl SyntheticCamera {
    fn frame_interval(settings: &DeviceSettings) -> Duration {
        Duration::from_secs(1) / settings.framerate.max(1)
    }

    /// Diagonal gradient scrolling one step per frame, with a bar marking the sequence.
    fn render(&self, settings: &DeviceSettings) -> Result<Bytes> {
        let Resolution { width, height } = settings.resolution;
        let shift = (self.sequence * 4) as u32;
        let offset = settings.brightness.map(|b| b - 50).unwrap_or(0);
        let flip = settings.flip.unwrap_or(false);
        let bar = shift % width.max(1);

        let image = RgbImage::from_fn(width, height, |x, y| {
            let y = if flip { height - 1 - y } else { y };
            if x.abs_diff(bar) < 4 {
                return Rgb([255, 255, 255]);
            }
            let level = |v: u32| ((v.wrapping_add(shift) % 256) as i32 + offset).clamp(0, 255) as u8;
            Rgb([level(x), level(y), level(x + y)])
        });

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&image)
            .map_err(|e| Error::CaptureFailure(format!("JPEG encoding failed: {e}")))?;
        Ok(Bytes::from(jpeg))
    }
}

impl CameraHandle for SyntheticCamera {
    fn configure(&mut self, settings: &DeviceSettings) -> Result<()> {
        debug!(resolution = %settings.resolution, fps = settings.framerate, "Configuring synthetic camera");
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn start_continuous_capture(&mut self) -> Result<()> {
        if self.settings.is_none() {
            return Err(Error::ConfigurationRejected(
                "synthetic camera started before configure".into(),
            ));
        }
        self.running = true;
        self.next_due = Instant::now();
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.running {
            return Ok(None);
        }
        let Some(settings) = self.settings.clone() else {
            return Ok(None);
        };

        // Pace to the configured frame rate
        let now = Instant::now();
        if self.next_due > now {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due = self.next_due.max(now) + Self::frame_interval(&settings);

        self.sequence += 1;
        let data = self.render(&settings)?;
        Ok(Some(Frame::new(
            data,
            FrameMetadata {
                sequence: self.sequence,
                width: settings.resolution.width,
                height: settings.resolution.height,
                device_timestamp: None,
            },
        )))
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn close(self) -> Result<()> {
        info!("Synthetic camera closed after {} frames", self.sequence);
        Ok(())
    }
}
