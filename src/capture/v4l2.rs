//! V4L2 MJPEG capture with memory-mapped buffers

use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::{CameraDriver, CameraHandle, Frame, FrameMetadata};
use crate::error::{Error, Result};
use crate::profile::{DeviceSettings, ExposureMode};

// V4L2 control ids (linux/v4l2-controls.h)
const CID_BRIGHTNESS: u32 = 0x0098_0900;
const CID_CONTRAST: u32 = 0x0098_0901;
const CID_HFLIP: u32 = 0x0098_0914;
const CID_VFLIP: u32 = 0x0098_0915;
const CID_ROTATE: u32 = 0x0098_0922;
const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_AUTO_EXPOSURE_BIAS: u32 = 0x009a_0913;
const CID_ISO_SENSITIVITY: u32 = 0x009a_0917;
const CID_ISO_SENSITIVITY_AUTO: u32 = 0x009a_0918;

const EXPOSURE_AUTO: i64 = 0;
const EXPOSURE_MANUAL: i64 = 1;

/// Opens a V4L2 device node.
#[derive(Debug, Clone)]
pub struct V4l2Driver {
    path: String,
    buffer_count: u32,
}

impl V4l2Driver {
    pub fn new(path: impl Into<String>, buffer_count: u32) -> Self {
        Self {
            path: path.into(),
            buffer_count: buffer_count.max(1),
        }
    }

    /// Driver for the first capture device offering MJPEG.
    pub fn auto_detect(buffer_count: u32) -> Result<Self> {
        info!("Auto-detecting capture devices...");

        for i in 0..10 {
            let path = format!("/dev/video{}", i);
            if !Path::new(&path).exists() {
                continue;
            }

            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
                continue;
            }
            if let Ok(formats) = dev.enum_formats() {
                if formats.iter().any(|fmt| fmt.fourcc == FourCC::new(b"MJPG")) {
                    info!("Found MJPEG device: {} - {}", path, caps.card);
                    return Ok(Self::new(path, buffer_count));
                }
            }
        }

        Err(Error::DeviceUnavailable("no MJPEG capture device found".into()))
    }
}

impl CameraDriver for V4l2Driver {
    type Handle = V4l2Camera;

    fn open(&mut self) -> Result<V4l2Camera> {
        info!("Opening V4L2 device {}", self.path);

        let device = Device::with_path(&self.path)
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {e}", self.path)))?;

        let caps = device
            .query_caps()
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {e}", self.path)))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::DeviceUnavailable(format!(
                "{} doesn't support video capture",
                self.path
            )));
        }

        Ok(V4l2Camera {
            device,
            stream: None,
            buffer_count: self.buffer_count,
            settings: None,
            sequence: 0,
        })
    }
}

/// Open V4L2 device producing MJPEG frames
pub struct V4l2Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
    buffer_count: u32,
    settings: Option<DeviceSettings>,
    sequence: u64,
}

impl V4l2Camera {
    fn set_control(&self, name: &str, id: u32, value: Value) -> Result<()> {
        debug!("Setting control {name} = {value:?}");
        self.device
            .set_control(Control { id, value })
            .map_err(|e| Error::ConfigurationRejected(format!("{name}: {e}")))
    }

    fn apply_controls(&self, settings: &DeviceSettings) -> Result<()> {
        if let Some(brightness) = settings.brightness {
            self.set_control("brightness", CID_BRIGHTNESS, Value::Integer(brightness.into()))?;
        }
        if let Some(contrast) = settings.contrast {
            self.set_control("contrast", CID_CONTRAST, Value::Integer(contrast.into()))?;
        }
        if let Some(flip) = settings.flip {
            self.set_control("hflip", CID_HFLIP, Value::Boolean(flip))?;
            self.set_control("vflip", CID_VFLIP, Value::Boolean(flip))?;
        }
        if let Some(rotation) = settings.rotation {
            self.set_control("rotation", CID_ROTATE, Value::Integer(rotation.into()))?;
        }
        if let Some(iso) = settings.iso {
            // 0 selects automatic gain
            let auto = iso == 0;
            self.set_control("iso_auto", CID_ISO_SENSITIVITY_AUTO, Value::Integer(auto.into()))?;
            if !auto {
                self.set_control("iso", CID_ISO_SENSITIVITY, Value::Integer(iso.into()))?;
            }
        }
        if let Some(mode) = settings.exposure_mode {
            let value = match mode {
                ExposureMode::Off => EXPOSURE_MANUAL,
                _ => EXPOSURE_AUTO,
            };
            self.set_control("exposure_mode", CID_EXPOSURE_AUTO, Value::Integer(value))?;
        }
        if let Some(comp) = settings.exposure_compensation {
            self.set_control(
                "exposure_compensation",
                CID_AUTO_EXPOSURE_BIAS,
                Value::Integer(comp.into()),
            )?;
        }
        Ok(())
    }
}

impl CameraHandle for V4l2Camera {
    fn configure(&mut self, settings: &DeviceSettings) -> Result<()> {
        let rejected = |e: std::io::Error| Error::ConfigurationRejected(e.to_string());

        let mut fmt = self.device.format().map_err(rejected)?;
        fmt.width = settings.resolution.width;
        fmt.height = settings.resolution.height;
        fmt.fourcc = FourCC::new(b"MJPG");
        let fmt = self.device.set_format(&fmt).map_err(rejected)?;

        // The driver silently substitutes formats it can't produce
        if fmt.fourcc != FourCC::new(b"MJPG") {
            return Err(Error::ConfigurationRejected(
                "MJPEG format not supported by device".into(),
            ));
        }
        if (fmt.width, fmt.height) != settings.resolution.as_tuple() {
            warn!(
                "Requested {} but device chose {}x{}",
                settings.resolution, fmt.width, fmt.height
            );
        }

        let params = Parameters::with_fps(settings.framerate);
        self.device.set_params(&params).map_err(rejected)?;

        self.apply_controls(settings)?;
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn start_continuous_capture(&mut self) -> Result<()> {
        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)
            .map_err(|e| Error::CaptureFailure(format!("failed to map buffers: {e}")))?;

        self.stream = Some(stream);
        info!("Capture stream started with {} buffers", self.buffer_count);
        Ok(())
    }

    #[instrument(skip(self))]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| Error::CaptureFailure(e.to_string()))?;

        // Buffer is only valid until the next dequeue
        let data = Bytes::copy_from_slice(&buf[..meta.bytesused as usize]);
        let captured_at = Instant::now();

        self.sequence += 1;
        let (width, height) = self
            .settings
            .as_ref()
            .map(|s| s.resolution.as_tuple())
            .unwrap_or_default();

        let mut frame = Frame::new(
            data,
            FrameMetadata {
                sequence: self.sequence,
                width,
                height,
                device_timestamp: Some(
                    Duration::from_secs(meta.timestamp.sec as u64)
                        + Duration::from_micros(meta.timestamp.usec as u64),
                ),
            },
        );
        frame.timestamp = captured_at;
        Ok(Some(frame))
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the stream turns streaming off and unmaps the buffers
        if self.stream.take().is_some() {
            info!("Capture stream stopped after {} frames", self.sequence);
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        self.stop()?;
        drop(self.device);
        Ok(())
    }
}
