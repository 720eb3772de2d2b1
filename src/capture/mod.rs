//! Camera capture boundary.
//!
//! A [`CameraDriver`] opens the physical device and hands out a
//! [`CameraHandle`], which is configured from a profile's device section and
//! then pulled for JPEG frames from a dedicated blocking thread.

pub mod frame;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{Frame, FrameMetadata};
pub use synthetic::{SyntheticCamera, SyntheticDriver};
#[cfg(feature = "v4l2")]
pub use v4l2::{V4l2Camera, V4l2Driver};

use crate::error::Result;
use crate::profile::DeviceSettings;

/// Opens the capture device.
pub trait CameraDriver: Send {
    type Handle: CameraHandle;

    /// Fails with `Error::DeviceUnavailable` when the device cannot be acquired.
    fn open(&mut self) -> Result<Self::Handle>;
}

/// An open capture device.
pub trait CameraHandle: Send + 'static {
    /// Apply hardware settings; fails with `Error::ConfigurationRejected`.
    fn configure(&mut self, settings: &DeviceSettings) -> Result<()>;

    /// Begin continuous capture. Frames are then read with [`CameraHandle::next_frame`].
    fn start_continuous_capture(&mut self) -> Result<()>;

    /// Block until the hardware has encoded the next frame.
    ///
    /// `Ok(None)` means the sequence has ended and will never produce again.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stop(&mut self) -> Result<()>;

    fn close(self) -> Result<()>;

    /// Iterate over the continuous frame sequence.
    fn frames(&mut self) -> Frames<'_, Self>
    where
        Self: Sized,
    {
        Frames { handle: self }
    }
}

/// Lazy, unbounded frame sequence borrowed from a started handle.
pub struct Frames<'a, H> {
    handle: &'a mut H,
}

impl<H: CameraHandle> Iterator for Frames<'_, H> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handle.next_frame().transpose()
    }
}
