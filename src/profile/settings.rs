//! Typed device and algorithm sections of a profile, their partial overlays,
//! and range validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const BRIGHTNESS_RANGE: (i32, i32) = (0, 100);
pub const CONTRAST_RANGE: (i32, i32) = (-100, 100);
pub const EXPOSURE_COMPENSATION_RANGE: (i32, i32) = (-25, 25);
pub const SENSOR_MODE_RANGE: (i32, i32) = (0, 7);
pub const FRAMERATE_RANGE: (u32, u32) = (1, 120);
pub const DIMENSION_RANGE: (u32, u32) = (1, 4096);
pub const ISO_VALUES: [u32; 8] = [0, 100, 200, 320, 400, 500, 640, 800];
pub const ROTATION_VALUES: [u32; 4] = [0, 90, 180, 270];
/// Lengths OpenCV accepts for a distortion coefficient vector.
pub const DISTORTION_LENGTHS: [usize; 5] = [4, 5, 8, 12, 14];

/// Capture resolution, written as `[width, height]` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(res: Resolution) -> Self {
        (res.width, res.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sensor exposure modes understood by the Pi camera firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureMode {
    Off,
    Auto,
    Night,
    NightPreview,
    Backlight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    VeryLong,
    FixedFps,
    AntiShake,
    Fireworks,
}

impl fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExposureMode::Off => "off",
            ExposureMode::Auto => "auto",
            ExposureMode::Night => "night",
            ExposureMode::NightPreview => "nightpreview",
            ExposureMode::Backlight => "backlight",
            ExposureMode::Spotlight => "spotlight",
            ExposureMode::Sports => "sports",
            ExposureMode::Snow => "snow",
            ExposureMode::Beach => "beach",
            ExposureMode::VeryLong => "verylong",
            ExposureMode::FixedFps => "fixedfps",
            ExposureMode::AntiShake => "antishake",
            ExposureMode::Fireworks => "fireworks",
        };
        f.write_str(name)
    }
}

/// Capture hardware settings.
///
/// `None` on an optional field leaves the driver default in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub resolution: Resolution,
    pub framerate: u32,
    /// 0 lets the firmware pick from framerate and resolution, 7 is the fastest mode.
    #[serde(rename = "sensormode")]
    pub sensor_mode: i32,
    pub iso: Option<u32>,
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub flip: Option<bool>,
    pub rotation: Option<u32>,
    pub exposure_mode: Option<ExposureMode>,
    pub exposure_compensation: Option<i32>,
}

/// Partial device section; every present key replaces the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceOverlay {
    pub resolution: Option<Resolution>,
    pub framerate: Option<u32>,
    #[serde(rename = "sensormode")]
    pub sensor_mode: Option<i32>,
    pub iso: Option<u32>,
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub flip: Option<bool>,
    pub rotation: Option<u32>,
    pub exposure_mode: Option<ExposureMode>,
    pub exposure_compensation: Option<i32>,
}

impl DeviceSettings {
    /// Copy of `self` with every key present in `overlay` replaced.
    pub fn overlay(&self, overlay: &DeviceOverlay) -> Self {
        Self {
            resolution: overlay.resolution.unwrap_or(self.resolution),
            framerate: overlay.framerate.unwrap_or(self.framerate),
            sensor_mode: overlay.sensor_mode.unwrap_or(self.sensor_mode),
            iso: overlay.iso.or(self.iso),
            brightness: overlay.brightness.or(self.brightness),
            contrast: overlay.contrast.or(self.contrast),
            flip: overlay.flip.or(self.flip),
            rotation: overlay.rotation.or(self.rotation),
            exposure_mode: overlay.exposure_mode.or(self.exposure_mode),
            exposure_compensation: overlay.exposure_compensation.or(self.exposure_compensation),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_range("device.resolution.width", self.resolution.width, DIMENSION_RANGE)?;
        check_range("device.resolution.height", self.resolution.height, DIMENSION_RANGE)?;
        check_range("device.framerate", self.framerate, FRAMERATE_RANGE)?;
        check_range("device.sensormode", self.sensor_mode, SENSOR_MODE_RANGE)?;
        if let Some(iso) = self.iso {
            check_one_of("device.iso", iso, &ISO_VALUES)?;
        }
        if let Some(brightness) = self.brightness {
            check_range("device.brightness", brightness, BRIGHTNESS_RANGE)?;
        }
        if let Some(contrast) = self.contrast {
            check_range("device.contrast", contrast, CONTRAST_RANGE)?;
        }
        if let Some(rotation) = self.rotation {
            check_one_of("device.rotation", rotation, &ROTATION_VALUES)?;
        }
        if let Some(comp) = self.exposure_compensation {
            check_range("device.exposure_compensation", comp, EXPOSURE_COMPENSATION_RANGE)?;
        }
        Ok(())
    }
}

/// Pinhole camera intrinsics used for pose estimation.
///
/// Replaced as a whole by an overlay, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub focal_length: (f64, f64),
    pub principal_point: (f64, f64),
    pub distortion_coeffs: Vec<f64>,
}

impl CameraIntrinsics {
    pub fn validate(&self) -> Result<()> {
        let (fx, fy) = self.focal_length;
        if !(fx > 0.0 && fy > 0.0) {
            return Err(Error::invalid(
                "algorithm.intrinsics.focal_length",
                format!("({fx}, {fy})"),
                "(0, inf)",
            ));
        }
        if !DISTORTION_LENGTHS.contains(&self.distortion_coeffs.len()) {
            return Err(Error::invalid(
                "algorithm.intrinsics.distortion_coeffs.len",
                self.distortion_coeffs.len(),
                format!("{DISTORTION_LENGTHS:?}"),
            ));
        }
        Ok(())
    }
}

/// Vision-processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSettings {
    /// Name of the algorithm consuming the frames.
    pub algo: String,
    pub display: bool,
    /// Lower HSV threshold bound.
    #[serde(alias = "hsvRangeLow")]
    pub hsv_range_low: [u8; 3],
    /// Upper HSV threshold bound.
    #[serde(alias = "hsvRangeHigh")]
    pub hsv_range_high: [u8; 3],
    /// Camera model used when solving PnP.
    #[serde(alias = "pnpCam")]
    pub pnp_cam: String,
    pub intrinsics: Option<CameraIntrinsics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlgorithmOverlay {
    pub algo: Option<String>,
    pub display: Option<bool>,
    #[serde(alias = "hsvRangeLow")]
    pub hsv_range_low: Option<[u8; 3]>,
    #[serde(alias = "hsvRangeHigh")]
    pub hsv_range_high: Option<[u8; 3]>,
    #[serde(alias = "pnpCam")]
    pub pnp_cam: Option<String>,
    pub intrinsics: Option<CameraIntrinsics>,
}

impl AlgorithmSettings {
    pub fn overlay(&self, overlay: &AlgorithmOverlay) -> Self {
        Self {
            algo: overlay.algo.clone().unwrap_or_else(|| self.algo.clone()),
            display: overlay.display.unwrap_or(self.display),
            hsv_range_low: overlay.hsv_range_low.unwrap_or(self.hsv_range_low),
            hsv_range_high: overlay.hsv_range_high.unwrap_or(self.hsv_range_high),
            pnp_cam: overlay.pnp_cam.clone().unwrap_or_else(|| self.pnp_cam.clone()),
            intrinsics: overlay
                .intrinsics
                .clone()
                .or_else(|| self.intrinsics.clone()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.algo.trim().is_empty() {
            return Err(Error::invalid("algorithm.algo", "\"\"", "non-empty name"));
        }
        match &self.intrinsics {
            Some(intrinsics) => intrinsics.validate(),
            None => Ok(()),
        }
    }
}

fn check_range<T>(field: &str, value: T, (low, high): (T, T)) -> Result<()>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if value < low || value > high {
        return Err(Error::invalid(field, value, format!("[{low}, {high}]")));
    }
    Ok(())
}

fn check_one_of<T>(field: &str, value: T, allowed: &[T]) -> Result<()>
where
    T: PartialEq + fmt::Debug + fmt::Display + Copy,
{
    if !allowed.contains(&value) {
        return Err(Error::invalid(field, value, format!("{allowed:?}")));
    }
    Ok(())
}
