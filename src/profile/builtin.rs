//! Profiles shipped with the binary.

use super::registry::{BaseProfile, ProfileOverlay, ProfileRegistry};
use super::settings::{
    AlgorithmOverlay, AlgorithmSettings, CameraIntrinsics, DeviceOverlay, DeviceSettings,
    ExposureMode, Resolution,
};

pub const TEST_CONFIG: &str = "testConfig";
pub const MODULE_DEBUGGING_CONFIG: &str = "moduleDebuggingConfig";
pub const CALIB_CONFIG: &str = "calibConfig";
pub const DEFAULT_PROFILE: &str = "default";

/// Retro-reflective tape defaults.
pub fn base_profile() -> BaseProfile {
    BaseProfile {
        device: DeviceSettings {
            resolution: Resolution::new(640, 480),
            framerate: 60,
            // Mode 7 pins the hidden auto white balance settings
            sensor_mode: 7,
            iso: None,
            brightness: None,
            contrast: None,
            flip: None,
            rotation: None,
            exposure_mode: None,
            exposure_compensation: None,
        },
        algorithm: AlgorithmSettings {
            algo: "empty".into(),
            display: false,
            hsv_range_low: [30, 150, 170],
            hsv_range_high: [90, 255, 255],
            pnp_cam: "pi".into(),
            intrinsics: None,
        },
    }
}

/// Exercises most of the available keys.
pub fn test_config() -> ProfileOverlay {
    ProfileOverlay {
        name: Some(TEST_CONFIG.into()),
        device: DeviceOverlay {
            resolution: Some(Resolution::new(640, 480)),
            iso: Some(400),
            brightness: Some(0),
            contrast: Some(100),
            flip: Some(false),
            rotation: Some(0),
            exposure_mode: Some(ExposureMode::Auto),
            exposure_compensation: Some(0),
            ..Default::default()
        },
        algorithm: AlgorithmOverlay {
            algo: Some("empty".into()),
            display: Some(false),
            hsv_range_low: Some([0, 0, 90]),
            hsv_range_high: Some([255, 255, 255]),
            pnp_cam: Some("dbcam8".into()),
            intrinsics: None,
        },
    }
}

/// Used with the 2019 module; carries calibrated intrinsics.
pub fn module_debugging_config() -> ProfileOverlay {
    ProfileOverlay {
        name: Some("Debugging Config used w/ a 2019 module".into()),
        device: DeviceOverlay {
            resolution: Some(Resolution::new(640, 480)),
            framerate: Some(90),
            iso: Some(400),
            brightness: Some(40),
            contrast: Some(100),
            flip: Some(false),
            rotation: Some(0),
            exposure_mode: Some(ExposureMode::Auto),
            exposure_compensation: Some(0),
            ..Default::default()
        },
        algorithm: AlgorithmOverlay {
            algo: Some("verticies".into()),
            display: Some(false),
            hsv_range_low: Some([40, 50, 90]),
            hsv_range_high: Some([255, 255, 255]),
            pnp_cam: None,
            intrinsics: Some(CameraIntrinsics {
                focal_length: (639.83052859, 639.70771165),
                principal_point: (322.56252014, 250.77160068),
                distortion_coeffs: vec![
                    1.11238973e-01,
                    -1.04070952e+00,
                    2.61772165e-03,
                    6.55387532e-04,
                    2.07132619e+00,
                ],
            }),
        },
    }
}

pub fn calib_config() -> ProfileOverlay {
    ProfileOverlay {
        name: Some("Config to use when calibrating the camera".into()),
        device: DeviceOverlay {
            resolution: Some(Resolution::new(640, 480)),
            framerate: Some(90),
            iso: Some(0),
            flip: Some(false),
            rotation: Some(0),
            exposure_mode: Some(ExposureMode::Auto),
            exposure_compensation: Some(0),
            ..Default::default()
        },
        algorithm: AlgorithmOverlay {
            algo: Some("calibCap".into()),
            display: Some(false),
            ..Default::default()
        },
    }
}

impl ProfileRegistry {
    /// Registry holding every built-in profile; `default` points at the debugging profile.
    pub fn builtin() -> Self {
        ProfileRegistry::new(base_profile())
            .define(TEST_CONFIG, test_config())
            .define(MODULE_DEBUGGING_CONFIG, module_debugging_config())
            .define(CALIB_CONFIG, calib_config())
            .alias(DEFAULT_PROFILE, MODULE_DEBUGGING_CONFIG)
    }
}
