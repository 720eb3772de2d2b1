use camstream::profile::builtin::{self, base_profile};
use camstream::profile::{
    AlgorithmOverlay, CameraIntrinsics, DeviceOverlay, ExposureMode, ProfileOverlay,
    ProfileRegistry, Resolution,
};
use camstream::Error;

#[test]
fn test_test_config_resolves() {
    let registry = ProfileRegistry::builtin();
    let profile = registry.resolve("testConfig").unwrap();

    assert_eq!(profile.name, "testConfig");
    assert_eq!(profile.algorithm.algo, "empty");
    assert_eq!(profile.device.resolution.as_tuple(), (640, 480));
    assert_eq!(profile.device.iso, Some(400));
    assert_eq!(profile.device.exposure_mode, Some(ExposureMode::Auto));
    assert_eq!(profile.algorithm.pnp_cam, "dbcam8");
}

#[test]
fn test_overlay_keys_win_and_missing_keys_inherit() {
    let registry = ProfileRegistry::builtin();
    let base = registry.base().clone();

    let cases = [
        (builtin::TEST_CONFIG, builtin::test_config()),
        (builtin::MODULE_DEBUGGING_CONFIG, builtin::module_debugging_config()),
        (builtin::CALIB_CONFIG, builtin::calib_config()),
    ];

    for (name, overlay) in cases {
        let profile = registry.resolve(name).unwrap();
        let (d, b) = (&overlay.device, &base.device);

        assert_eq!(profile.device.resolution, d.resolution.unwrap_or(b.resolution), "{name}");
        assert_eq!(profile.device.framerate, d.framerate.unwrap_or(b.framerate), "{name}");
        assert_eq!(profile.device.sensor_mode, d.sensor_mode.unwrap_or(b.sensor_mode), "{name}");
        assert_eq!(profile.device.iso, d.iso.or(b.iso), "{name}");
        assert_eq!(profile.device.brightness, d.brightness.or(b.brightness), "{name}");
        assert_eq!(profile.device.contrast, d.contrast.or(b.contrast), "{name}");
        assert_eq!(profile.device.flip, d.flip.or(b.flip), "{name}");
        assert_eq!(profile.device.rotation, d.rotation.or(b.rotation), "{name}");
        assert_eq!(profile.device.exposure_mode, d.exposure_mode.or(b.exposure_mode), "{name}");
        assert_eq!(
            profile.device.exposure_compensation,
            d.exposure_compensation.or(b.exposure_compensation),
            "{name}"
        );

        let (a, b) = (&overlay.algorithm, &base.algorithm);
        assert_eq!(profile.algorithm.algo, a.algo.clone().unwrap_or(b.algo.clone()), "{name}");
        assert_eq!(profile.algorithm.display, a.display.unwrap_or(b.display), "{name}");
        assert_eq!(
            profile.algorithm.hsv_range_low,
            a.hsv_range_low.unwrap_or(b.hsv_range_low),
            "{name}"
        );
        assert_eq!(
            profile.algorithm.hsv_range_high,
            a.hsv_range_high.unwrap_or(b.hsv_range_high),
            "{name}"
        );
        assert_eq!(profile.algorithm.pnp_cam, a.pnp_cam.clone().unwrap_or(b.pnp_cam.clone()), "{name}");
        assert_eq!(
            profile.algorithm.intrinsics,
            a.intrinsics.clone().or(b.intrinsics.clone()),
            "{name}"
        );
    }
}

#[test]
fn test_calib_config_inherits_base_thresholds() {
    let profile = ProfileRegistry::builtin().resolve("calibConfig").unwrap();
    assert_eq!(profile.device.framerate, 90);
    assert_eq!(profile.device.sensor_mode, 7);
    assert_eq!(profile.device.brightness, None);
    assert_eq!(profile.algorithm.algo, "calibCap");
    assert_eq!(profile.algorithm.hsv_range_low, [30, 150, 170]);
    assert_eq!(profile.algorithm.hsv_range_high, [90, 255, 255]);
    assert_eq!(profile.algorithm.pnp_cam, "pi");
}

#[test]
fn test_default_aliases_module_debugging_config() {
    let registry = ProfileRegistry::builtin();
    let default = registry.resolve("default").unwrap();
    let debugging = registry.resolve("moduleDebuggingConfig").unwrap();

    assert_eq!(default, debugging);
    assert_eq!(default.name, "Debugging Config used w/ a 2019 module");
    assert_eq!(default.algorithm.algo, "verticies");
    assert_eq!(default.device.brightness, Some(40));
    assert!(default.algorithm.intrinsics.is_some());
}

#[test]
fn test_mutating_resolved_profile_does_not_leak() {
    let registry = ProfileRegistry::builtin();

    let mut first = registry.resolve("moduleDebuggingConfig").unwrap();
    first.device.brightness = Some(99);
    first.algorithm.hsv_range_low[0] = 0;
    if let Some(intrinsics) = first.algorithm.intrinsics.as_mut() {
        intrinsics.distortion_coeffs.clear();
    }

    let second = registry.resolve("moduleDebuggingConfig").unwrap();
    assert_eq!(second.device.brightness, Some(40));
    assert_eq!(second.algorithm.hsv_range_low, [40, 50, 90]);
    assert_eq!(
        second.algorithm.intrinsics.as_ref().map(|i| i.distortion_coeffs.len()),
        Some(5)
    );

    // Siblings derived from the same base are untouched too
    let sibling = registry.resolve("calibConfig").unwrap();
    assert_eq!(sibling.algorithm.hsv_range_low, [30, 150, 170]);
    assert_eq!(registry.base(), &base_profile());
}

#[test]
fn test_vectors_replace_atomically() {
    let mut base = base_profile();
    base.algorithm.intrinsics = Some(CameraIntrinsics {
        focal_length: (600.0, 600.0),
        principal_point: (320.0, 240.0),
        distortion_coeffs: vec![0.1, 0.2, 0.3, 0.4, 0.5],
    });

    let registry = ProfileRegistry::new(base).define(
        "short",
        ProfileOverlay {
            algorithm: AlgorithmOverlay {
                hsv_range_low: Some([1, 2, 3]),
                intrinsics: Some(CameraIntrinsics {
                    focal_length: (900.0, 901.0),
                    principal_point: (100.0, 100.0),
                    distortion_coeffs: vec![9.0, 8.0, 7.0, 6.0],
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let profile = registry.resolve("short").unwrap();
    let intrinsics = profile.algorithm.intrinsics.unwrap();
    assert_eq!(intrinsics.distortion_coeffs, vec![9.0, 8.0, 7.0, 6.0]);
    assert_eq!(intrinsics.focal_length, (900.0, 901.0));
    assert_eq!(profile.algorithm.hsv_range_low, [1, 2, 3]);
    assert_eq!(profile.algorithm.hsv_range_high, [90, 255, 255]);
}

#[test]
fn test_unknown_profile() {
    let err = ProfileRegistry::builtin().resolve("greenled").unwrap_err();
    assert!(matches!(err, Error::UnknownProfile(ref name) if name == "greenled"));
}

fn registry_with_device(overlay: DeviceOverlay) -> ProfileRegistry {
    ProfileRegistry::builtin().define(
        "broken",
        ProfileOverlay {
            device: overlay,
            ..Default::default()
        },
    )
}

#[test]
fn test_sensor_mode_out_of_range() {
    let registry = registry_with_device(DeviceOverlay {
        sensor_mode: Some(9),
        ..Default::default()
    });

    match registry.resolve("broken").unwrap_err() {
        Error::InvalidParameter { field, value, allowed } => {
            assert_eq!(field, "device.sensormode");
            assert_eq!(value, "9");
            assert_eq!(allowed, "[0, 7]");
        }
        other => panic!("Expected InvalidParameter, got {other:?}"),
    }
}

#[test]
fn test_documented_ranges_are_enforced() {
    let bad = [
        DeviceOverlay { brightness: Some(101), ..Default::default() },
        DeviceOverlay { contrast: Some(-101), ..Default::default() },
        DeviceOverlay { exposure_compensation: Some(-26), ..Default::default() },
        DeviceOverlay { iso: Some(300), ..Default::default() },
        DeviceOverlay { rotation: Some(45), ..Default::default() },
        DeviceOverlay { framerate: Some(0), ..Default::default() },
        DeviceOverlay { resolution: Some(Resolution::new(0, 480)), ..Default::default() },
    ];
    for overlay in bad {
        let err = registry_with_device(overlay.clone()).resolve("broken").unwrap_err();
        assert!(
            matches!(err, Error::InvalidParameter { .. }),
            "{overlay:?} was accepted"
        );
    }

    let edges = DeviceOverlay {
        brightness: Some(100),
        contrast: Some(-100),
        exposure_compensation: Some(25),
        sensor_mode: Some(0),
        iso: Some(800),
        rotation: Some(270),
        ..Default::default()
    };
    assert!(registry_with_device(edges).resolve("broken").is_ok());
}

#[test]
fn test_bad_intrinsics_rejected() {
    let registry = ProfileRegistry::builtin().define(
        "bad-intrinsics",
        ProfileOverlay {
            algorithm: AlgorithmOverlay {
                intrinsics: Some(CameraIntrinsics {
                    focal_length: (640.0, 640.0),
                    principal_point: (320.0, 240.0),
                    distortion_coeffs: vec![0.1, 0.2, 0.3],
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let err = registry.resolve("bad-intrinsics").unwrap_err();
    assert!(err.to_string().contains("distortion_coeffs"));
}

#[test]
fn test_overlay_name_defaults_to_key() {
    let registry = ProfileRegistry::new(base_profile())
        .define("plain", ProfileOverlay::default());
    assert_eq!(registry.resolve("plain").unwrap().name, "plain");
    assert!(registry.contains("plain"));
    assert!(!registry.contains("default"));
}

#[test]
fn test_builtin_names() {
    let registry = ProfileRegistry::builtin();
    let mut names: Vec<_> = registry.names().collect();
    names.sort();
    assert_eq!(
        names,
        vec!["calibConfig", "default", "moduleDebuggingConfig", "testConfig"]
    );
}
