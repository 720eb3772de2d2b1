pub mod builtin;
pub mod registry;
pub mod settings;

pub use registry::{BaseProfile, Profile, ProfileOverlay, ProfileRegistry};
pub use settings::{
    AlgorithmOverlay, AlgorithmSettings, CameraIntrinsics, DeviceOverlay, DeviceSettings,
    ExposureMode, Resolution,
};
