pub mod capture;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod profile;
pub mod server;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use capture::Frame;
pub use error::{Error, Result};
pub use lifecycle::{LifecycleController, LifecycleState};
pub use pipeline::FrameBroker;
pub use profile::{Profile, ProfileOverlay, ProfileRegistry};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CAMSTREAM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "camstream.toml";

/// Process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    /// Extra profile overlays, merged onto the built-in base profile.
    pub profiles: BTreeMap<String, ProfileOverlay>,
}

/// Sections layered by the `config` crate (file then environment).
#[derive(Default, Deserialize)]
#[serde(default)]
struct Sections {
    server: ServerConfig,
    capture: CaptureConfig,
}

/// Profile names and keys are case sensitive, so this table is read with
/// `toml` directly; `config` folds keys to lowercase.
#[derive(Default, Deserialize)]
#[serde(default)]
struct ProfileTable {
    profiles: BTreeMap<String, ProfileOverlay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Path the viewer page points at; any request with the same suffix streams.
    pub stream_path: String,
    pub boundary: String,
    /// How long shutdown waits for capture and open connections before giving up on them.
    pub shutdown_grace_ms: u64,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    Synthetic,
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Profile to resolve at startup.
    pub profile: String,
    pub backend: CameraBackend,
    pub device: String,
    pub buffer_count: u32,
    /// Encoder quality for the synthetic camera.
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5080,
            stream_path: "/cam.mjpg".into(),
            boundary: server::multipart::DEFAULT_BOUNDARY.into(),
            shutdown_grace_ms: 2000,
        }
    }
}

impl Default for CameraBackend {
    fn default() -> Self {
        if cfg!(feature = "v4l2") {
            CameraBackend::V4l2
        } else {
            CameraBackend::Synthetic
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            profile: profile::builtin::DEFAULT_PROFILE.into(),
            backend: CameraBackend::default(),
            device: "/dev/video0".into(),
            buffer_count: 4,
            jpeg_quality: 80,
        }
    }
}

impl Config {
    /// Load from the file named by `CAMSTREAM_CONFIG` (default `camstream.toml`),
    /// then `CAMSTREAM__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path))
    }

    /// A missing file is not an error; defaults fill anything left unset.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CAMSTREAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let Sections { server, capture } = config.try_deserialize()?;

        Ok(Self {
            server,
            capture,
            profiles: Self::load_profiles(path)?,
        })
    }

    fn load_profiles(path: &Path) -> Result<BTreeMap<String, ProfileOverlay>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::Config(config::ConfigError::Foreign(Box::new(e)))),
        };
        let table: ProfileTable = toml::from_str(&text).map_err(|source| Error::ProfileFile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(table.profiles)
    }

    /// Built-in profiles plus any defined in this configuration.
    pub fn registry(&self) -> ProfileRegistry {
        ProfileRegistry::builtin().with_overlays(self.profiles.clone())
    }
}
