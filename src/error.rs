//! Error taxonomy shared by the registry, the capture adapters and the lifecycle controller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No profile registered under the requested name.
    #[error("unknown profile `{0}`")]
    UnknownProfile(String),

    /// A setting lies outside its documented range or set.
    #[error("invalid value {value} for {field}, allowed {allowed}")]
    InvalidParameter {
        field: String,
        value: String,
        allowed: String,
    },

    /// The capture device could not be opened.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The hardware refused a device setting.
    #[error("camera rejected configuration: {0}")]
    ConfigurationRejected(String),

    /// The frame sequence failed or ended while streaming.
    #[error("capture failed: {0}")]
    CaptureFailure(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The `[profiles]` table of a configuration file is malformed.
    #[error("invalid profiles in {path}: {source}")]
    ProfileFile {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// The controller has already shut down and cannot be started again.
    #[error("lifecycle controller already closed")]
    AlreadyClosed,
}

impl Error {
    pub(crate) fn invalid(
        field: impl Into<String>,
        value: impl ToString,
        allowed: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            field: field.into(),
            value: value.to_string(),
            allowed: allowed.into(),
        }
    }
}
