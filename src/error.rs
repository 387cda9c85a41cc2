use std::path::PathBuf;

/// Errors raised by the tracking pipeline and its device adapters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("actuator channel unavailable on {path}: {reason}")]
    ChannelUnavailable { path: String, reason: String },

    #[error("capture read failed: {0}")]
    Capture(String),

    #[error("display surface failed: {0}")]
    Display(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("image error")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
