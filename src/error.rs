//! Error types shared across the engine

use thiserror::Error;

/// Failure reported by a client library surface when a hook is requested.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("{0} is not available in this process")]
    LibraryAbsent(&'static str),
    #[error("{0} already carries a hook")]
    AlreadyHooked(&'static str),
}

/// Failure installing one adapter. Each adapter fails independently.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("chain adapter hook setup failed: {0}")]
    Chain(#[source] SurfaceError),
    #[error("connection adapter hook setup failed: {0}")]
    Connection(#[source] SurfaceError),
}

/// Reasons a body could not be rendered as text. Never leaves the capture path.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to snapshot body: {0}")]
    Snapshot(#[source] std::io::Error),
    #[error("failed to decompress gzip body: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("body is not valid UTF-8")]
    NotUtf8(#[from] std::string::FromUtf8Error),
    #[error("body exceeds capture limit of {limit} bytes")]
    TooLarge { limit: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
