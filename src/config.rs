//! Engine configuration
//!
//! Resolved from defaults, an optional JSON file and `HTTPTAP_*` environment
//! variables, in that order.

use crate::capture::{Materializer, DEFAULT_MAX_BODY_BYTES};
use crate::error::ConfigError;
use crate::output::{FileSink, RecordFormat, RecordSink, Recorder, StderrSink, TracingSink};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

pub const ENV_LOG_LEVEL: &str = "HTTPTAP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "HTTPTAP_LOG_DIR";
pub const ENV_SINK: &str = "HTTPTAP_SINK";
pub const ENV_SINK_PATH: &str = "HTTPTAP_SINK_PATH";
pub const ENV_FORMAT: &str = "HTTPTAP_FORMAT";
pub const ENV_MAX_BODY_BYTES: &str = "HTTPTAP_MAX_BODY_BYTES";

/// Where capture records are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    #[default]
    Stderr,
    Tracing,
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Diagnostic log level. Falls back to `RUST_LOG` when unset.
    pub log_level: Option<String>,
    /// Directory for the rolling diagnostic log. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
    pub sink: SinkConfig,
    pub format: RecordFormat,
    pub max_body_bytes: usize,
    pub chain_label: String,
    pub connection_label: String,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_dir: None,
            sink: SinkConfig::Stderr,
            format: RecordFormat::Text,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            chain_label: "HttpClient".to_string(),
            connection_label: "HttpConnection".to_string(),
        }
    }
}

impl TapConfig {
    /// Load a config file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `HTTPTAP_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = Some(level);
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = get(ENV_FORMAT) {
            self.format = format.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_FORMAT,
                value: format.clone(),
            })?;
        }
        if let Some(max) = get(ENV_MAX_BODY_BYTES) {
            self.max_body_bytes = max.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_MAX_BODY_BYTES,
                value: max.clone(),
            })?;
        }

        let sink_path = get(ENV_SINK_PATH).map(PathBuf::from);
        match get(ENV_SINK).map(|s| s.to_ascii_lowercase()) {
            Some(kind) => {
                self.sink = match kind.as_str() {
                    "stderr" => SinkConfig::Stderr,
                    "tracing" => SinkConfig::Tracing,
                    "file" => {
                        let path = sink_path
                            .or_else(|| match &self.sink {
                                SinkConfig::File { path } => Some(path.clone()),
                                _ => None,
                            })
                            .ok_or_else(|| ConfigError::InvalidValue {
                                key: ENV_SINK_PATH,
                                value: String::new(),
                            })?;
                        SinkConfig::File { path }
                    }
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            key: ENV_SINK,
                            value: kind,
                        })
                    }
                };
            }
            // A path on its own selects the file sink.
            None => {
                if let Some(path) = sink_path {
                    self.sink = SinkConfig::File { path };
                }
            }
        }

        Ok(self)
    }

    pub fn materializer(&self) -> Materializer {
        Materializer::new(self.max_body_bytes)
    }

    pub fn build_sink(&self) -> io::Result<Box<dyn RecordSink>> {
        Ok(match &self.sink {
            SinkConfig::Stderr => Box::new(StderrSink),
            SinkConfig::Tracing => Box::new(TracingSink),
            SinkConfig::File { path } => Box::new(FileSink::open(path)?),
        })
    }

    pub fn build_recorder(&self) -> io::Result<Recorder> {
        Ok(Recorder::new(self.build_sink()?, self.format))
    }
}
