//! Process-wide capture API
//!
//! Holds the single [`HookRegistrar`] for the process and wires it into the
//! global client surfaces.

use anyhow::Context;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

use crate::config::TapConfig;
use crate::error::InstallError;
use crate::intercept::{HookRegistrar, InstallReport, Installed};
use crate::output::{RecordFormat, Recorder, StderrSink};
use crate::surface::chain::ChainApi;
use crate::surface::connection::ConnectionApi;

static REGISTRAR: OnceCell<HookRegistrar> = OnceCell::new();

/// Snapshot of the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TapStatus {
    pub version: String,
    pub initialized: bool,
    pub chain_active: bool,
    pub connection_active: bool,
    pub records_emitted: u64,
}

/// Get the version of the capture engine
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize logging, build the registrar and hook both global surfaces.
///
/// Safe to call more than once. The registrar is built from the first
/// config; later calls only retry the installations that have not happened.
pub fn init_core(config: TapConfig) -> anyhow::Result<InstallReport> {
    init_logging(&config)?;

    let registrar = REGISTRAR.get_or_try_init(|| -> anyhow::Result<HookRegistrar> {
        let recorder = config
            .build_recorder()
            .context("Failed to open capture record sink")?;
        Ok(HookRegistrar::from_config(Arc::new(recorder), &config))
    })?;

    let report = registrar.install(&ChainApi::global(), &ConnectionApi::global());
    tracing::info!("HTTP capture engine initialized v{}", env!("CARGO_PKG_VERSION"));
    Ok(report)
}

/// [`init_core`] with defaults overridden from `HTTPTAP_*` variables.
pub fn init_from_env() -> anyhow::Result<InstallReport> {
    let config = TapConfig::default()
        .with_env_overrides()
        .context("Invalid HTTPTAP_* environment")?;
    init_core(config)
}

/// Install the chain adapter into the global chain surface.
pub fn install_chain_adapter() -> Result<Installed, InstallError> {
    registrar().install_chain_adapter(&ChainApi::global())
}

/// Install the connection adapter into the global connection surface.
pub fn install_connection_adapter() -> Result<Installed, InstallError> {
    registrar().install_connection_adapter(&ConnectionApi::global())
}

pub fn tap_status() -> TapStatus {
    let registrar = REGISTRAR.get();
    TapStatus {
        version: get_version(),
        initialized: registrar.is_some(),
        chain_active: registrar.map_or(false, |r| r.is_chain_installed()),
        connection_active: registrar.map_or(false, |r| r.is_connection_installed()),
        records_emitted: registrar.map_or(0, |r| r.recorder().emitted()),
    }
}

fn registrar() -> &'static HookRegistrar {
    REGISTRAR.get_or_init(|| {
        let recorder = Recorder::new(Box::new(StderrSink), RecordFormat::Text);
        HookRegistrar::new(Arc::new(recorder))
    })
}

fn init_logging(config: &TapConfig) -> anyhow::Result<()> {
    let level = resolve_log_level(config.log_level.as_deref());

    match &config.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir).with_context(|| {
                format!("Failed to create log directory {}", log_dir.display())
            })?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "httptap");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Logging lasts until process exit.
            std::mem::forget(guard);

            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(non_blocking)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}

/// Level from config, then `RUST_LOG`, then info.
fn resolve_log_level(configured: Option<&str>) -> LevelFilter {
    configured
        .and_then(parse_level)
        .or_else(|| std::env::var("RUST_LOG").ok().as_deref().and_then(parse_level))
        .unwrap_or(LevelFilter::INFO)
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" => Some(LevelFilter::OFF),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!(parse_level("TRACE"), Some(LevelFilter::TRACE));
        assert_eq!(parse_level(" warning "), Some(LevelFilter::WARN));
        assert_eq!(parse_level("error"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("httptap=debug"), None);
    }

    #[test]
    fn configured_level_wins() {
        assert_eq!(resolve_log_level(Some("debug")), LevelFilter::DEBUG);
    }

    #[test]
    fn version_matches_package() {
        assert_eq!(get_version(), crate::VERSION);
    }
}
