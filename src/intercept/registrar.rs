//! Hook registrar
//!
//! Installs the capture interceptor into chain clients at build time (at most
//! once per builder instance) and decorates the connection surface once per
//! process. The two installations are independent: one failing never stops the
//! other from being attempted.

use crate::capture::{InstanceTable, Materializer};
use crate::config::TapConfig;
use crate::error::InstallError;
use crate::intercept::chain::CaptureInterceptor;
use crate::intercept::connection::{ConnectionTap, PendingTable, TappedOpener};
use crate::output::Recorder;
use crate::surface::chain::{BuildHook, ChainApi, ClientBuilder, Interceptor};
use crate::surface::connection::{ConnectionApi, ConnectionOpener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set the first time a builder instance receives the capture interceptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientInstanceMarker {
    instrumented: bool,
}

impl ClientInstanceMarker {
    pub fn is_set(&self) -> bool {
        self.instrumented
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    Fresh,
    AlreadyInstalled,
}

/// Result of attempting both installations.
#[derive(Debug)]
pub struct InstallReport {
    pub chain: Result<Installed, InstallError>,
    pub connection: Result<Installed, InstallError>,
}

impl InstallReport {
    pub fn any_active(&self) -> bool {
        self.chain.is_ok() || self.connection.is_ok()
    }

    pub fn all_active(&self) -> bool {
        self.chain.is_ok() && self.connection.is_ok()
    }
}

struct MarkingBuildHook {
    interceptor: Arc<dyn Interceptor>,
    markers: Arc<InstanceTable<ClientInstanceMarker>>,
}

impl BuildHook for MarkingBuildHook {
    fn before_build(&self, builder: &mut ClientBuilder) {
        {
            let mut marker = self
                .markers
                .entry_or_insert_with(builder.instance(), ClientInstanceMarker::default);
            if marker.instrumented {
                return;
            }
            marker.instrumented = true;
        }
        builder.add_interceptor(self.interceptor.clone());
        tracing::info!(
            "Injected capture interceptor into client builder {}",
            builder.instance().id()
        );
    }
}

pub struct HookRegistrar {
    recorder: Arc<Recorder>,
    materializer: Materializer,
    chain_label: String,
    connection_label: String,
    markers: Arc<InstanceTable<ClientInstanceMarker>>,
    pending: Arc<PendingTable>,
    chain_installed: AtomicBool,
    connection_installed: AtomicBool,
}

impl HookRegistrar {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        let defaults = TapConfig::default();
        Self {
            recorder,
            materializer: Materializer::new(defaults.max_body_bytes),
            chain_label: defaults.chain_label,
            connection_label: defaults.connection_label,
            markers: Arc::new(InstanceTable::new()),
            pending: Arc::new(PendingTable::new()),
            chain_installed: AtomicBool::new(false),
            connection_installed: AtomicBool::new(false),
        }
    }

    pub fn from_config(recorder: Arc<Recorder>, config: &TapConfig) -> Self {
        Self {
            materializer: Materializer::new(config.max_body_bytes),
            chain_label: config.chain_label.clone(),
            connection_label: config.connection_label.clone(),
            ..Self::new(recorder)
        }
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn is_chain_installed(&self) -> bool {
        self.chain_installed.load(Ordering::SeqCst)
    }

    pub fn is_connection_installed(&self) -> bool {
        self.connection_installed.load(Ordering::SeqCst)
    }

    /// Hook the build step of `api` so each builder gets the interceptor once.
    pub fn install_chain_adapter(&self, api: &ChainApi) -> Result<Installed, InstallError> {
        if self
            .chain_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(Installed::AlreadyInstalled);
        }

        let interceptor: Arc<dyn Interceptor> = Arc::new(CaptureInterceptor::new(
            self.chain_label.clone(),
            self.recorder.clone(),
            self.materializer,
        ));
        let hook = Arc::new(MarkingBuildHook {
            interceptor,
            markers: self.markers.clone(),
        });
        if let Err(err) = api.set_build_hook(hook) {
            self.chain_installed.store(false, Ordering::SeqCst);
            return Err(InstallError::Chain(err));
        }

        tracing::info!("{} interceptor hook ready", self.chain_label);
        Ok(Installed::Fresh)
    }

    /// Decorate the connection opener of `api`. The decoration also applies to
    /// openers the library registers afterwards.
    pub fn install_connection_adapter(
        &self,
        api: &ConnectionApi,
    ) -> Result<Installed, InstallError> {
        if self
            .connection_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(Installed::AlreadyInstalled);
        }

        let tap = Arc::new(ConnectionTap::new(
            self.connection_label.clone(),
            self.recorder.clone(),
            self.materializer,
            self.pending.clone(),
        ));
        let decorated = api.decorate(move |inner| -> Arc<dyn ConnectionOpener> {
            Arc::new(TappedOpener::new(inner, tap.clone()))
        });
        if let Err(err) = decorated {
            self.connection_installed.store(false, Ordering::SeqCst);
            return Err(InstallError::Connection(err));
        }

        tracing::info!("{} hook ready", self.connection_label);
        Ok(Installed::Fresh)
    }

    /// Attempt both installations, logging failures without stopping.
    pub fn install(&self, chain: &ChainApi, connection: &ConnectionApi) -> InstallReport {
        let report = InstallReport {
            chain: self.install_chain_adapter(chain),
            connection: self.install_connection_adapter(connection),
        };
        if let Err(err) = &report.chain {
            tracing::warn!("{}", err);
        }
        if let Err(err) = &report.connection {
            tracing::warn!("{}", err);
        }
        if report.any_active() {
            tracing::info!("Network capture is active");
        }
        report
    }
}
