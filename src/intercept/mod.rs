//! Capture adapters
//!
//! - [`chain`]: interceptor for chain-based clients (Adapter A)
//! - [`connection`]: shims around stepwise connections (Adapter B)
//! - [`registrar`]: installs both into their surfaces, idempotently

pub mod chain;
pub mod connection;
pub mod registrar;

pub use chain::CaptureInterceptor;
pub use connection::{
    ConnectionTap, PendingRequestState, TappedConnection, TappedOpener, TeeWriter,
};
pub use registrar::{ClientInstanceMarker, HookRegistrar, InstallReport, Installed};
