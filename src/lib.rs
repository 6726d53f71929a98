//! # httptap
//!
//! In-process HTTP traffic capture. Records every request and response made
//! through the supported client surfaces as human-readable blocks, without
//! changing what the application sends or receives.
//!
//! ## Features
//!
//! - Interceptor injection into chain-based clients at build time
//! - Stepwise shims around connection-style clients
//! - gzip-aware body capture with a size cap
//! - Stream replay so captured response bodies stay readable
//! - Text or JSON records to stderr, a file, or `tracing`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Application HTTP calls                  │
//! ├───────────────────────────┬─────────────────────────────┤
//! │   surface::chain          │   surface::connection       │
//! │   (ClientBuilder/Client)  │   (HttpConnection)          │
//! ├───────────────────────────┼─────────────────────────────┤
//! │   intercept::chain        │   intercept::connection     │
//! │   CaptureInterceptor      │   TappedConnection + Tee    │
//! ├───────────────────────────┴─────────────────────────────┤
//! │  capture (Materializer, replay, InstanceTable)          │
//! ├─────────────────────────────────────────────────────────┤
//! │  output (Recorder ──▶ stderr | file | tracing)          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod intercept;
pub mod models;
pub mod output;
pub mod surface;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
