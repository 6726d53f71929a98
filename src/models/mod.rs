//! Data models for captured traffic

pub mod exchange;
pub mod headers;

pub use exchange::*;
pub use headers::*;
