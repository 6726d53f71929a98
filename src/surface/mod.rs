//! Client library surfaces the engine attaches to
//!
//! Two request APIs are supported: a chain of interceptors wrapped around a
//! single call, and a stepwise connection object driven by many calls.

pub mod chain;
pub mod connection;
