//! Capture primitives
//!
//! Side-channel copying of bodies and streams. Nothing in here may alter the
//! bytes the application sends or receives.

pub mod body;
pub mod instance;
pub mod replay;

pub use body::{BodySource, Materializer, DEFAULT_MAX_BODY_BYTES};
pub use instance::{InstanceHandle, InstanceId, InstanceTable};
pub use replay::{replay, ReplayStream, Replayed};
