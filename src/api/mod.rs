//! Public entry points for embedding the capture engine.

pub mod tap_api;

pub use tap_api::{
    get_version, init_core, init_from_env, install_chain_adapter, install_connection_adapter,
    tap_status, TapStatus,
};
