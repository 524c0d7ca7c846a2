//! Public surface for Chronicle.
//!
//! Re-exports the building blocks and a logging helper so the binary and
//! embedders set things up the same way.

/// Re-export for convenience.
pub use chronicle_rs_config as config;
pub use chronicle_rs_core as core;
/// Re-export for convenience.
pub use chronicle_rs_memory as memory;
/// Re-export for convenience.
pub use chronicle_rs_protocol as protocol;

/// Initialize env_logger with millisecond timestamps and `RUST_LOG` filters.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
