//! Configuration schema and layered loading for Chronicle.
//!
//! Layers are JSON5 documents merged key by key; the effective document is
//! validated against the schema before it is decoded into `ChronicleConfig`.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Layered config types and loader options.
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
/// Configuration schema models.
pub use model::*;
