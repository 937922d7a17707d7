//! # audiocore-common
//!
//! Shared types for the audiocore workspace: engine configuration,
//! frame-accurate timing conversions, and error-classification vocabulary
//! used by `audiocore-engine`.

pub mod config;
pub mod error;
pub mod timing;

pub use config::{AudioConfig, ConfigError, TomlAudioConfig};
pub use error::{ErrorClassification, RecoveryStrategy};
