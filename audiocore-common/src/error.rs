//! Shared error-handling primitives used by both this crate and
//! `audiocore-engine`.
//!
//! Each crate defines its own `thiserror`-based error enums for its own
//! concerns; this module only carries the vocabulary those enums share so
//! that callers can reason about recovery uniformly regardless of which
//! crate raised the error.

/// Recommended recovery strategy for an error.
#[derive(Debug, Clone, Copy)]
pub enum RecoveryStrategy {
    /// Retry the operation.
    Retry {
        max_attempts: u32,
        delay_ms: u64,
    },
    /// Skip the current item (e.g. a single source) and continue.
    Skip,
    /// Log the error and continue; no corrective action taken.
    LogAndContinue,
    /// Unrecoverable; the caller should stop.
    Fatal,
}

/// Implemented by every error enum in the crate family so each one exposes a
/// stable code (for logs/telemetry) and a recommended recovery strategy.
pub trait ErrorClassification {
    fn error_code(&self) -> &'static str;
    fn recovery_strategy(&self) -> RecoveryStrategy;
}
