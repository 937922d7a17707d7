//! Error types for the mixing/synchronization core.
//!
//! Each concern gets its own `thiserror` enum; they aggregate into one
//! crate-wide [`Error`] via `#[from]`. Every variant has a stable error code
//! (for logs/telemetry) and a recommended [`RecoveryStrategy`], following
//! the same shape the rest of the reference stack uses for its own errors.

use audiocore_common::error::{ErrorClassification, RecoveryStrategy};
use audiocore_common::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to source/mixer/synchronizer playback state.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::source::SourceState,
        to: crate::source::SourceState,
    },

    #[error("seek position {position} out of bounds (0..{duration})")]
    PositionOutOfBounds { position: f64, duration: f64 },

    #[error("sync group {group_id} has no members")]
    EmptySyncGroup { group_id: String },

    #[error("sync group {group_id} not found")]
    UnknownSyncGroup { group_id: String },

    #[error("source {source_id} not found")]
    UnknownSource { source_id: uuid::Uuid },

    #[error("synchronized start timed out after {waited_ms}ms")]
    SyncStartTimeout { waited_ms: u64 },
}

/// Errors related to audio decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("audio file not found: {path}")]
    FileNotFound { path: String },

    #[error("corrupted audio data at offset {offset}")]
    CorruptedData { offset: u64 },

    #[error("failed to probe audio format")]
    ProbeFailure,

    #[error("no audio tracks found in file")]
    NoAudioTracks,

    #[error("failed to seek to position {position}")]
    SeekFailed { position: u64 },

    #[error("resampling error: {reason}")]
    ResamplingError { reason: String },
}

/// Errors related to ring buffers and the buffer pool.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer underrun: needed {needed} samples, had {available}")]
    Underrun { needed: usize, available: usize },

    #[error("pool buffer of wrong length returned: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// Errors related to the platform audio device / sink.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio device available")]
    NoDevice,

    #[error("audio device disconnected")]
    Disconnected,

    #[error("failed to open device stream: {reason}")]
    StreamOpenFailed { reason: String },

    #[error("unsupported stream configuration: {reason}")]
    UnsupportedConfig { reason: String },
}

impl ErrorClassification for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "AC_CF_001",
            Error::Playback(e) => match e {
                PlaybackError::InvalidStateTransition { .. } => "AC_PB_001",
                PlaybackError::PositionOutOfBounds { .. } => "AC_PB_002",
                PlaybackError::EmptySyncGroup { .. } => "AC_PB_003",
                PlaybackError::UnknownSyncGroup { .. } => "AC_PB_004",
                PlaybackError::UnknownSource { .. } => "AC_PB_005",
                PlaybackError::SyncStartTimeout { .. } => "AC_PB_006",
            },
            Error::Decode(e) => match e {
                DecodeError::UnsupportedFormat { .. } => "AC_DC_001",
                DecodeError::FileNotFound { .. } => "AC_DC_002",
                DecodeError::CorruptedData { .. } => "AC_DC_003",
                DecodeError::ProbeFailure => "AC_DC_004",
                DecodeError::NoAudioTracks => "AC_DC_005",
                DecodeError::SeekFailed { .. } => "AC_DC_006",
                DecodeError::ResamplingError { .. } => "AC_DC_007",
            },
            Error::Buffer(e) => match e {
                BufferError::Underrun { .. } => "AC_BF_001",
                BufferError::WrongLength { .. } => "AC_BF_002",
            },
            Error::Device(e) => match e {
                DeviceError::NoDevice => "AC_DV_001",
                DeviceError::Disconnected => "AC_DV_002",
                DeviceError::StreamOpenFailed { .. } => "AC_DV_003",
                DeviceError::UnsupportedConfig { .. } => "AC_DV_004",
            },
            Error::Io(_) => "AC_IO_001",
        }
    }

    fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            Error::Io(_) => RecoveryStrategy::Retry {
                max_attempts: 3,
                delay_ms: 1000,
            },
            Error::Decode(DecodeError::FileNotFound { .. }) => RecoveryStrategy::Skip,
            Error::Decode(DecodeError::UnsupportedFormat { .. }) => RecoveryStrategy::Skip,
            Error::Decode(DecodeError::CorruptedData { .. }) => RecoveryStrategy::Skip,
            Error::Decode(DecodeError::NoAudioTracks) => RecoveryStrategy::Skip,
            Error::Buffer(BufferError::Underrun { .. }) => RecoveryStrategy::Retry {
                max_attempts: 5,
                delay_ms: 100,
            },
            Error::Device(DeviceError::Disconnected) => RecoveryStrategy::Fatal,
            Error::Device(DeviceError::NoDevice) => RecoveryStrategy::Fatal,
            Error::Config(_) => RecoveryStrategy::Fatal,
            Error::Playback(PlaybackError::SyncStartTimeout { .. }) => {
                RecoveryStrategy::LogAndContinue
            }
            _ => RecoveryStrategy::LogAndContinue,
        }
    }
}
