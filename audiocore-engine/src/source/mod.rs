//! Source contract (C3): the abstract audio source the mixer reads from.

pub mod decoder;
pub mod file_source;
pub mod resampler;
pub mod time_stretch;

pub use file_source::FileSource;

use audiocore_common::AudioConfig;
use uuid::Uuid;

pub type SourceId = Uuid;

/// Lifecycle states of a [`Source`]. `Buffering` is transient — observed
/// when a source's ring buffer has fallen below its minimum target fill and
/// reported via an event, not a terminal state. `Error` is terminal until an
/// explicit `stop` followed by a new `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Playing,
    Paused,
    Buffering,
    Error,
}

/// The contract the mixer reads every source through.
///
/// `read_samples` is called only from the mixer pump thread and must never
/// block on I/O: on underrun it returns a partial read and the caller fills
/// the remaining tail with silence. `seek` may block on decoder
/// repositioning and must never be called from the mixer thread.
pub trait Source: Send {
    fn id(&self) -> SourceId;

    /// Fill `buf` (length `frame_count * channels`) with interleaved
    /// samples, applying this source's volume. Returns the number of
    /// *frames* actually produced (may be less than `frame_count` on
    /// underrun, in which case the unwritten tail of `buf` is left as
    /// whatever the caller pre-zeroed it to).
    fn read_samples(&mut self, buf: &mut [f32], frame_count: usize) -> usize;

    fn seek(&mut self, position_seconds: f64) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);

    fn state(&self) -> SourceState;
    fn position_seconds(&self) -> f64;
    fn duration_seconds(&self) -> f64;
    fn is_end_of_stream(&self) -> bool;
    fn config(&self) -> &AudioConfig;

    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);

    fn tempo(&self) -> f32;
    fn set_tempo(&mut self, tempo: f32);

    fn pitch_semitones(&self) -> f32;
    fn set_pitch_semitones(&mut self, semitones: f32);
}

/// Optional capability: sources that can be driven by a [`crate::synchronizer::Synchronizer`].
///
/// Replaces a runtime type-introspection check ("is this object
/// Synchronizable?") with an explicit, object-safe trait. A source that
/// never participates in a sync group (e.g. a hypothetical always-silent
/// generator) simply does not implement it.
pub trait Synchronizable: Source {
    /// Close or open the sync gate. While closed, `read_samples` must
    /// return pure silence without consuming from the source's ring buffer
    /// or advancing its reported position.
    fn set_sync_gate(&mut self, open: bool);
    fn sync_gate_is_open(&self) -> bool;

    /// Current position in frames, for drift comparison against the ghost
    /// track. Distinct from `position_seconds` to avoid float round-trip
    /// error accumulating across many drift checks.
    fn sample_position(&self) -> i64;

    /// Snap this source's internal position tracking to `target_frame`
    /// without a full decoder-level seek. How this is achieved is
    /// source-specific (e.g. adjusting an internal frame offset).
    fn resync_to(&mut self, target_frame: i64);

    /// Frames currently sitting in the source's ring buffer, used by the
    /// Synchronizer's pre-buffer barrier to decide when a source has
    /// enough lead to open its gate without immediately underrunning.
    fn buffered_frames(&self) -> usize;
}

/// A source usable through the shared registry: the mixer reads it, the
/// synchronizer gates and resyncs it. Combines [`Source`] and
/// [`Synchronizable`] into one object-safe trait so a single trait object
/// can be stored per registry entry instead of two.
pub trait SourceHandle: Source + Synchronizable {}
impl<T: Source + Synchronizable> SourceHandle for T {}
