//! # audiocore-engine
//!
//! Real-time multi-track audio mixing and synchronization core: decode,
//! mix, and keep N sources sample-aligned, while exposing a control surface
//! that never blocks the caller for longer than an explicitly bounded
//! timeout.
//!
//! Module map, in dependency order (lower modules are leaves the higher
//! ones build on):
//! - [`error`] — crate-wide error vocabulary.
//! - [`events`] — the public event stream.
//! - [`ring_buffer`] — lock-free SPSC sample transport.
//! - [`buffer_pool`] — allocation-free scratch buffers for the mix loop.
//! - [`registry`] — the `SourceId -> source` map shared by mixer and synchronizer.
//! - [`source`] — the `Source`/`Synchronizable` contracts and the `FileSource` implementation.
//! - [`effects`] — the effect processor contract and chain.
//! - [`synchronizer`] — sync groups, ghost track, drift correction.
//! - [`mixer`] — the pump thread summing sources into a master bus.
//! - [`sink`] — the cpal-backed platform output device.
//! - [`engine`] — the public facade tying all of the above together.

pub mod buffer_pool;
pub mod effects;
pub mod engine;
pub mod error;
pub mod events;
pub mod mixer;
pub mod registry;
pub mod ring_buffer;
pub mod sink;
pub mod source;
pub mod synchronizer;

pub use audiocore_common::{AudioConfig, ConfigError};
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use effects::{DcBlock, EffectChain, EffectProcessor, GainTrim};
pub use engine::Engine;
pub use error::{BufferError, DecodeError, DeviceError, Error, PlaybackError, Result};
pub use events::{Event, EventBus};
pub use mixer::{Mixer, MixerStats};
pub use registry::SourceRegistry;
pub use ring_buffer::{RingBufferStats, RingConsumer, RingProducer, SampleRingBuffer};
pub use sink::CpalSink;
pub use source::{FileSource, Source, SourceHandle, SourceId, SourceState, Synchronizable};
pub use synchronizer::Synchronizer;
