//! Effect processor contract (C5) and chain.
//!
//! The reference stack has no equivalent of a pluggable effect chain — its
//! `Fader` is one concrete struct applying one fixed kind of fade. Per
//! Design Notes §9 (effect chain polymorphism), processors here sit behind
//! one small object-safe trait so the chain can hold heterogeneous
//! processors as trait objects, the same way the teacher's `Fader` mutates
//! a buffer in place per call but generalized to an ordered, enable/bypass
//! aware sequence of them.

mod dc_block;
mod gain_trim;

pub use dc_block::DcBlock;
pub use gain_trim::GainTrim;

use audiocore_common::AudioConfig;
use uuid::Uuid;

/// The contract every effect implements. `process` is the hot-path method:
/// no allocation after `initialize` has run once.
pub trait EffectProcessor: Send {
    fn id(&self) -> Uuid;
    fn name(&self) -> &str;

    /// Allocate internal buffers sized by the config. Called once before
    /// the first `process`, and again if the chain's owner reconfigures.
    fn initialize(&mut self, config: &AudioConfig);

    /// Modify `buf` (length `frame_count * config.channels`) in place.
    fn process(&mut self, buf: &mut [f32], frame_count: usize);

    /// Clear delay lines / internal state without forgetting configuration.
    fn reset(&mut self);

    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);

    /// Wet/dry mix in [0, 1]. A processor that supports blending is
    /// responsible for applying it itself inside `process` — the chain
    /// never blends on a processor's behalf.
    fn mix(&self) -> f32;
    fn set_mix(&mut self, mix: f32);
}

/// Ordered sequence of effect processors, applied in insertion order,
/// skipping any that are disabled.
pub struct EffectChain {
    processors: Vec<Box<dyn EffectProcessor>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Add a processor to the end of the chain. Structural change only —
    /// never called from the mixer's `process` path.
    pub fn add(&mut self, mut processor: Box<dyn EffectProcessor>, config: &AudioConfig) {
        processor.initialize(config);
        self.processors.push(processor);
    }

    /// Remove a processor by id. Returns `true` if one was found and removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.processors.len();
        self.processors.retain(|p| p.id() != id);
        self.processors.len() != before
    }

    /// Apply every enabled processor, in order, in place.
    pub fn process(&mut self, buf: &mut [f32], frame_count: usize) {
        for processor in self.processors.iter_mut().filter(|p| p.enabled()) {
            processor.process(buf, frame_count);
        }
    }

    pub fn reset(&mut self) {
        for processor in self.processors.iter_mut() {
            processor.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn set_enabled(&mut self, id: Uuid, enabled: bool) -> bool {
        for processor in self.processors.iter_mut() {
            if processor.id() == id {
                processor.set_enabled(enabled);
                return true;
            }
        }
        false
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}
