//! `GainTrim`: scalar multiply with wet/dry blending.
//!
//! The simplest possible `EffectProcessor` — ships as a test fixture and a
//! usage example, grounded in the teacher's `Fader` pattern of a small
//! struct that mutates a buffer in place per call.

use super::EffectProcessor;
use audiocore_common::AudioConfig;
use uuid::Uuid;

pub struct GainTrim {
    id: Uuid,
    enabled: bool,
    mix: f32,
    gain: f32,
}

impl GainTrim {
    pub fn new(gain: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: true,
            mix: 1.0,
            gain,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl EffectProcessor for GainTrim {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        "gain_trim"
    }

    fn initialize(&mut self, _config: &AudioConfig) {
        // Stateless: nothing to allocate.
    }

    fn process(&mut self, buf: &mut [f32], _frame_count: usize) {
        if self.mix >= 1.0 {
            for s in buf.iter_mut() {
                *s *= self.gain;
            }
        } else {
            for s in buf.iter_mut() {
                let wet = *s * self.gain;
                *s = *s * (1.0 - self.mix) + wet * self.mix;
            }
        }
    }

    fn reset(&mut self) {}

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn mix(&self) -> f32 {
        self.mix
    }

    fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_gain_scales_every_sample() {
        let mut gain = GainTrim::new(0.5);
        let mut buf = [1.0f32; 8];
        gain.process(&mut buf, 4);
        assert!(buf.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn half_mix_blends_toward_dry() {
        let mut gain = GainTrim::new(0.0);
        gain.set_mix(0.5);
        let mut buf = [1.0f32; 2];
        gain.process(&mut buf, 1);
        assert!((buf[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn disabled_processor_is_skipped_by_caller() {
        let mut gain = GainTrim::new(0.5);
        gain.set_enabled(false);
        assert!(!gain.enabled());
    }
}
