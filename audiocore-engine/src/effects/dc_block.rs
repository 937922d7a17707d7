//! `DcBlock`: single-pole DC-blocking high-pass filter.
//!
//! Demonstrates a processor with internal state that must be cleared by
//! `reset()` — one delay pair per channel, since channels are interleaved
//! and must not cross-contaminate each other's history.

use super::EffectProcessor;
use audiocore_common::AudioConfig;
use uuid::Uuid;

/// Pole position; close to 1.0 pushes the cutoff very low (inaudible DC
/// removal without coloring the audible band).
const POLE: f32 = 0.995;

pub struct DcBlock {
    id: Uuid,
    enabled: bool,
    mix: f32,
    channels: usize,
    prev_in: Vec<f32>,
    prev_out: Vec<f32>,
}

impl DcBlock {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: true,
            mix: 1.0,
            channels: 0,
            prev_in: Vec::new(),
            prev_out: Vec::new(),
        }
    }
}

impl Default for DcBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectProcessor for DcBlock {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        "dc_block"
    }

    fn initialize(&mut self, config: &AudioConfig) {
        self.channels = config.channels as usize;
        self.prev_in = vec![0.0; self.channels];
        self.prev_out = vec![0.0; self.channels];
    }

    fn process(&mut self, buf: &mut [f32], frame_count: usize) {
        if self.channels == 0 {
            return;
        }
        for frame in 0..frame_count {
            for ch in 0..self.channels {
                let idx = frame * self.channels + ch;
                let x = buf[idx];
                let y = x - self.prev_in[ch] + POLE * self.prev_out[ch];
                self.prev_in[ch] = x;
                self.prev_out[ch] = y;

                if self.mix >= 1.0 {
                    buf[idx] = y;
                } else {
                    buf[idx] = x * (1.0 - self.mix) + y * self.mix;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.prev_in.iter_mut().for_each(|v| *v = 0.0);
        self.prev_out.iter_mut().for_each(|v| *v = 0.0);
    }

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
    fn removes_constant_offset_over_time() {
        let config = AudioConfig::default_stereo_output();
        let mut dc = DcBlock::new();
        dc.initialize(&config);

        // Feed a constant-offset stereo signal for long enough that the
        // filter's output settles toward zero.
        let mut last = [1.0f32, 1.0];
        for _ in 0..20_000 {
            let mut buf = [1.0f32, 1.0];
            dc.process(&mut buf, 1);
            last = buf;
        }
        assert!(last[0].abs() < 0.05);
        assert!(last[1].abs() < 0.05);
    }

    #[test]
    fn reset_clears_history() {
        let config = AudioConfig::default_stereo_output();
        let mut dc = DcBlock::new();
        dc.initialize(&config);
        let mut buf = [0.5f32, 0.5];
        dc.process(&mut buf, 1);
        dc.reset();
        assert!(dc.prev_in.iter().all(|&v| v == 0.0));
        assert!(dc.prev_out.iter().all(|&v| v == 0.0));
    }
}
