//! Time-stretch (tempo/pitch shift) as an external collaborator.
//!
//! The reference stack has no time-stretch capability; the base dependency
//! table was enriched with `signalsmith-stretch`, the crate a sibling
//! reference engine uses for exactly this purpose in its real-time path
//! (its offline-only counterpart there, `rf-r8brain`, is explicitly not
//! real-time-safe). The trait below is deliberately narrow — `put` /
//! `receive` / `flush` / `clear` — so any SOLA-family implementation can be
//! dropped in behind it.

use signalsmith_stretch::Stretch;

/// A tempo/pitch-shift stage sitting between the raw decoder output and a
/// source's ring buffer.
pub trait TimeStretch: Send {
    /// Feed input samples (interleaved, `config.channels` wide) into the
    /// stretcher. Does not necessarily produce output immediately — SOLA
    /// algorithms buffer internally.
    fn put(&mut self, input: &[f32]);

    /// Drain up to `out.len()` processed samples into `out`. Returns the
    /// number of samples written.
    fn receive(&mut self, out: &mut [f32]) -> usize;

    /// Signal end-of-input and drain the remaining internal buffer through
    /// subsequent `receive` calls.
    fn flush(&mut self);

    /// Discard all internal state (used on seek).
    fn clear(&mut self);

    fn set_tempo(&mut self, tempo: f32);
    fn set_pitch_semitones(&mut self, semitones: f32);
}

/// `signalsmith-stretch`-backed implementation.
pub struct SignalsmithTimeStretch {
    stretch: Stretch,
    channels: usize,
    tempo: f32,
    pitch_semitones: f32,
    flushing: bool,
}

impl SignalsmithTimeStretch {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let mut stretch = Stretch::new(sample_rate as usize, channels);
        stretch.set_transpose_semitones(0.0);
        Self {
            stretch,
            channels,
            tempo: 1.0,
            pitch_semitones: 0.0,
            flushing: false,
        }
    }
}

impl TimeStretch for SignalsmithTimeStretch {
    fn put(&mut self, input: &[f32]) {
        self.stretch.process(input, self.channels, self.tempo);
    }

    fn receive(&mut self, out: &mut [f32]) -> usize {
        self.stretch.read(out)
    }

    fn flush(&mut self) {
        self.flushing = true;
        self.stretch.flush();
    }

    fn clear(&mut self) {
        self.stretch.reset();
        self.flushing = false;
    }

    fn set_tempo(&mut self, tempo: f32) {
        self.tempo = tempo.clamp(0.25, 4.0);
    }

    fn set_pitch_semitones(&mut self, semitones: f32) {
        self.pitch_semitones = semitones.clamp(-12.0, 12.0);
        self.stretch.set_transpose_semitones(self.pitch_semitones);
    }
}

/// A stretcher that does nothing — used when a source's tempo and pitch are
/// both left at unity, so the decode loop skips the stretch stage entirely
/// rather than paying for it unconditionally.
pub struct PassthroughTimeStretch;

impl TimeStretch for PassthroughTimeStretch {
    fn put(&mut self, _input: &[f32]) {}
    fn receive(&mut self, _out: &mut [f32]) -> usize {
        0
    }
    fn flush(&mut self) {}
    fn clear(&mut self) {}
    fn set_tempo(&mut self, _tempo: f32) {}
    fn set_pitch_semitones(&mut self, _semitones: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_never_produces_output() {
        let mut ts = PassthroughTimeStretch;
        ts.put(&[0.1, 0.2, 0.3]);
        let mut out = [0.0f32; 4];
        assert_eq!(ts.receive(&mut out), 0);
    }
}
