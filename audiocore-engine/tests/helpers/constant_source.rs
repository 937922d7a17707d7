//! A minimal in-memory [`Source`]/[`Synchronizable`] fixture used by the
//! scenario tests to exercise mixer/synchronizer contracts without a real
//! decoder thread. Emits an unchanging sample value while playing and with
//! its sync gate open; silent otherwise.

use audiocore_engine::{AudioConfig, Source, SourceId, SourceState, Synchronizable};

pub struct ConstantSource {
    id: SourceId,
    config: AudioConfig,
    value: f32,
    volume: f32,
    state: SourceState,
    position_frames: i64,
    gate_open: bool,
}

impl ConstantSource {
    pub fn new(config: AudioConfig, value: f32) -> Self {
        Self {
            id: SourceId::new_v4(),
            config,
            value,
            volume: 1.0,
            state: SourceState::Idle,
            position_frames: 0,
            gate_open: true,
        }
    }
}

impl Source for ConstantSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn read_samples(&mut self, buf: &mut [f32], frame_count: usize) -> usize {
        if self.state != SourceState::Playing || !self.gate_open {
            buf.iter_mut().for_each(|s| *s = 0.0);
            return frame_count;
        }
        buf.iter_mut().for_each(|s| *s = self.value * self.volume);
        self.position_frames += frame_count as i64;
        frame_count
    }

    fn seek(&mut self, position_seconds: f64) -> bool {
        self.position_frames =
            (position_seconds * self.config.sample_rate as f64).round() as i64;
        true
    }

    fn play(&mut self) {
        self.state = SourceState::Playing;
    }

    fn pause(&mut self) {
        self.state = SourceState::Paused;
    }

    fn stop(&mut self) {
        self.state = SourceState::Idle;
        self.position_frames = 0;
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn position_seconds(&self) -> f64 {
        self.position_frames as f64 / self.config.sample_rate as f64
    }

    fn duration_seconds(&self) -> f64 {
        10.0
    }

    fn is_end_of_stream(&self) -> bool {
        false
    }

    fn config(&self) -> &AudioConfig {
        &self.config
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn tempo(&self) -> f32 {
        1.0
    }

    fn set_tempo(&mut self, _tempo: f32) {}

    fn pitch_semitones(&self) -> f32 {
        0.0
    }

    fn set_pitch_semitones(&mut self, _semitones: f32) {}
}

impl Synchronizable for ConstantSource {
    fn set_sync_gate(&mut self, open: bool) {
        self.gate_open = open;
    }

    fn sync_gate_is_open(&self) -> bool {
        self.gate_open
    }

    fn sample_position(&self) -> i64 {
        self.position_frames
    }

    fn resync_to(&mut self, target_frame: i64) {
        self.position_frames = target_frame;
    }

    fn buffered_frames(&self) -> usize {
        usize::MAX
    }
}
