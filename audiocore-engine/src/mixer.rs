//! Mixer (C7): the pump thread that sums every active source into one
//! master bus, applies the master effect chain, and hands the result to the
//! sink.
//!
//! Grounded in the teacher's `Mixer` pump loop shape (snapshot the active
//! set under a short lock, mix, advance state, never hold a lock across the
//! mix itself) generalized from the teacher's sequential crossfade-between-
//! at-most-two-tracks model to N-source summation plus a master effect
//! chain and peak meters.

use crate::buffer_pool::BufferPool;
use crate::effects::EffectChain;
use crate::events::{Event, EventBus};
use crate::registry::SourceRegistry;
use crate::ring_buffer::RingProducer;
use crate::source::{SourceId, SourceState};
use crate::synchronizer::Synchronizer;
use audiocore_common::AudioConfig;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How often (in mix periods) the mixer asks the synchronizer to check and
/// correct drift across all groups.
const DRIFT_CHECK_PERIOD_BUFFERS: u64 = 20;

/// Default drift tolerance, in frames, passed to periodic drift checks.
const DEFAULT_DRIFT_TOLERANCE_FRAMES: i64 = 30;

/// Peak meter decay applied once per mix period.
const PEAK_DECAY: f32 = 0.95;

/// Bound on how long the pump thread will retry writing a full mixed buffer
/// into the sink before giving up and counting it as an underrun.
const SINK_BACKPRESSURE_TIMEOUT: Duration = Duration::from_millis(20);
const SINK_BACKPRESSURE_BACKOFF: Duration = Duration::from_micros(500);

#[derive(Debug, Clone, Copy, Default)]
pub struct MixerStats {
    pub total_frames_mixed: u64,
    pub total_underruns: u64,
    pub peak_left: f32,
    pub peak_right: f32,
}

struct SharedStats {
    total_frames_mixed: AtomicU64,
    total_underruns: AtomicU64,
    peak_left_bits: AtomicU32,
    peak_right_bits: AtomicU32,
}

impl SharedStats {
    fn new() -> Self {
        Self {
            total_frames_mixed: AtomicU64::new(0),
            total_underruns: AtomicU64::new(0),
            peak_left_bits: AtomicU32::new(0),
            peak_right_bits: AtomicU32::new(0),
        }
    }

    fn snapshot(&self) -> MixerStats {
        MixerStats {
            total_frames_mixed: self.total_frames_mixed.load(Ordering::Relaxed),
            total_underruns: self.total_underruns.load(Ordering::Relaxed),
            peak_left: f32::from_bits(self.peak_left_bits.load(Ordering::Relaxed)),
            peak_right: f32::from_bits(self.peak_right_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Sums every registered source into a master bus once per period.
pub struct Mixer {
    config: AudioConfig,
    buffer_size_frames: usize,
    registry: Arc<SourceRegistry>,
    synchronizer: Arc<Synchronizer>,
    events: Arc<EventBus>,
    pool: Arc<BufferPool>,
    source_ids: RwLock<Vec<SourceId>>,
    master_chain: Mutex<EffectChain>,
    master_volume_bits: AtomicU32,
    running: Arc<AtomicBool>,
    stats: Arc<SharedStats>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Mixer {
    pub fn new(
        config: AudioConfig,
        buffer_size_frames: usize,
        registry: Arc<SourceRegistry>,
        synchronizer: Arc<Synchronizer>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let pool = BufferPool::new(buffer_size_frames * config.channels as usize, 8);
        Arc::new(Self {
            config,
            buffer_size_frames,
            registry,
            synchronizer,
            events,
            pool,
            source_ids: RwLock::new(Vec::new()),
            master_chain: Mutex::new(EffectChain::new()),
            master_volume_bits: AtomicU32::new(1.0f32.to_bits()),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SharedStats::new()),
            pump: Mutex::new(None),
        })
    }

    pub fn add_source(&self, id: SourceId) {
        let mut ids = self.source_ids.write();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn remove_source(&self, id: SourceId) {
        self.source_ids.write().retain(|existing| *existing != id);
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume_bits
            .store(volume.clamp(0.0, 2.0).to_bits(), Ordering::Relaxed);
    }

    pub fn add_master_effect(&self, processor: Box<dyn crate::effects::EffectProcessor>) {
        self.master_chain.lock().add(processor, &self.config);
    }

    pub fn remove_master_effect(&self, id: uuid::Uuid) -> bool {
        self.master_chain.lock().remove(id)
    }

    pub fn stats(&self) -> MixerStats {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the pump thread, writing mixed output into `sink`.
    pub fn start(self: &Arc<Self>, sink: RingProducer) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mixer = Arc::clone(self);
        let handle = std::thread::spawn(move || mixer.pump_loop(sink));
        *self.pump.lock() = Some(handle);
    }

    /// Signal the pump thread to exit and join it, up to a bounded timeout.
    /// A pump thread that doesn't notice within the timeout is abandoned —
    /// std threads can't be force-killed, so this is best-effort.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.lock().take() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            std::thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(Duration::from_secs(2)).is_err() {
                warn!("mixer pump thread did not join within 2s");
            }
        }
    }

    fn pump_loop(self: Arc<Self>, mut sink: RingProducer) {
        let channels = self.config.channels as usize;
        let master_len = self.buffer_size_frames * channels;
        let mut buffers_since_drift_check = 0u64;
        let period = Duration::from_secs_f64(
            self.buffer_size_frames as f64 / self.config.sample_rate as f64,
        );
        // Reused every period instead of cloning a fresh `Vec` off the
        // source list: steady-state mixing allocates nothing past the
        // first period, same as the pool-rented buffers below.
        let mut ids: Vec<SourceId> = Vec::new();

        while self.running.load(Ordering::Relaxed) {
            let start = std::time::Instant::now();
            let mut master = self.pool.rent();

            ids.clear();
            ids.extend_from_slice(&self.source_ids.read());
            for id in ids.iter().copied() {
                let Some(handle) = self.registry.get(id) else {
                    continue;
                };
                let mut scratch = self.pool.rent();
                let read = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handle.lock().read_samples(&mut scratch, self.buffer_size_frames)
                }));
                match read {
                    Ok(_frames) => {
                        for i in 0..master_len {
                            master[i] += scratch[i];
                        }
                    }
                    Err(_) => {
                        error!(source_id = %id, "source panicked during read_samples; marking Error and dropping");
                        self.source_ids.write().retain(|existing| *existing != id);
                        self.events.publish(Event::AudioError {
                            message: format!("source {id} failed during read and was removed"),
                            timestamp: std::time::SystemTime::now(),
                        });
                    }
                }
            }

            self.synchronizer
                .advance_master_position(self.buffer_size_frames as i64);

            self.master_chain.lock().process(&mut master, self.buffer_size_frames);

            let volume = self.master_volume();
            for s in master.iter_mut() {
                *s *= volume;
            }

            self.update_peaks(&master, channels);

            // Backpressure: the sink ring buffer not draining fast enough is
            // the one permitted blocking point on this thread.
            let backpressure_deadline = std::time::Instant::now() + SINK_BACKPRESSURE_TIMEOUT;
            let mut offset = sink.write(&master);
            while offset < master.len() && std::time::Instant::now() < backpressure_deadline {
                std::thread::sleep(SINK_BACKPRESSURE_BACKOFF);
                offset += sink.write(&master[offset..]);
            }
            if offset < master.len() {
                self.stats.total_underruns.fetch_add(1, Ordering::Relaxed);
            }

            self.stats
                .total_frames_mixed
                .fetch_add(self.buffer_size_frames as u64, Ordering::Relaxed);

            buffers_since_drift_check += 1;
            if buffers_since_drift_check >= DRIFT_CHECK_PERIOD_BUFFERS {
                buffers_since_drift_check = 0;
                if self.synchronizer.auto_drift_correction_enabled() {
                    self.synchronizer
                        .check_and_resync_all_groups(DEFAULT_DRIFT_TOLERANCE_FRAMES);
                }
            }

            let elapsed = start.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
        debug!("mixer pump thread exiting");
    }

    fn update_peaks(&self, master: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let mut peak_l = 0.0f32;
        let mut peak_r = 0.0f32;
        for frame in master.chunks_exact(channels) {
            peak_l = peak_l.max(frame[0].abs());
            if channels > 1 {
                peak_r = peak_r.max(frame[1].abs());
            }
        }
        let prev_l = f32::from_bits(self.stats.peak_left_bits.load(Ordering::Relaxed));
        let prev_r = f32::from_bits(self.stats.peak_right_bits.load(Ordering::Relaxed));
        let new_l = (prev_l * PEAK_DECAY).max(peak_l);
        let new_r = (prev_r * PEAK_DECAY).max(if channels > 1 { peak_r } else { new_l });
        self.stats
            .peak_left_bits
            .store(new_l.to_bits(), Ordering::Relaxed);
        self.stats
            .peak_right_bits
            .store(new_r.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::SampleRingBuffer;
    use crate::source::{Source, Synchronizable};

    struct ConstantSource {
        id: SourceId,
        config: AudioConfig,
        value: f32,
        volume: f32,
        position: i64,
        gate_open: bool,
    }

    impl ConstantSource {
        fn new(config: AudioConfig, value: f32) -> Self {
            Self {
                id: SourceId::new_v4(),
                config,
                value,
                volume: 1.0,
                position: 0,
                gate_open: true,
            }
        }
    }

    impl Source for ConstantSource {
        fn id(&self) -> SourceId {
            self.id
        }
        fn read_samples(&mut self, buf: &mut [f32], frame_count: usize) -> usize {
            if !self.gate_open {
                buf.iter_mut().for_each(|s| *s = 0.0);
                return frame_count;
            }
            buf.iter_mut().for_each(|s| *s = self.value * self.volume);
            self.position += frame_count as i64;
            frame_count
        }
        fn seek(&mut self, _: f64) -> bool {
            true
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn stop(&mut self) {}
        fn state(&self) -> SourceState {
            SourceState::Playing
        }
        fn position_seconds(&self) -> f64 {
            self.position as f64 / self.config.sample_rate as f64
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
        fn set_tempo(&mut self, _: f32) {}
        fn pitch_semitones(&self) -> f32 {
            0.0
        }
        fn set_pitch_semitones(&mut self, _: f32) {}
    }

    impl Synchronizable for ConstantSource {
        fn set_sync_gate(&mut self, open: bool) {
            self.gate_open = open;
        }
        fn sync_gate_is_open(&self) -> bool {
            self.gate_open
        }
        fn sample_position(&self) -> i64 {
            self.position
        }
        fn resync_to(&mut self, target_frame: i64) {
            self.position = target_frame;
        }
        fn buffered_frames(&self) -> usize {
            usize::MAX
        }
    }

    fn test_setup() -> (Arc<SourceRegistry>, Arc<Synchronizer>, Arc<EventBus>, AudioConfig) {
        let config = AudioConfig::default_stereo_output();
        let registry = SourceRegistry::new();
        let events = Arc::new(EventBus::new());
        let synchronizer = Synchronizer::new(Arc::clone(&registry), Arc::clone(&events));
        (registry, synchronizer, events, config)
    }

    #[test]
    fn two_opposite_constant_sources_cancel_to_silence() {
        let (registry, synchronizer, events, config) = test_setup();
        let a = ConstantSource::new(config.clone(), 1.0);
        let b = ConstantSource::new(config.clone(), -1.0);
        let id_a = a.id();
        let id_b = b.id();
        registry.insert(id_a, Arc::new(Mutex::new(a)));
        registry.insert(id_b, Arc::new(Mutex::new(b)));

        let mixer = Mixer::new(config.clone(), 16, registry, synchronizer, events);
        mixer.add_source(id_a);
        mixer.add_source(id_b);

        let ring = SampleRingBuffer::new(16 * config.channels as usize);
        let (producer, mut consumer) = ring.split();
        mixer.start(producer);
        std::thread::sleep(Duration::from_millis(50));
        mixer.stop();

        let mut out = vec![0.0f32; 16 * config.channels as usize];
        consumer.read(&mut out);
        assert!(out.iter().all(|&s| s.abs() < 1e-5));
    }

    #[test]
    fn master_volume_scales_output() {
        let (registry, synchronizer, events, config) = test_setup();
        let a = ConstantSource::new(config.clone(), 1.0);
        let id_a = a.id();
        registry.insert(id_a, Arc::new(Mutex::new(a)));

        let mixer = Mixer::new(config.clone(), 16, registry, synchronizer, events);
        mixer.add_source(id_a);
        mixer.set_master_volume(0.5);

        let ring = SampleRingBuffer::new(16 * config.channels as usize);
        let (producer, mut consumer) = ring.split();
        mixer.start(producer);
        std::thread::sleep(Duration::from_millis(50));
        mixer.stop();

        let mut out = vec![0.0f32; 16 * config.channels as usize];
        consumer.read(&mut out);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-5));
    }

    #[test]
    fn remove_source_stops_contributing() {
        let (registry, synchronizer, events, config) = test_setup();
        let a = ConstantSource::new(config.clone(), 1.0);
        let id_a = a.id();
        registry.insert(id_a, Arc::new(Mutex::new(a)));

        let mixer = Mixer::new(config.clone(), 16, registry, synchronizer, events);
        mixer.add_source(id_a);
        mixer.remove_source(id_a);
        assert!(mixer.source_ids.read().is_empty());
    }
}
