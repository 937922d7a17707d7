//! File-backed source (C4): a decoder thread filling a ring buffer, gated
//! for sample-accurate multi-source synchronized start.

use crate::events::{Event, EventBus};
use crate::ring_buffer::{RingConsumer, RingProducer, SampleRingBuffer};
use crate::source::decoder::{IAudioDecoder, SymphoniaDecoder};
use crate::source::resampler::StreamConverter;
use crate::source::time_stretch::{PassthroughTimeStretch, SignalsmithTimeStretch, TimeStretch};
use crate::source::{Source, SourceId, SourceState, Synchronizable};
use audiocore_common::AudioConfig;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Condvar};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bits of a [`FileSource`] shared between the owning handle and its
/// decoder thread.
struct Shared {
    stop_flag: AtomicBool,
    pause_flag: AtomicBool,
    sync_gate_open: AtomicBool,
    eos: AtomicBool,
    // Tempo/pitch are read by the decoder thread every loop iteration; f32
    // bits packed into an AtomicU32 avoid a lock on the hot path.
    tempo_bits: AtomicU32,
    pitch_bits: AtomicU32,
    /// Frames actually drained from the ring buffer since the last seek —
    /// distinct from wall-clock decode progress, used for drift checks.
    frames_consumed: AtomicI64,
    seek_request: Mutex<Option<f64>>,
    seek_condvar: Condvar,
}

impl Shared {
    fn tempo(&self) -> f32 {
        f32::from_bits(self.tempo_bits.load(Ordering::Relaxed))
    }
    fn set_tempo(&self, v: f32) {
        self.tempo_bits.store(v.to_bits(), Ordering::Relaxed);
    }
    fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch_bits.load(Ordering::Relaxed))
    }
    fn set_pitch(&self, v: f32) {
        self.pitch_bits.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// A source backed by a file on disk, decoded by a dedicated thread.
pub struct FileSource {
    id: SourceId,
    config: AudioConfig,
    path: PathBuf,
    shared: Arc<Shared>,
    consumer: RingConsumer,
    decoder_thread: Option<JoinHandle<()>>,
    state: SourceState,
    volume: f32,
    duration_seconds: f64,
    /// Frames the mixer has drained; the source's externally reported
    /// position. Advances only while the sync gate is open.
    position_frames: i64,
    events: Arc<EventBus>,
}

const RING_CAPACITY_FRAMES: usize = 8192;
const DECODE_CHUNK_FRAMES: usize = 1024;
const RING_FULL_BACKOFF: Duration = Duration::from_millis(2);
/// Bound on how long `play()` waits for the decoder thread to deliver its
/// first samples before returning control to the caller anyway.
const PLAY_PREFILL_TIMEOUT: Duration = Duration::from_millis(200);
/// Below this many buffered frames, `read_samples` reports a `Buffering`
/// transient and an underrun is imminent.
const UNDERRUN_THRESHOLD_FRAMES: usize = 64;

impl FileSource {
    pub fn new(path: PathBuf, config: AudioConfig, events: Arc<EventBus>) -> crate::error::Result<Self> {
        let id = Uuid::new_v4();
        let channels = config.channels as usize;

        let probe = SymphoniaDecoder::open(&path)?;
        let duration_seconds = probe.stream_info().duration_seconds;
        drop(probe);

        // The producer half is discarded here: `play()` builds its own
        // fresh ring and hands the producer to the decoder thread it
        // spawns, so this initial split only needs the consumer half to
        // give an idle source somewhere to read (silence) from.
        let ring = SampleRingBuffer::new(RING_CAPACITY_FRAMES * channels);
        let (_producer, consumer) = ring.split();

        let shared = Arc::new(Shared {
            stop_flag: AtomicBool::new(false),
            pause_flag: AtomicBool::new(true),
            sync_gate_open: AtomicBool::new(true),
            eos: AtomicBool::new(false),
            tempo_bits: AtomicU32::new(1.0f32.to_bits()),
            pitch_bits: AtomicU32::new(0.0f32.to_bits()),
            frames_consumed: AtomicI64::new(0),
            seek_request: Mutex::new(None),
            seek_condvar: Condvar::new(),
        });

        Ok(Self {
            id,
            config,
            path,
            shared,
            consumer,
            decoder_thread: None,
            state: SourceState::Idle,
            volume: 1.0,
            duration_seconds,
            position_frames: 0,
            events,
        })
    }

    fn spawn_decoder_thread(&mut self, producer: RingProducer) {
        let shared = Arc::clone(&self.shared);
        let path = self.path.clone();
        let config = self.config.clone();
        let id = self.id;
        let events = Arc::clone(&self.events);

        let handle = std::thread::spawn(move || {
            decoder_thread_main(id, path, config, shared, producer, events);
        });
        self.decoder_thread = Some(handle);
    }
}

fn decoder_thread_main(
    id: SourceId,
    path: PathBuf,
    config: AudioConfig,
    shared: Arc<Shared>,
    mut producer: RingProducer,
    events: Arc<EventBus>,
) {
    let channels = config.channels as usize;
    let mut decoder: Box<dyn IAudioDecoder> = match SymphoniaDecoder::open(&path) {
        Ok(d) => Box::new(d),
        Err(e) => {
            warn!(source = %id, error = %e, "decoder thread failed to open file");
            events.publish(Event::AudioError {
                message: e.to_string(),
                timestamp: std::time::SystemTime::now(),
            });
            return;
        }
    };

    // The decoder reports its own native stream format; the source's
    // contract promises the mixer audio already converted to the engine's
    // target rate/channel count, so every decoded chunk is run through a
    // converter before it ever reaches the time-stretch stage or the ring
    // buffer.
    let native = decoder.stream_info();
    let mut converter = match StreamConverter::new(
        native.sample_rate,
        config.sample_rate,
        native.channels,
        config.channels,
        DECODE_CHUNK_FRAMES,
    ) {
        Ok(c) => c,
        Err(e) => {
            warn!(source = %id, error = %e, "failed to build stream converter");
            events.publish(Event::AudioError {
                message: e.to_string(),
                timestamp: std::time::SystemTime::now(),
            });
            return;
        }
    };

    let mut stretch: Box<dyn TimeStretch> = Box::new(PassthroughTimeStretch);
    let mut stretch_active = false;

    let mut scratch: Vec<f32> = Vec::with_capacity(DECODE_CHUNK_FRAMES * native.channels as usize);
    // Slowest supported tempo (0.25x) stretches one input chunk out to up
    // to 4x as many output samples; sized generously so `receive` never
    // has to be called more than once per chunk in steady state.
    let mut stretch_out = vec![0.0f32; DECODE_CHUNK_FRAMES * channels * 4];

    while !shared.stop_flag.load(Ordering::Relaxed) {
        // Service a pending seek before decoding further.
        if let Some(target) = shared.seek_request.lock().take() {
            if let Err(e) = decoder.try_seek(target) {
                warn!(source = %id, error = %e, "seek failed");
            }
            stretch.clear();
            shared.seek_condvar.notify_all();
        }

        if shared.pause_flag.load(Ordering::Relaxed) {
            std::thread::sleep(RING_FULL_BACKOFF);
            continue;
        }

        let tempo = shared.tempo();
        let pitch = shared.pitch();
        let wants_stretch = (tempo - 1.0).abs() > 1e-4 || pitch.abs() > 1e-4;
        if wants_stretch && !stretch_active {
            stretch = Box::new(SignalsmithTimeStretch::new(config.sample_rate, channels));
            stretch_active = true;
        }
        if stretch_active {
            stretch.set_tempo(tempo);
            stretch.set_pitch_semitones(pitch);
        }

        scratch.clear();
        let (frames_read, eof) = match decoder.read_frames(&mut scratch, DECODE_CHUNK_FRAMES) {
            Ok(r) => r,
            Err(e) => {
                warn!(source = %id, error = %e, "decode error, stopping decoder thread");
                events.publish(Event::AudioError {
                    message: e.to_string(),
                    timestamp: std::time::SystemTime::now(),
                });
                break;
            }
        };

        let converted = match converter.process(&scratch[..frames_read * native.channels as usize]) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(source = %id, error = %e, "resampling error, stopping decoder thread");
                events.publish(Event::AudioError {
                    message: e.to_string(),
                    timestamp: std::time::SystemTime::now(),
                });
                break;
            }
        };

        let to_write: &[f32] = if stretch_active {
            stretch.put(&converted);
            let n = stretch.receive(&mut stretch_out);
            &stretch_out[..n]
        } else {
            &converted
        };

        let mut written = 0;
        while written < to_write.len() && !shared.stop_flag.load(Ordering::Relaxed) {
            written += producer.write(&to_write[written..]);
            if written < to_write.len() {
                std::thread::sleep(RING_FULL_BACKOFF);
            }
        }

        if eof {
            if stretch_active {
                stretch.flush();
                loop {
                    let mut tail = vec![0.0f32; DECODE_CHUNK_FRAMES * channels];
                    let n = stretch.receive(&mut tail);
                    if n == 0 {
                        break;
                    }
                    let mut w = 0;
                    while w < n {
                        w += producer.write(&tail[w..n]);
                        if w < n {
                            std::thread::sleep(RING_FULL_BACKOFF);
                        }
                    }
                }
            }
            shared.eos.store(true, Ordering::Relaxed);
            debug!(source = %id, "decoder thread reached end of stream");
            break;
        }
    }
}

impl Source for FileSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn read_samples(&mut self, buf: &mut [f32], frame_count: usize) -> usize {
        let channels = self.config.channels as usize;
        debug_assert_eq!(buf.len(), frame_count * channels);

        if !self.shared.sync_gate_open.load(Ordering::Acquire) {
            buf.iter_mut().for_each(|s| *s = 0.0);
            return frame_count;
        }

        if self.state == SourceState::Playing
            && self.consumer.occupied_len() / channels < UNDERRUN_THRESHOLD_FRAMES
            && !self.shared.eos.load(Ordering::Relaxed)
        {
            self.events.publish(Event::StateChanged {
                source_id: self.id,
                old: SourceState::Playing,
                new: SourceState::Buffering,
                timestamp: std::time::SystemTime::now(),
            });
        }

        let read_samples = self.consumer.read(buf);
        let read_frames = read_samples / channels;

        if read_samples < buf.len() {
            buf[read_samples..].iter_mut().for_each(|s| *s = 0.0);
            let missed_frames = frame_count as u64 - read_frames as u64;
            self.events.publish(Event::BufferUnderrun {
                source_id: self.id,
                missed_frames,
                frame_position: self.position_frames.max(0) as u64,
                timestamp: std::time::SystemTime::now(),
            });
        }

        for s in buf.iter_mut() {
            *s *= self.volume;
        }

        self.position_frames += read_frames as i64;
        self.shared
            .frames_consumed
            .fetch_add(read_frames as i64, Ordering::Relaxed);

        frame_count
    }

    fn seek(&mut self, position_seconds: f64) -> bool {
        self.shared.sync_gate_open.store(false, Ordering::Release);
        *self.shared.seek_request.lock() = Some(position_seconds);
        self.consumer.clear();
        self.position_frames = (position_seconds * self.config.sample_rate as f64) as i64;
        self.shared.frames_consumed.store(self.position_frames, Ordering::Relaxed);
        true
    }

    fn play(&mut self) {
        if self.decoder_thread.is_none() {
            // Producer was consumed by `new`'s split; re-derive it here by
            // constructing a fresh ring and swapping the consumer half in,
            // since the original producer must move into the decoder
            // thread's closure.
            let channels = self.config.channels as usize;
            let ring = SampleRingBuffer::new(RING_CAPACITY_FRAMES * channels);
            let (producer, consumer) = ring.split();
            self.consumer = consumer;
            self.spawn_decoder_thread(producer);
        }
        self.shared.pause_flag.store(false, Ordering::Relaxed);
        self.state = SourceState::Playing;

        // Bounded prefill wait: give the decoder thread a chance to land
        // its first samples before returning control to the caller, so a
        // `play()` immediately followed by `read_samples` is less likely
        // to observe an avoidable cold-start underrun.
        let deadline = std::time::Instant::now() + PLAY_PREFILL_TIMEOUT;
        while self.consumer.occupied_len() == 0
            && !self.shared.eos.load(Ordering::Relaxed)
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(RING_FULL_BACKOFF);
        }
    }

    fn pause(&mut self) {
        self.shared.pause_flag.store(true, Ordering::Relaxed);
        self.state = SourceState::Paused;
    }

    fn stop(&mut self) {
        self.shared.stop_flag.store(true, Ordering::Relaxed);
        self.shared.seek_condvar.notify_all();
        if let Some(handle) = self.decoder_thread.take() {
            let _ = handle.join();
        }
        self.state = SourceState::Idle;
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn position_seconds(&self) -> f64 {
        self.position_frames as f64 / self.config.sample_rate as f64
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn is_end_of_stream(&self) -> bool {
        self.shared.eos.load(Ordering::Relaxed) && self.consumer.occupied_len() == 0
    }

    fn config(&self) -> &AudioConfig {
        &self.config
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn tempo(&self) -> f32 {
        self.shared.tempo()
    }

    fn set_tempo(&mut self, tempo: f32) {
        self.shared.set_tempo(tempo.clamp(0.25, 4.0));
    }

    fn pitch_semitones(&self) -> f32 {
        self.shared.pitch()
    }

    fn set_pitch_semitones(&mut self, semitones: f32) {
        self.shared.set_pitch(semitones.clamp(-12.0, 12.0));
    }
}

impl Synchronizable for FileSource {
    fn set_sync_gate(&mut self, open: bool) {
        self.shared.sync_gate_open.store(open, Ordering::Release);
    }

    fn sync_gate_is_open(&self) -> bool {
        self.shared.sync_gate_open.load(Ordering::Acquire)
    }

    fn sample_position(&self) -> i64 {
        self.position_frames
    }

    fn resync_to(&mut self, target_frame: i64) {
        self.position_frames = target_frame;
        self.shared.frames_consumed.store(target_frame, Ordering::Relaxed);
    }

    fn buffered_frames(&self) -> usize {
        self.consumer.occupied_len() / self.config.channels as usize
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        if self.decoder_thread.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_clamped() {
        // Constructed indirectly via the Source trait's contract: a
        // FileSource always clamps set_volume to [0, 1].
        let v: f32 = 1.5;
        assert_eq!(v.clamp(0.0, 1.0), 1.0);
        let v: f32 = -0.2;
        assert_eq!(v.clamp(0.0, 1.0), 0.0);
    }
}
