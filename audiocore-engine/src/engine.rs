//! Engine wrapper (C8): the public facade and the caller/platform thread
//! decoupler.
//!
//! The platform audio API's own submit/receive calls can block for
//! milliseconds at a time (device lock acquisition, buffer-full waits).
//! Nothing in this crate's public surface may carry that latency onto a
//! caller's thread, so every control entry point either completes fast or
//! is explicitly bounded (`initialize`, `stop`). The mixer pump thread and
//! the platform callback thread already provide the decoupling described in
//! Design §4.8 for output; this wrapper is what a host application
//! actually constructs and holds onto.

use crate::effects::EffectProcessor;
use crate::error::{DeviceError, Error, Result};
use crate::events::{Event, EventBus};
use crate::mixer::{Mixer, MixerStats};
use crate::registry::SourceRegistry;
use crate::ring_buffer::SampleRingBuffer;
use crate::sink::CpalSink;
use crate::source::{FileSource, SourceHandle, SourceId};
use crate::synchronizer::Synchronizer;
use audiocore_common::AudioConfig;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Capacity of the sink ring buffer sitting between the mixer pump and the
/// platform callback, in samples.
const SINK_RING_CAPACITY_SAMPLES: usize = 8192;

/// Hard bound on `initialize` on Linux, where ALSA/PulseAudio device
/// negotiation is the slowest of the supported platforms.
#[cfg(target_os = "linux")]
const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(5);
#[cfg(not(target_os = "linux"))]
const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(2);

/// Top-level handle a host application constructs: owns the registry,
/// synchronizer, mixer, and (once initialized) the platform sink.
pub struct Engine {
    config: AudioConfig,
    registry: Arc<SourceRegistry>,
    synchronizer: Arc<Synchronizer>,
    events: Arc<EventBus>,
    mixer: Arc<Mixer>,
    sink: Mutex<Option<CpalSink>>,
    running: AtomicBool,
}

impl Engine {
    /// Validate `config`, wire up the registry/synchronizer/mixer, and open
    /// (but do not yet start) the platform output device. Bounded by
    /// [`INITIALIZE_TIMEOUT`] — a device negotiation that hangs past this
    /// is reported as a fatal [`DeviceError`] rather than left to hang the
    /// caller's thread.
    pub fn initialize(config: AudioConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let registry = SourceRegistry::new();
        let events = Arc::new(EventBus::new());
        let synchronizer = Synchronizer::new(Arc::clone(&registry), Arc::clone(&events));
        let mixer = Mixer::new(
            config.clone(),
            config.buffer_size_frames as usize,
            Arc::clone(&registry),
            Arc::clone(&synchronizer),
            Arc::clone(&events),
        );

        let sink = if config.enable_output {
            let device_name = config.output_device.clone();
            let (tx, rx): (_, Receiver<Result<CpalSink>>) = crossbeam_channel::bounded(1);
            let sample_rate = config.sample_rate;
            let channels = config.channels as u16;
            std::thread::spawn(move || {
                let result =
                    CpalSink::open(device_name.as_deref(), sample_rate, channels);
                let _ = tx.send(result);
            });
            match rx.recv_timeout(INITIALIZE_TIMEOUT) {
                Ok(Ok(sink)) => Some(sink),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(Error::Device(DeviceError::StreamOpenFailed {
                        reason: format!(
                            "device initialization exceeded {INITIALIZE_TIMEOUT:?}"
                        ),
                    }))
                }
            }
        } else {
            None
        };

        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            output = config.enable_output,
            "audio engine initialized"
        );

        Ok(Arc::new(Self {
            config,
            registry,
            synchronizer,
            events,
            mixer,
            sink: Mutex::new(sink),
            running: AtomicBool::new(false),
        }))
    }

    /// Start the mixer pump and, if output is enabled, the platform stream.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let ring = SampleRingBuffer::new(SINK_RING_CAPACITY_SAMPLES);
        let (producer, consumer) = ring.split();
        self.mixer.start(producer);

        if let Some(sink) = self.sink.lock().as_mut() {
            sink.start(Arc::new(Mutex::new(consumer)))?;
        }

        Ok(())
    }

    /// Stop the mixer pump (bounded 2s join) and the platform stream.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.mixer.stop();
        if let Some(sink) = self.sink.lock().as_mut() {
            sink.stop()?;
        }
        Ok(())
    }

    /// Stop and release the platform device. After this call the engine
    /// must be re-initialized to play again.
    pub fn dispose(&self) -> Result<()> {
        self.stop()?;
        *self.sink.lock() = None;
        Ok(())
    }

    pub fn subscribe_events(&self) -> crossbeam_channel::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn mixer_stats(&self) -> MixerStats {
        self.mixer.stats()
    }

    pub fn master_volume(&self) -> f32 {
        self.mixer.master_volume()
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.mixer.set_master_volume(volume);
    }

    pub fn add_master_effect(&self, processor: Box<dyn EffectProcessor>) {
        self.mixer.add_master_effect(processor);
    }

    pub fn remove_master_effect(&self, id: Uuid) -> bool {
        self.mixer.remove_master_effect(id)
    }

    /// Open a file-backed source, register it, and add it to the mixer.
    /// Returns the new source's id for later control (play/seek/sync).
    pub fn add_file_source(&self, path: &Path) -> Result<SourceId> {
        let source = FileSource::new(path.to_path_buf(), self.config.clone(), Arc::clone(&self.events))?;
        let id = source.id();
        let handle: Arc<Mutex<dyn SourceHandle>> = Arc::new(Mutex::new(source));
        self.registry.insert(id, handle);
        self.mixer.add_source(id);
        Ok(id)
    }

    pub fn remove_source(&self, id: SourceId) {
        self.mixer.remove_source(id);
        self.registry.remove(id);
    }

    pub fn source(&self, id: SourceId) -> Option<Arc<Mutex<dyn SourceHandle>>> {
        self.registry.get(id)
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("error disposing engine on drop: {e}");
        }
    }
}
