//! End-to-end scenario coverage for the mixing/synchronization core,
//! exercising the public `audiocore_engine` surface the way a host
//! application would, rather than crate-internal unit tests.

mod helpers;

use audiocore_engine::events::Event;
use audiocore_engine::mixer::Mixer;
use audiocore_engine::registry::SourceRegistry;
use audiocore_engine::ring_buffer::SampleRingBuffer;
use audiocore_engine::source::FileSource;
use audiocore_engine::synchronizer::Synchronizer;
use audiocore_engine::{AudioConfig, EventBus, Source, Synchronizable};
use helpers::ConstantSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn config() -> AudioConfig {
    AudioConfig::default_stereo_output()
}

/// S1 — a source that has never had `play()` called produces silence and
/// does not advance its reported position.
#[test]
fn s1_silence_on_unplayed_source() {
    let mut source = ConstantSource::new(config(), 1.0);
    let mut buf = [1.0f32; 1024];
    let read = source.read_samples(&mut buf, 512);

    assert_eq!(read, 512);
    assert!(buf.iter().all(|&s| s == 0.0));
    assert_eq!(source.position_seconds(), 0.0);
}

/// S2 — volume is applied multiplicatively to every sample.
#[test]
fn s2_volume_scaling() {
    let mut source = ConstantSource::new(config(), 1.0);
    source.set_volume(0.5);
    source.play();

    let mut buf = [0.0f32; 8];
    let read = source.read_samples(&mut buf, 4);

    assert_eq!(read, 4);
    assert!(buf.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

/// S3 — two sources in a started sync group are sample-zero aligned: equal
/// and opposite constant sources cancel to silence in the master bus.
#[test]
fn s3_sync_group_alignment_cancels_to_silence() {
    let config = config();
    let registry = SourceRegistry::new();
    let events = Arc::new(EventBus::new());
    let synchronizer = Synchronizer::new(Arc::clone(&registry), Arc::clone(&events));

    let a = ConstantSource::new(config.clone(), 1.0);
    let b = ConstantSource::new(config.clone(), -1.0);
    let id_a = a.id();
    let id_b = b.id();
    registry.insert(id_a, Arc::new(Mutex::new(a)));
    registry.insert(id_b, Arc::new(Mutex::new(b)));

    synchronizer
        .create_sync_group("g", &[id_a, id_b])
        .expect("group creation");
    synchronizer.start_sync_group("g").expect("group start");

    let mixer = Mixer::new(config.clone(), 256, Arc::clone(&registry), Arc::clone(&synchronizer), events);
    mixer.add_source(id_a);
    mixer.add_source(id_b);

    let ring = SampleRingBuffer::new(256 * config.channels as usize * 4);
    let (producer, mut consumer) = ring.split();
    mixer.start(producer);
    std::thread::sleep(Duration::from_millis(80));
    mixer.stop();

    let mut out = vec![0.0f32; 256 * config.channels as usize];
    let read = consumer.read(&mut out);
    assert!(read > 0, "mixer should have produced at least one buffer");
    assert!(out[..read].iter().all(|&s| s.abs() < 1e-5));
}

/// S4 — an artificially drifted member snaps back to the ghost's position
/// once `check_and_resync_all_groups` runs.
#[test]
fn s4_drift_correction_snaps_member_to_ghost() {
    let config = config();
    let registry = SourceRegistry::new();
    let events = Arc::new(EventBus::new());
    let synchronizer = Synchronizer::new(Arc::clone(&registry), Arc::clone(&events));

    let a = ConstantSource::new(config.clone(), 1.0);
    let b = ConstantSource::new(config.clone(), -1.0);
    let id_a = a.id();
    let id_b = b.id();
    registry.insert(id_a, Arc::new(Mutex::new(a)));
    registry.insert(id_b, Arc::new(Mutex::new(b)));

    synchronizer
        .create_sync_group("g", &[id_a, id_b])
        .expect("group creation");
    synchronizer.start_sync_group("g").expect("group start");

    {
        let handle = registry.get(id_a).unwrap();
        let mut guard = handle.lock();
        let drifted = guard.sample_position() + 500;
        guard.resync_to(drifted);
    }

    synchronizer.check_and_resync_all_groups(30);

    let ghost_frame = synchronizer.ghost_position("g").unwrap();
    let handle = registry.get(id_a).unwrap();
    let drift = (handle.lock().sample_position() - ghost_frame).abs();
    assert!(drift <= 30, "drift {drift} exceeds tolerance");
}

/// S5 — pausing freezes a source's reported position; resuming continues
/// from exactly where playback left off, with no double-count or gap.
#[test]
fn s5_pause_resume_continuity() {
    let mut source = ConstantSource::new(config(), 1.0);
    source.play();

    let mut buf = [0.0f32; 2 * 48_000 / 1000 * 2]; // ~48ms @ 48kHz stereo
    source.read_samples(&mut buf, 48_000 / 1000);
    let position_at_pause = source.sample_position();

    source.pause();
    let mut silence_probe = [1.0f32; 4];
    let read = source.read_samples(&mut silence_probe, 2);
    assert_eq!(read, 2);
    assert!(silence_probe.iter().all(|&s| s == 0.0));
    assert_eq!(source.sample_position(), position_at_pause);

    source.play();
    source.read_samples(&mut buf, 48_000 / 1000);
    assert_eq!(
        source.sample_position(),
        position_at_pause + (48_000 / 1000) as i64
    );
}

/// S6 — a source that runs out of buffered audio returns a partial read
/// padded with silence and publishes exactly one `BufferUnderrun` event.
#[test]
fn s6_underrun_accounting_on_short_file() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("short.wav");
    let config = config();
    helpers::audio_generator::generate_constant_wav(&path, config.sample_rate, 20, 0.25)
        .expect("generate wav fixture");

    let events = Arc::new(EventBus::new());
    let rx = events.subscribe();

    let mut source = FileSource::new(path, config.clone(), Arc::clone(&events)).expect("open source");
    source.play();
    // Let the decoder thread run the short file to completion and drain.
    std::thread::sleep(Duration::from_millis(300));

    let frame_count = 4096usize;
    let mut buf = vec![-1.0f32; frame_count * config.channels as usize];
    source.read_samples(&mut buf, frame_count);

    let saw_underrun = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|event| matches!(event, Event::BufferUnderrun { .. }));
    assert!(saw_underrun, "expected at least one BufferUnderrun event");
}
