//! Central source registry.
//!
//! The mixer and synchronizer both need to reach a source, but neither owns
//! the other: the mixer reads samples every period, the synchronizer issues
//! occasional gate/resync/tempo commands. Rather than have either hold a
//! direct reference to (or callback into) the other — the cyclic-reference
//! shape the reference stack uses runtime type tests and shared mutable
//! graphs to manage — both hold a handle to this registry and resolve an
//! opaque [`SourceId`] to a shared handle on demand. Grounded in the
//! teacher's own avoidance of owning-reference cycles between its queue
//! manager and buffer manager, both of which key a shared map by `Uuid`
//! rather than referencing each other directly.

use crate::source::{SourceHandle, SourceId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// `SourceId -> Arc<Mutex<dyn SourceHandle>>` map, shared by the mixer and
/// synchronizer. The per-source `Mutex` is held only for the duration of a
/// single trait-method call (a `read_samples`, a `seek`, a gate toggle) —
/// never across a blocking operation — so contention between the mixer's
/// hot path and the synchronizer's occasional structural calls stays low.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<SourceId, Arc<Mutex<dyn SourceHandle>>>>,
}

impl SourceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sources: RwLock::new(HashMap::new()),
        })
    }

    /// Register a source, returning its id for later lookup.
    pub fn insert(&self, id: SourceId, source: Arc<Mutex<dyn SourceHandle>>) {
        self.sources.write().insert(id, source);
    }

    /// Resolve an id to its shared handle, if still registered.
    pub fn get(&self, id: SourceId) -> Option<Arc<Mutex<dyn SourceHandle>>> {
        self.sources.read().get(&id).cloned()
    }

    /// Drop a source from the registry. The handle itself stays alive as
    /// long as some other `Arc` (e.g. a mixer snapshot in flight) holds it.
    pub fn remove(&self, id: SourceId) -> bool {
        self.sources.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.read().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Source, SourceState, Synchronizable};
    use audiocore_common::AudioConfig;

    struct Silent(SourceId, AudioConfig);
    impl Source for Silent {
        fn id(&self) -> SourceId {
            self.0
        }
        fn read_samples(&mut self, buf: &mut [f32], frame_count: usize) -> usize {
            buf.iter_mut().for_each(|s| *s = 0.0);
            frame_count
        }
        fn seek(&mut self, _: f64) -> bool {
            true
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn stop(&mut self) {}
        fn state(&self) -> SourceState {
            SourceState::Idle
        }
        fn position_seconds(&self) -> f64 {
            0.0
        }
        fn duration_seconds(&self) -> f64 {
            0.0
        }
        fn is_end_of_stream(&self) -> bool {
            false
        }
        fn config(&self) -> &AudioConfig {
            &self.1
        }
        fn volume(&self) -> f32 {
            1.0
        }
        fn set_volume(&mut self, _: f32) {}
        fn tempo(&self) -> f32 {
            1.0
        }
        fn set_tempo(&mut self, _: f32) {}
        fn pitch_semitones(&self) -> f32 {
            0.0
        }
        fn set_pitch_semitones(&mut self, _: f32) {}
    }
    impl Synchronizable for Silent {
        fn set_sync_gate(&mut self, _: bool) {}
        fn sync_gate_is_open(&self) -> bool {
            true
        }
        fn sample_position(&self) -> i64 {
            0
        }
        fn resync_to(&mut self, _: i64) {}
        fn buffered_frames(&self) -> usize {
            0
        }
    }

    #[test]
    fn insert_get_remove_round_trips() {
        let registry = SourceRegistry::new();
        let id = SourceId::new_v4();
        let config = AudioConfig::default_stereo_output();
        registry.insert(id, Arc::new(Mutex::new(Silent(id, config))));

        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());

        assert!(registry.remove(id));
        assert!(!registry.contains(id));
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn get_on_unknown_id_is_none() {
        let registry = SourceRegistry::new();
        assert!(registry.get(SourceId::new_v4()).is_none());
    }
}
