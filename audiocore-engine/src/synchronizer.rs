//! Synchronizer (C6): group membership, the ghost-track master clock,
//! synchronized start/seek/pause/stop, and drift detection/correction.
//!
//! No teacher module covers N-simultaneous-source alignment directly (the
//! reference mixer is a sequential crossfade scheduler, one passage active
//! at a time). The locking discipline — one monitor lock, held only for
//! short structural sections, never across a source call that might block —
//! is grounded in the teacher's `Mixer`'s own lock discipline around its
//! `BinaryHeap<Reverse<PositionMarker>>` marker scheduling.

use crate::error::{Error, PlaybackError, Result};
use crate::events::{Event, EventBus};
use crate::registry::SourceRegistry;
use crate::source::{SourceId, SourceState};
use audiocore_common::timing::seconds_to_frames;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Total wall-clock budget for a synchronized start's pre-buffer barrier.
/// A source still not ready when this elapses is not treated as a failure —
/// its gate opens anyway and it may underrun transiently.
const SYNC_START_BARRIER_TIMEOUT: Duration = Duration::from_millis(500);

/// A silent virtual source acting as a sync group's master clock. Produces
/// nothing audible — it only exists to define "the right position" that
/// every member is compared against.
#[derive(Debug, Clone)]
struct GhostTrack {
    current_frame: i64,
    tempo: f32,
    duration_frames: i64,
    state: SourceState,
}

impl GhostTrack {
    fn new() -> Self {
        Self {
            current_frame: 0,
            tempo: 1.0,
            duration_frames: 0,
            state: SourceState::Idle,
        }
    }

    fn seek(&mut self, frame: i64) {
        self.current_frame = frame;
    }

    fn play(&mut self) {
        self.state = SourceState::Playing;
    }

    fn pause(&mut self) {
        self.state = SourceState::Paused;
    }

    fn stop(&mut self) {
        self.state = SourceState::Idle;
        self.current_frame = 0;
    }

    /// Advance the clock by `frames`, scaled by tempo, if playing.
    fn advance(&mut self, frames: i64) {
        if self.state == SourceState::Playing {
            self.current_frame += (frames as f32 * self.tempo).round() as i64;
        }
    }
}

struct GroupInfo {
    ghost: GhostTrack,
    members: Vec<SourceId>,
}

struct SynchronizerState {
    groups: HashMap<String, GroupInfo>,
    master_sample_position: i64,
}

/// Groups sources, runs their shared ghost clock, and keeps members aligned.
pub struct Synchronizer {
    registry: Arc<SourceRegistry>,
    events: Arc<EventBus>,
    state: Mutex<SynchronizerState>,
    auto_drift_correction: AtomicBool,
}

impl Synchronizer {
    pub fn new(registry: Arc<SourceRegistry>, events: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            events,
            state: Mutex::new(SynchronizerState {
                groups: HashMap::new(),
                master_sample_position: 0,
            }),
            auto_drift_correction: AtomicBool::new(false),
        })
    }

    pub fn master_sample_position(&self) -> i64 {
        self.state.lock().master_sample_position
    }

    /// Advance the global master clock and every playing group's ghost by
    /// one mixer period. Called once per buffer from the mixer pump.
    pub fn advance_master_position(&self, frames: i64) {
        let mut state = self.state.lock();
        state.master_sample_position += frames;
        for group in state.groups.values_mut() {
            group.ghost.advance(frames);
        }
    }

    fn max_member_duration_frames(&self, members: &[SourceId], sample_rate: u32) -> i64 {
        members
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .map(|src| {
                let duration = src.lock().duration_seconds();
                seconds_to_frames(duration, sample_rate) as i64
            })
            .max()
            .unwrap_or(0)
    }

    /// Create (or replace) a sync group with the given members. The ghost's
    /// length is set to the longest member's duration.
    pub fn create_sync_group(&self, group_id: &str, members: &[SourceId]) -> Result<()> {
        if members.is_empty() {
            return Err(Error::Playback(PlaybackError::EmptySyncGroup {
                group_id: group_id.to_string(),
            }));
        }

        let sample_rate = members
            .iter()
            .find_map(|id| self.registry.get(*id))
            .map(|src| src.lock().config().sample_rate)
            .unwrap_or(48_000);

        let mut ghost = GhostTrack::new();
        ghost.duration_frames = self.max_member_duration_frames(members, sample_rate);

        let mut state = self.state.lock();
        state.groups.insert(
            group_id.to_string(),
            GroupInfo {
                ghost,
                members: members.to_vec(),
            },
        );
        debug!(group_id, members = members.len(), "sync group created");
        Ok(())
    }

    /// Add a member to an existing group, resizing the ghost if necessary.
    pub fn add_member(&self, group_id: &str, source_id: SourceId) -> Result<()> {
        let sample_rate = self
            .registry
            .get(source_id)
            .map(|src| src.lock().config().sample_rate)
            .unwrap_or(48_000);

        let mut state = self.state.lock();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                group_id: group_id.to_string(),
            })?;
        if !group.members.contains(&source_id) {
            group.members.push(source_id);
        }
        let members = group.members.clone();
        drop(state);

        let duration_frames = self.max_member_duration_frames(&members, sample_rate);
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(group_id) {
            group.ghost.duration_frames = group.ghost.duration_frames.max(duration_frames);
        }
        Ok(())
    }

    /// Remove a member, recomputing the ghost's length from the remainder.
    pub fn remove_member(&self, group_id: &str, source_id: SourceId) -> Result<()> {
        let mut state = self.state.lock();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                group_id: group_id.to_string(),
            })?;
        group.members.retain(|id| *id != source_id);
        let members = group.members.clone();
        let sample_rate = members
            .first()
            .and_then(|id| self.registry.get(*id))
            .map(|src| src.lock().config().sample_rate)
            .unwrap_or(48_000);
        drop(state);

        let duration_frames = self.max_member_duration_frames(&members, sample_rate);
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(group_id) {
            group.ghost.duration_frames = duration_frames;
        }
        Ok(())
    }

    fn members_of(&self, group_id: &str) -> Result<Vec<SourceId>> {
        let state = self.state.lock();
        state
            .groups
            .get(group_id)
            .map(|g| g.members.clone())
            .ok_or_else(|| {
                Error::Playback(PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })
            })
    }

    /// Tempo cascades from the group to the ghost and every member. Members
    /// that don't support tempo (the underlying source simply ignores an
    /// out-of-effect call) are unaffected.
    pub fn set_sync_group_tempo(&self, group_id: &str, tempo: f32) -> Result<()> {
        let members = {
            let mut state = self.state.lock();
            let group = state
                .groups
                .get_mut(group_id)
                .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })?;
            group.ghost.tempo = tempo;
            group.members.clone()
        };

        for id in members {
            if let Some(src) = self.registry.get(id) {
                src.lock().set_tempo(tempo);
            }
        }
        Ok(())
    }

    /// The critical operation: bring every member of a group to sample 0 at
    /// once. Gates close, sources seek and pre-buffer in parallel under a
    /// bounded barrier, then all gates open in a tight sequential loop so
    /// the next `read_samples` call on every member emits aligned sample 0.
    pub fn start_sync_group(&self, group_id: &str) -> Result<()> {
        let members = self.members_of(group_id)?;

        {
            let mut state = self.state.lock();
            let group = state
                .groups
                .get_mut(group_id)
                .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })?;
            group.ghost.seek(0);
            group.ghost.play();
            state.master_sample_position = 0;
        }

        for id in &members {
            if let Some(src) = self.registry.get(*id) {
                let mut src = src.lock();
                src.set_sync_gate(false);
                src.seek(0.0);
                src.resync_to(0);
            }
        }

        let (tx, rx) = crossbeam_channel::bounded::<()>(members.len().max(1));
        for id in &members {
            let registry = Arc::clone(&self.registry);
            let tx = tx.clone();
            let id = *id;
            std::thread::spawn(move || {
                if let Some(src) = registry.get(id) {
                    src.lock().play();
                }
                let _ = tx.send(());
            });
        }
        drop(tx);

        let deadline = Instant::now() + SYNC_START_BARRIER_TIMEOUT;
        let mut completed = 0;
        while completed < members.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(group_id, completed, total = members.len(), "sync-start barrier timed out");
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(()) => completed += 1,
                Err(_) => break,
            }
        }

        // Tight loop, no sleeps: open every gate as close to simultaneously
        // as this thread can manage. The mixer's own period dominates the
        // cost of this loop, so sub-microsecond skew here is immaterial.
        for id in &members {
            if let Some(src) = self.registry.get(*id) {
                src.lock().set_sync_gate(true);
            }
        }

        debug!(group_id, members = members.len(), "sync group started");
        Ok(())
    }

    /// Seek ghost and every member to `seconds`. Per the spec's open
    /// question on synchronized seeks, gates are *not* held closed across a
    /// barrier here — each member's gate reopens as soon as its own seek is
    /// issued. Alignment afterward is therefore eventual, restored by the
    /// next drift check, not immediate the way `start_sync_group` is.
    pub fn seek_sync_group(&self, group_id: &str, seconds: f64) -> Result<()> {
        let members = self.members_of(group_id)?;

        let sample_rate = members
            .first()
            .and_then(|id| self.registry.get(*id))
            .map(|src| src.lock().config().sample_rate)
            .unwrap_or(48_000);
        let target_frame = seconds_to_frames(seconds.max(0.0), sample_rate) as i64;

        {
            let mut state = self.state.lock();
            let group = state
                .groups
                .get_mut(group_id)
                .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })?;
            group.ghost.seek(target_frame);
            state.master_sample_position = target_frame;
        }

        for id in &members {
            if let Some(src) = self.registry.get(*id) {
                let mut src = src.lock();
                src.seek(seconds);
                src.resync_to(target_frame);
                src.set_sync_gate(true);
            }
        }
        Ok(())
    }

    pub fn pause_sync_group(&self, group_id: &str) -> Result<()> {
        let members = self.members_of(group_id)?;
        {
            let mut state = self.state.lock();
            state
                .groups
                .get_mut(group_id)
                .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })?
                .ghost
                .pause();
        }
        for id in &members {
            if let Some(src) = self.registry.get(*id) {
                src.lock().pause();
            }
        }
        Ok(())
    }

    pub fn resume_sync_group(&self, group_id: &str) -> Result<()> {
        let members = self.members_of(group_id)?;
        {
            let mut state = self.state.lock();
            state
                .groups
                .get_mut(group_id)
                .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })?
                .ghost
                .play();
        }
        for id in &members {
            if let Some(src) = self.registry.get(*id) {
                src.lock().play();
            }
        }
        Ok(())
    }

    pub fn stop_sync_group(&self, group_id: &str) -> Result<()> {
        let members = self.members_of(group_id)?;
        {
            let mut state = self.state.lock();
            state
                .groups
                .get_mut(group_id)
                .ok_or_else(|| PlaybackError::UnknownSyncGroup {
                    group_id: group_id.to_string(),
                })?
                .ghost
                .stop();
            state.master_sample_position = 0;
        }
        for id in &members {
            if let Some(src) = self.registry.get(*id) {
                let mut src = src.lock();
                src.stop();
                src.resync_to(0);
            }
        }
        Ok(())
    }

    /// Compare every member's tracked sample position against its group's
    /// ghost and snap back any that have drifted past `tolerance_frames`.
    pub fn check_and_resync_all_groups(&self, tolerance_frames: i64) {
        let groups: Vec<(String, i64, Vec<SourceId>)> = {
            let state = self.state.lock();
            state
                .groups
                .iter()
                .map(|(id, g)| (id.clone(), g.ghost.current_frame, g.members.clone()))
                .collect()
        };

        for (group_id, ghost_frame, members) in groups {
            for id in members {
                let Some(src) = self.registry.get(id) else {
                    continue;
                };
                let mut src = src.lock();
                let drift = src.sample_position() - ghost_frame;
                if drift.abs() > tolerance_frames {
                    src.resync_to(ghost_frame);
                    self.events.publish(Event::TrackDropout {
                        source_id: id,
                        track_name: group_id.clone(),
                        master_timestamp: std::time::SystemTime::now(),
                        master_sample_position: ghost_frame.max(0) as u64,
                        missed_frames: drift.unsigned_abs(),
                        reason: "drift correction".to_string(),
                        timestamp: std::time::SystemTime::now(),
                    });
                }
            }
        }
    }

    pub fn enable_auto_drift_correction(&self, enabled: bool) {
        self.auto_drift_correction.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_drift_correction_enabled(&self) -> bool {
        self.auto_drift_correction.load(Ordering::Relaxed)
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn ghost_position(&self, group_id: &str) -> Option<i64> {
        self.state.lock().groups.get(group_id).map(|g| g.ghost.current_frame)
    }
}
