//! Music engine
//!
//! Owns the track pool and drives it once per tick:
//! - Control API used by game logic (start, stop, volume, hooks, triggers)
//! - Feed scheduling and region transitions (see `tick`)
//! - Save/restore of regular tracks (see `restore`)

mod restore;
mod tick;


use nether_bank::HookId;
use tracing::{debug, warn};

use crate::bank::SoundBank;
use crate::config::{ConfigError, EngineConfig};
use crate::error::EngineError;
use crate::events::{EventQueue, TrackEvent};
use crate::metrics::FeedMetrics;
use crate::output::QueuedOutput;
use crate::pool::{Allocation, TrackPool};
use crate::track::{
    MAX_VOLUME, PAN_LEFT, PAN_RIGHT, StartRequest, Track, TrackRef, TrackStatus, VolumeGroup,
};
use crate::transition::MarkerTrigger;

/// Result of a successful [`MusicEngine::start_track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started {
    pub track: TrackRef,
    /// Track that was evicted to make room, if any
    pub evicted: Option<TrackStatus>,
}

/// Interactive multi-track streaming engine
///
/// All state lives in this instance. Share it with a timer thread through
/// [`SharedEngine`](crate::SharedEngine).
pub struct MusicEngine<B: SoundBank, O: QueuedOutput> {
    config: EngineConfig,
    bank: B,
    output: O,
    pool: TrackPool,
    /// One-shot marker trigger (at most one armed)
    trigger: Option<MarkerTrigger>,
    group_volumes: [u8; VolumeGroup::COUNT],
    paused: bool,
    events: EventQueue,
    metrics: FeedMetrics,
    /// Reused read buffer for the feed loop
    scratch: Vec<u8>,
    /// Ticks run since creation (paused ticks excluded)
    ticks: u64,
}

impl<B: SoundBank, O: QueuedOutput> MusicEngine<B, O> {
    /// Create an engine over a bank and an output
    pub fn new(config: EngineConfig, bank: B, output: O) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = TrackPool::new(config.max_tracks, config.max_fade_tracks);
        debug!(
            "Music engine: {} tracks, {} fade tracks, {} ticks/s",
            config.max_tracks, config.max_fade_tracks, config.tick_rate
        );
        Ok(Self {
            config,
            bank,
            output,
            pool,
            trigger: None,
            group_volumes: [MAX_VOLUME; VolumeGroup::COUNT],
            paused: false,
            events: EventQueue::new(),
            metrics: FeedMetrics::new(),
            scratch: Vec::new(),
            ticks: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn metrics(&self) -> &FeedMetrics {
        &self.metrics
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // ========================================================================
    // Control API
    // ========================================================================

    /// Start playing a sound
    ///
    /// The resource is opened lazily on the next tick. If the pool is full,
    /// the lowest-priority track below `request.priority` is evicted;
    /// otherwise the request fails with [`EngineError::PoolExhausted`].
    pub fn start_track(&mut self, request: StartRequest) -> Result<Started, EngineError> {
        match self.pool.allocate(&request) {
            Allocation::Free(track) => {
                debug!(
                    "Started sound {} in slot {} (priority {})",
                    request.sound_id, track.slot, request.priority
                );
                Ok(Started {
                    track,
                    evicted: None,
                })
            }
            Allocation::Evicted { id, victim } => {
                let status = TrackStatus::from(victim.as_ref());
                self.close_handles(&victim);
                self.metrics.evictions += 1;
                self.events.push(TrackEvent::Evicted {
                    track: victim.id,
                    sound: victim.sound_id,
                });
                Ok(Started {
                    track: id,
                    evicted: Some(status),
                })
            }
            Allocation::Full => {
                debug!(
                    "Rejected sound {}: no track below priority {}",
                    request.sound_id, request.priority
                );
                Err(EngineError::PoolExhausted {
                    priority: request.priority,
                })
            }
        }
    }

    /// Ramp a track's volume to `target` over `ramp_ticks` ticks (0 = now)
    pub fn set_volume(
        &mut self,
        track: TrackRef,
        target: u8,
        ramp_ticks: u32,
    ) -> Result<(), EngineError> {
        let entry = self.pool.get_mut(track).ok_or(EngineError::StaleTrack)?;
        entry.set_volume_target(target, ramp_ticks);
        if ramp_ticks == 0 {
            self.push_params(track);
        }
        Ok(())
    }

    /// Set a track's pan (-64 = left, 63 = right)
    pub fn set_pan(&mut self, track: TrackRef, pan: i8) -> Result<(), EngineError> {
        let entry = self.pool.get_mut(track).ok_or(EngineError::StaleTrack)?;
        entry.pan = pan.clamp(PAN_LEFT, PAN_RIGHT);
        self.push_params(track);
        Ok(())
    }

    /// Request a hook change, applied at the track's next region boundary
    ///
    /// Fade clones never transition, so they reject hook changes.
    pub fn set_hook_id(&mut self, track: TrackRef, hook: HookId) -> Result<(), EngineError> {
        let entry = self.pool.get_mut(track).ok_or(EngineError::StaleTrack)?;
        if entry.is_fade_clone() {
            return Err(EngineError::FadeCloneHook);
        }
        entry.pending_hook = Some(hook);
        Ok(())
    }

    /// Stop a track immediately; nothing more is queued for it
    pub fn stop(&mut self, track: TrackRef) -> Result<(), EngineError> {
        let stopped = self.pool.release(track).ok_or(EngineError::StaleTrack)?;
        debug!("Stopped sound {} in slot {}", stopped.sound_id, track.slot);
        self.close_handles(&stopped);
        Ok(())
    }

    /// Fade a track to silence over `ticks` ticks, then release it
    pub fn fade_out(&mut self, track: TrackRef, ticks: u32) -> Result<(), EngineError> {
        let entry = self.pool.get_mut(track).ok_or(EngineError::StaleTrack)?;
        if ticks == 0 || entry.volume == 0 {
            return self.stop(track);
        }
        entry.release_on_silence = true;
        entry.set_volume_target(0, ticks);
        Ok(())
    }

    /// Stop every track, fade clones included
    pub fn stop_all(&mut self) {
        for track in self.pool.take_all() {
            self.close_handles(&track);
        }
    }

    /// Arm a one-shot marker trigger, replacing any armed one
    pub fn set_trigger(&mut self, trigger: MarkerTrigger) {
        if self.trigger.replace(trigger).is_some() {
            debug!("Replaced armed marker trigger");
        }
    }

    /// Disarm the marker trigger, returning it if one was armed
    pub fn clear_trigger(&mut self) -> Option<MarkerTrigger> {
        self.trigger.take()
    }

    pub fn trigger(&self) -> Option<&MarkerTrigger> {
        self.trigger.as_ref()
    }

    /// Set a group's volume (0-127); applied to open streams immediately
    pub fn set_group_volume(&mut self, group: VolumeGroup, volume: u8) {
        self.group_volumes[group.index()] = volume.min(MAX_VOLUME);
        let members: Vec<TrackRef> = self
            .pool
            .iter()
            .filter(|t| t.group == group)
            .map(|t| t.id)
            .collect();
        for track in members {
            self.push_params(track);
        }
    }

    pub fn group_volume(&self, group: VolumeGroup) -> u8 {
        self.group_volumes[group.index()]
    }

    /// Pause or resume feeding (a paused engine's tick does nothing)
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Take all queued events, oldest first
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        self.events.drain()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn track_state(&self, track: TrackRef) -> Option<TrackStatus> {
        self.pool.get(track).map(TrackStatus::from)
    }

    /// Every active track in pool order (regular first, then fade clones)
    pub fn active_tracks(&self) -> Vec<TrackStatus> {
        self.pool.iter().map(TrackStatus::from).collect()
    }

    pub fn fade_clone_count(&self) -> usize {
        self.pool.fade_count()
    }

    /// Output stream of a track, once it has been opened
    pub fn output_handle(&self, track: TrackRef) -> Option<crate::output::OutputHandle> {
        self.pool.get(track).and_then(|t| t.output)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Send a track's effective volume and pan to its stream
    fn push_params(&mut self, track: TrackRef) {
        let Some(entry) = self.pool.get(track) else {
            return;
        };
        if let Some(out) = entry.output {
            let volume = entry.effective_volume(self.group_volumes[entry.group.index()]);
            self.output.set_stream_params(out, volume, entry.pan);
        }
    }

    /// Close a track's resource and output stream
    fn close_handles(&mut self, track: &Track) {
        close_track_handles(&mut self.bank, &mut self.output, track);
    }

    /// Release a track after a failure and report it
    fn fail_track(&mut self, track: TrackRef, error: EngineError) {
        let Some(failed) = self.pool.release(track) else {
            return;
        };
        warn!(
            "Releasing sound {} in slot {}: {}",
            failed.sound_id, track.slot, error
        );
        self.close_handles(&failed);
        self.metrics.resource_failures += 1;
        self.events.push(TrackEvent::ResourceFailed {
            track,
            sound: failed.sound_id,
            error,
        });
    }
}

fn close_track_handles<B, O>(bank: &mut B, output: &mut O, track: &Track)
where
    B: SoundBank + ?Sized,
    O: QueuedOutput + ?Sized,
{
    if let Some(handle) = track.resource {
        bank.close_resource(handle);
    }
    if let Some(stream) = track.output {
        output.close_stream(stream);
    }
}
