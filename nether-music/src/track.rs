//! Track data model
//!
//! A [`Track`] is one playback cursor into one open resource. Regular tracks
//! and fade clones share the same struct; what differs is their
//! [`RegionEndPolicy`] and which pool sub-range they live in.

use nether_bank::{HookId, SoundFormat, SoundId};

use crate::bank::ResourceHandle;
use crate::output::OutputHandle;

/// Maximum track volume
pub const MAX_VOLUME: u8 = 127;

/// Pan range (-64 = hard left, 0 = center, 63 = hard right)
pub const PAN_LEFT: i8 = -64;
pub const PAN_RIGHT: i8 = 63;

/// Stable reference to a track slot
///
/// The generation changes every time the slot is reused, so a reference to
/// a released track never addresses its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackRef {
    /// Slot index in the pool (fade slots follow the regular ones)
    pub slot: u16,
    /// Slot generation at allocation time
    pub generation: u32,
}

/// What happens when a track's cursor reaches the end of its region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionEndPolicy {
    /// Ask the transition resolver (regular tracks)
    #[default]
    Resolve,
    /// Finish at the region end (fade clones)
    Retire,
}

/// Volume group a track is mixed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum VolumeGroup {
    #[default]
    Music = 0,
    Voice = 1,
    Sfx = 2,
}

impl VolumeGroup {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Music),
            1 => Some(Self::Voice),
            2 => Some(Self::Sfx),
            _ => None,
        }
    }
}

/// Linear volume ramp, applied once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeRamp {
    pub target: u8,
    /// Signed per-tick change (never 0)
    pub step: i16,
}

impl VolumeRamp {
    /// Ramp from `from` to `target` that lands in at most `ticks` ticks
    ///
    /// Returns `None` when no ramp is needed (already at target, or `ticks == 0`
    /// which means "jump straight to target").
    pub fn towards(from: u8, target: u8, ticks: u32) -> Option<Self> {
        if from == target || ticks == 0 {
            return None;
        }
        let distance = target as i32 - from as i32;
        let magnitude = (distance.unsigned_abs()).div_ceil(ticks).max(1) as i16;
        Some(Self {
            target,
            step: if distance < 0 { -magnitude } else { magnitude },
        })
    }

    /// Apply one tick of the ramp to `volume`, clamping at the target
    ///
    /// Returns true once the target has been reached.
    pub fn apply(&self, volume: &mut u8) -> bool {
        let next = *volume as i16 + self.step;
        let reached = if self.step < 0 {
            next <= self.target as i16
        } else {
            next >= self.target as i16
        };
        *volume = if reached {
            self.target
        } else {
            next.clamp(0, MAX_VOLUME as i16) as u8
        };
        reached
    }
}

/// Request to start playing a sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    pub sound_id: SoundId,
    /// Only used when choosing a track to evict
    pub priority: i32,
    /// Initial volume (0-127)
    pub volume: u8,
    /// Initial hook id
    pub hook_id: HookId,
    pub group: VolumeGroup,
}

impl StartRequest {
    pub fn new(sound_id: SoundId, priority: i32, volume: u8, hook_id: HookId) -> Self {
        Self {
            sound_id,
            priority,
            volume: volume.min(MAX_VOLUME),
            hook_id,
            group: VolumeGroup::Music,
        }
    }

    pub fn with_group(mut self, group: VolumeGroup) -> Self {
        self.group = group;
        self
    }
}

/// One playback slot
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackRef,
    pub sound_id: SoundId,
    /// Open resource (None until the first tick opens it lazily)
    pub resource: Option<ResourceHandle>,
    /// Decoded layout, derived at open time
    pub format: Option<SoundFormat>,
    /// Output stream receiving this track's bytes
    pub output: Option<OutputHandle>,

    pub volume: u8,
    pub ramp: Option<VolumeRamp>,
    pub pan: i8,
    pub priority: i32,
    pub group: VolumeGroup,

    /// Current region (None = needs initial region resolution)
    pub region: Option<usize>,
    /// Cursor relative to the region start
    pub offset_in_region: usize,
    /// Absolute read cursor
    pub offset_in_resource: usize,
    /// Length of the current region (cached at each transition)
    pub region_length: usize,

    /// Hook id used to select jump edges at the next region end
    pub hook_id: HookId,
    /// Hook id requested by game logic, latched at the next region end
    pub pending_hook: Option<HookId>,

    pub end_policy: RegionEndPolicy,
    /// Release once the volume ramp reaches 0
    pub release_on_silence: bool,

    /// Sample-rate remainder carried between ticks (keeps quotas drift-free)
    pub feed_carry: u32,
    /// Monotonic allocation order (oldest = smallest)
    pub serial: u64,
}

impl Track {
    /// Fresh, unopened track for a start request
    pub fn new(id: TrackRef, request: &StartRequest, serial: u64) -> Self {
        Self {
            id,
            sound_id: request.sound_id,
            resource: None,
            format: None,
            output: None,
            volume: request.volume.min(MAX_VOLUME),
            ramp: None,
            pan: 0,
            priority: request.priority,
            group: request.group,
            region: None,
            offset_in_region: 0,
            offset_in_resource: 0,
            region_length: 0,
            hook_id: request.hook_id,
            pending_hook: None,
            end_policy: RegionEndPolicy::Resolve,
            release_on_silence: false,
            feed_carry: 0,
            serial,
        }
    }

    #[inline]
    pub fn is_fade_clone(&self) -> bool {
        self.end_policy == RegionEndPolicy::Retire
    }

    /// Whether the resource and output stream have been opened
    #[inline]
    pub fn is_open(&self) -> bool {
        self.resource.is_some() && self.output.is_some()
    }

    /// Set a volume target reached over `ticks` ticks (0 = immediately)
    pub fn set_volume_target(&mut self, target: u8, ticks: u32) {
        let target = target.min(MAX_VOLUME);
        self.ramp = VolumeRamp::towards(self.volume, target, ticks);
        if self.ramp.is_none() {
            self.volume = target;
        }
    }

    /// Advance the volume ramp by one tick
    ///
    /// Returns true if this tick brought the volume to 0.
    pub fn step_ramp(&mut self) -> bool {
        let Some(ramp) = self.ramp else {
            return false;
        };
        if ramp.apply(&mut self.volume) {
            self.ramp = None;
        }
        self.volume == 0 && ramp.target == 0
    }

    /// Bytes left in the current region
    #[inline]
    pub fn remaining_in_region(&self) -> usize {
        self.region_length.saturating_sub(self.offset_in_region)
    }

    /// Volume after group scaling
    #[inline]
    pub fn effective_volume(&self, group_volume: u8) -> u8 {
        (self.volume as u16 * group_volume as u16 / MAX_VOLUME as u16) as u8
    }
}

/// Read-only view of a track for game logic and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackStatus {
    pub id: TrackRef,
    pub sound_id: SoundId,
    pub region: Option<usize>,
    pub offset_in_region: usize,
    pub offset_in_resource: usize,
    pub volume: u8,
    pub pan: i8,
    pub priority: i32,
    pub hook_id: HookId,
    pub pending_hook: Option<HookId>,
    pub is_fade_clone: bool,
    pub group: VolumeGroup,
}

impl From<&Track> for TrackStatus {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            sound_id: track.sound_id,
            region: track.region,
            offset_in_region: track.offset_in_region,
            offset_in_resource: track.offset_in_resource,
            volume: track.volume,
            pan: track.pan,
            priority: track.priority,
            hook_id: track.hook_id,
            pending_hook: track.pending_hook,
            is_fade_clone: track.is_fade_clone(),
            group: track.group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Track {
        let id = TrackRef {
            slot: 0,
            generation: 1,
        };
        Track::new(id, &StartRequest::new(1, 5, 80, 0), 0)
    }

    #[test]
    fn test_ramp_80_to_0_in_4_ticks() {
        let mut t = track();
        t.set_volume_target(0, 4);
        let mut hit_zero = Vec::new();
        for _ in 0..4 {
            hit_zero.push(t.step_ramp());
        }
        assert_eq!(t.volume, 0);
        assert_eq!(hit_zero, vec![false, false, false, true]);
        assert!(t.ramp.is_none());
    }

    #[test]
    fn test_ramp_uneven_division_lands_within_ticks() {
        let mut t = track();
        t.volume = 100;
        t.set_volume_target(0, 3);
        for _ in 0..3 {
            t.step_ramp();
        }
        assert_eq!(t.volume, 0);
    }

    #[test]
    fn test_ramp_up_clamps_at_target() {
        let mut t = track();
        t.volume = 10;
        t.set_volume_target(127, 2);
        t.step_ramp();
        assert!(t.volume > 10 && t.volume < 127);
        t.step_ramp();
        assert_eq!(t.volume, 127);
        assert!(!t.step_ramp());
    }

    #[test]
    fn test_zero_ticks_sets_immediately() {
        let mut t = track();
        t.set_volume_target(30, 0);
        assert_eq!(t.volume, 30);
        assert!(t.ramp.is_none());
    }

    #[test]
    fn test_effective_volume_scales_by_group() {
        let mut t = track();
        t.volume = 127;
        assert_eq!(t.effective_volume(127), 127);
        assert_eq!(t.effective_volume(0), 0);
        t.volume = 100;
        assert_eq!(t.effective_volume(127), 100);
    }

    #[test]
    fn test_volume_group_index_round_trip() {
        for group in [VolumeGroup::Music, VolumeGroup::Voice, VolumeGroup::Sfx] {
            assert_eq!(VolumeGroup::from_index(group.index() as u8), Some(group));
        }
        assert_eq!(VolumeGroup::from_index(3), None);
    }
}
