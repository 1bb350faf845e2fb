//! Region-transition resolver
//!
//! Decides where a track goes when its cursor reaches the end of a region:
//! follow a jump edge, continue sequentially, or finish. Also produces the
//! fade clone that lets the outgoing material decay under the new one.

use nether_bank::{HookId, JumpEdge, SoundId};
use tracing::{debug, warn};

use crate::bank::{ResourceHandle, SoundBank};
use crate::error::ResourceError;
use crate::track::{RegionEndPolicy, StartRequest, Track, VolumeRamp};

/// One-shot transition armed by game logic
///
/// When a track playing `watch_sound` is about to enter a region that carries
/// the marker `marker_id`, the track ends and `next` is started in its place.
/// The marked region plays out on a fade clone over `fade_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerTrigger {
    pub watch_sound: SoundId,
    pub marker_id: u32,
    pub fade_ticks: u16,
    pub next: StartRequest,
}

/// Whether the track keeps playing after a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Finished,
}

/// Result of resolving a region end
#[derive(Debug, Clone)]
pub struct Transition {
    pub outcome: Outcome,
    /// Unopened clone that should be placed in the fade sub-pool
    pub fade_clone: Option<Track>,
    /// Track to start because a marker trigger fired
    pub follow_up: Option<StartRequest>,
    /// The armed trigger fired and must be disarmed
    pub trigger_fired: bool,
}

impl Transition {
    fn of(outcome: Outcome) -> Self {
        Self {
            outcome,
            fade_clone: None,
            follow_up: None,
            trigger_fired: false,
        }
    }
}

/// Pick the initial region for a freshly opened track
pub fn resolve_initial<B: SoundBank + ?Sized>(
    bank: &B,
    handle: ResourceHandle,
    track: &mut Track,
) -> Result<Outcome, ResourceError> {
    if bank.region_count(handle)? == 0 {
        debug!("Sound {} has no regions, finished on open", track.sound_id);
        return Ok(Outcome::Finished);
    }
    enter_region(bank, handle, track, 0)?;
    Ok(Outcome::Continue)
}

/// Resolve the end of the track's current region
///
/// The caller must only invoke this when `track.remaining_in_region() == 0`.
pub fn resolve_region_end<B: SoundBank + ?Sized>(
    bank: &B,
    handle: ResourceHandle,
    track: &mut Track,
    trigger: Option<&MarkerTrigger>,
) -> Result<Transition, ResourceError> {
    let Some(region) = track.region else {
        return resolve_initial(bank, handle, track).map(Transition::of);
    };

    if track.end_policy == RegionEndPolicy::Retire {
        return Ok(Transition::of(Outcome::Finished));
    }

    // Hook requests only take effect at a boundary
    if let Some(hook) = track.pending_hook.take() {
        track.hook_id = hook;
    }

    let count = bank.region_count(handle)?;
    let successor = (region + 1 < count).then_some(region + 1);

    if let Some(trigger) = trigger
        && trigger.watch_sound == track.sound_id
        && let Some(next) = successor
        && bank
            .markers(handle, next)?
            .iter()
            .any(|m| m.id == trigger.marker_id)
    {
        debug!(
            "Trigger on marker {} fired for sound {} entering region {}",
            trigger.marker_id, track.sound_id, next
        );
        let fade_clone = if trigger.fade_ticks > 0 {
            Some(fade_clone_of(bank, handle, track, next, trigger.fade_ticks)?)
        } else {
            None
        };
        return Ok(Transition {
            outcome: Outcome::Finished,
            fade_clone,
            follow_up: Some(trigger.next),
            trigger_fired: true,
        });
    }

    let Some(edge) = select_edge(bank, handle, region, track.hook_id)? else {
        return match successor {
            Some(next) => {
                enter_region(bank, handle, track, next)?;
                Ok(Transition::of(Outcome::Continue))
            }
            None => Ok(Transition::of(Outcome::Finished)),
        };
    };

    if edge.target_region >= count {
        warn!(
            "Malformed catalog: sound {} region {} jumps to missing region {}",
            track.sound_id, region, edge.target_region
        );
        return Ok(Transition::of(Outcome::Finished));
    }

    let new_hook = edge.target_hook;
    let fade_clone = match successor {
        Some(next) if new_hook != track.hook_id && edge.fade_ticks > 0 => {
            Some(fade_clone_of(bank, handle, track, next, edge.fade_ticks)?)
        }
        _ => None,
    };

    debug!(
        "Sound {} jump: region {} -> {} (hook {} -> {})",
        track.sound_id, region, edge.target_region, track.hook_id, new_hook
    );
    enter_region(bank, handle, track, edge.target_region)?;
    track.hook_id = new_hook;

    Ok(Transition {
        outcome: Outcome::Continue,
        fade_clone,
        follow_up: None,
        trigger_fired: false,
    })
}

/// First edge for `(region, hook)`, falling back to the default hook
fn select_edge<B: SoundBank + ?Sized>(
    bank: &B,
    handle: ResourceHandle,
    region: usize,
    hook: HookId,
) -> Result<Option<JumpEdge>, ResourceError> {
    let direct = bank.jump_edges(handle, region, hook)?;
    if let Some(first) = direct.first() {
        if direct.len() > 1 {
            warn!(
                "Malformed catalog: {} edges leave region {} on hook {}, using the first",
                direct.len(),
                region,
                hook
            );
        }
        return Ok(Some(*first));
    }

    if hook == nether_bank::DEFAULT_HOOK {
        return Ok(None);
    }

    let fallback = bank.jump_edges(handle, region, nether_bank::DEFAULT_HOOK)?;
    if fallback.len() > 1 {
        warn!(
            "Malformed catalog: {} default edges leave region {}, using the first",
            fallback.len(),
            region
        );
    }
    Ok(fallback.first().copied())
}

/// Point the track at the start of `region`
pub(crate) fn enter_region<B: SoundBank + ?Sized>(
    bank: &B,
    handle: ResourceHandle,
    track: &mut Track,
    region: usize,
) -> Result<(), ResourceError> {
    let bounds = bank.region_bounds(handle, region)?;
    track.region = Some(region);
    track.offset_in_region = 0;
    track.offset_in_resource = bounds.offset;
    track.region_length = bounds.length;
    Ok(())
}

/// Copy of `track` that plays `region` from its start while fading out
///
/// The clone carries no resource or output handle; the engine opens fresh
/// ones when it places the clone in the fade sub-pool.
fn fade_clone_of<B: SoundBank + ?Sized>(
    bank: &B,
    handle: ResourceHandle,
    track: &Track,
    region: usize,
    fade_ticks: u16,
) -> Result<Track, ResourceError> {
    let mut clone = track.clone();
    enter_region(bank, handle, &mut clone, region)?;
    clone.resource = None;
    clone.output = None;
    clone.pending_hook = None;
    clone.feed_carry = 0;
    clone.end_policy = RegionEndPolicy::Retire;
    clone.release_on_silence = true;
    clone.ramp = VolumeRamp::towards(clone.volume, 0, fade_ticks as u32);
    Ok(clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryBank;
    use crate::track::TrackRef;
    use nether_bank::{SoundFormat, SoundResourceBuilder};

    const SOUND: SoundId = 1;

    /// r0 --hook1--> r2 (fade 4), r1, r2 --hook0--> r0 (loop)
    fn bank() -> (MemoryBank, ResourceHandle) {
        let resource = SoundResourceBuilder::new("music", SoundFormat::new(8_000, 16, 1))
            .region([0u8; 16])
            .region([1u8; 16])
            .region([2u8; 16])
            .jump(0, JumpEdge::new(1, 2, 2, 4))
            .jump(2, JumpEdge::new(0, 0, 0, 0))
            .marker(1, 42, 0)
            .build()
            .unwrap();
        let mut bank = MemoryBank::new();
        bank.insert(SOUND, resource);
        let handle = bank.open_resource(SOUND).unwrap();
        (bank, handle)
    }

    fn track_at_end_of(bank: &MemoryBank, handle: ResourceHandle, region: usize) -> Track {
        let id = TrackRef {
            slot: 0,
            generation: 1,
        };
        let mut track = Track::new(id, &StartRequest::new(SOUND, 0, 100, 0), 0);
        track.resource = Some(handle);
        enter_region(bank, handle, &mut track, region).unwrap();
        track.offset_in_region = track.region_length;
        track
    }

    #[test]
    fn test_initial_selects_region_zero() {
        let (bank, handle) = bank();
        let id = TrackRef {
            slot: 0,
            generation: 1,
        };
        let mut track = Track::new(id, &StartRequest::new(SOUND, 0, 100, 0), 0);
        assert_eq!(
            resolve_initial(&bank, handle, &mut track).unwrap(),
            Outcome::Continue
        );
        assert_eq!(track.region, Some(0));
        assert_eq!(track.region_length, 16);
    }

    #[test]
    fn test_no_edge_advances_sequentially() {
        let (bank, handle) = bank();
        let mut track = track_at_end_of(&bank, handle, 0);
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(t.outcome, Outcome::Continue);
        assert_eq!(track.region, Some(1));
        assert_eq!(track.offset_in_region, 0);
        assert_eq!(track.offset_in_resource, 16);
        assert!(t.fade_clone.is_none());
    }

    #[test]
    fn test_hook_edge_jumps_and_spawns_clone() {
        let (bank, handle) = bank();
        let mut track = track_at_end_of(&bank, handle, 0);
        track.pending_hook = Some(1);
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();

        assert_eq!(track.region, Some(2));
        assert_eq!(track.hook_id, 2);
        assert!(track.pending_hook.is_none());

        let clone = t.fade_clone.expect("fade clone");
        assert_eq!(clone.region, Some(1));
        assert_eq!(clone.offset_in_region, 0);
        assert!(clone.is_fade_clone());
        assert!(clone.release_on_silence);
        assert_eq!(clone.ramp.map(|r| r.target), Some(0));
        assert!(clone.resource.is_none());
    }

    #[test]
    fn test_fallback_edge_takes_its_target_hook() {
        let (bank, handle) = bank();
        let mut track = track_at_end_of(&bank, handle, 2);
        track.hook_id = 7;
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(t.outcome, Outcome::Continue);
        assert_eq!(track.region, Some(0));
        assert_eq!(track.hook_id, 0);
        // Loop edge has no fade
        assert!(t.fade_clone.is_none());
    }

    #[test]
    fn test_fallback_edge_with_fade_spawns_clone() {
        let resource = SoundResourceBuilder::new("default", SoundFormat::new(8_000, 16, 1))
            .region([0u8; 16])
            .region([1u8; 16])
            .region([2u8; 16])
            .jump(0, JumpEdge::new(0, 2, 0, 4))
            .build()
            .unwrap();
        let mut bank = MemoryBank::new();
        bank.insert(SOUND, resource);
        let handle = bank.open_resource(SOUND).unwrap();

        let mut track = track_at_end_of(&bank, handle, 0);
        track.hook_id = 5;
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(track.region, Some(2));
        assert_eq!(track.hook_id, 0);
        assert_eq!(t.fade_clone.and_then(|c| c.region), Some(1));

        // Same edge with the hook already at its target: no clone
        let mut track = track_at_end_of(&bank, handle, 0);
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(track.region, Some(2));
        assert!(t.fade_clone.is_none());
    }

    #[test]
    fn test_first_listed_edge_wins() {
        let resource = SoundResourceBuilder::new("dup", SoundFormat::new(8_000, 16, 1))
            .region([0u8; 16])
            .region([1u8; 16])
            .region([2u8; 16])
            .jump(0, JumpEdge::new(1, 2, 1, 0))
            .jump(0, JumpEdge::new(1, 1, 1, 0))
            .jump(1, JumpEdge::new(0, 0, 0, 0))
            .jump(1, JumpEdge::new(0, 2, 0, 0))
            .build()
            .unwrap();
        let mut bank = MemoryBank::new();
        bank.insert(SOUND, resource);
        let handle = bank.open_resource(SOUND).unwrap();

        let mut track = track_at_end_of(&bank, handle, 0);
        track.pending_hook = Some(1);
        resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(track.region, Some(2));

        // Same rule through the default-hook fallback
        let mut track = track_at_end_of(&bank, handle, 1);
        track.hook_id = 3;
        resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(track.region, Some(0));
    }

    #[test]
    fn test_last_region_without_edge_finishes() {
        let resource = SoundResourceBuilder::new("one", SoundFormat::new(8_000, 8, 1))
            .region([0u8; 4])
            .build()
            .unwrap();
        let mut bank = MemoryBank::new();
        bank.insert(SOUND, resource);
        let handle = bank.open_resource(SOUND).unwrap();
        let mut track = track_at_end_of(&bank, handle, 0);
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(t.outcome, Outcome::Finished);
    }

    #[test]
    fn test_fade_clone_retires_at_region_end() {
        let (bank, handle) = bank();
        let mut track = track_at_end_of(&bank, handle, 0);
        track.end_policy = RegionEndPolicy::Retire;
        let t = resolve_region_end(&bank, handle, &mut track, None).unwrap();
        assert_eq!(t.outcome, Outcome::Finished);
        assert_eq!(track.region, Some(0));
    }

    #[test]
    fn test_trigger_wins_over_edges() {
        let (bank, handle) = bank();
        let mut track = track_at_end_of(&bank, handle, 0);
        // Would otherwise take the hook-1 edge to region 2
        track.pending_hook = Some(1);
        let trigger = MarkerTrigger {
            watch_sound: SOUND,
            marker_id: 42,
            fade_ticks: 3,
            next: StartRequest::new(9, 0, 100, 0),
        };
        let t = resolve_region_end(&bank, handle, &mut track, Some(&trigger)).unwrap();
        assert_eq!(t.outcome, Outcome::Finished);
        assert!(t.trigger_fired);
        assert_eq!(t.follow_up.map(|r| r.sound_id), Some(9));
        // Clone plays the marked region
        assert_eq!(t.fade_clone.and_then(|c| c.region), Some(1));
    }

    #[test]
    fn test_trigger_without_fade_spawns_no_clone() {
        let (bank, handle) = bank();
        let mut track = track_at_end_of(&bank, handle, 0);
        let trigger = MarkerTrigger {
            watch_sound: SOUND,
            marker_id: 42,
            fade_ticks: 0,
            next: StartRequest::new(9, 0, 100, 0),
        };
        let t = resolve_region_end(&bank, handle, &mut track, Some(&trigger)).unwrap();
        assert!(t.trigger_fired);
        assert!(t.fade_clone.is_none());
    }

    #[test]
    fn test_trigger_ignores_other_sounds_and_regions() {
        let (bank, handle) = bank();
        let trigger = MarkerTrigger {
            watch_sound: SOUND + 1,
            marker_id: 42,
            fade_ticks: 3,
            next: StartRequest::new(9, 0, 100, 0),
        };
        let mut track = track_at_end_of(&bank, handle, 0);
        let t = resolve_region_end(&bank, handle, &mut track, Some(&trigger)).unwrap();
        assert!(!t.trigger_fired);
        assert_eq!(track.region, Some(1));

        // Region 2 has no marker
        let trigger = MarkerTrigger {
            watch_sound: SOUND,
            ..trigger
        };
        let mut track = track_at_end_of(&bank, handle, 1);
        let t = resolve_region_end(&bank, handle, &mut track, Some(&trigger)).unwrap();
        assert!(!t.trigger_fired);
        assert_eq!(track.region, Some(2));

        // Nothing follows the last region, so the trigger cannot fire there
        let mut track = track_at_end_of(&bank, handle, 2);
        let t = resolve_region_end(&bank, handle, &mut track, Some(&trigger)).unwrap();
        assert!(!t.trigger_fired);
        assert_eq!(track.region, Some(0));
    }
}
