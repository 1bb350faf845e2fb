//! Per-tick processing
//!
//! Visits every slot in pool order (regular first, then fade clones), opens
//! tracks that have not been opened yet, and feeds them one tick's worth of
//! bytes.

use nether_bank::SoundId;
use tracing::{debug, warn};

use super::MusicEngine;
use crate::bank::{ResourceHandle, SoundBank};
use crate::error::EngineError;
use crate::events::TrackEvent;
use crate::feed::{FeedContext, FeedResult, feed_track};
use crate::output::QueuedOutput;
use crate::track::{StartRequest, Track, TrackRef};
use crate::transition::{Outcome, resolve_initial};

impl<B: SoundBank, O: QueuedOutput> MusicEngine<B, O> {
    /// Run one feed tick
    ///
    /// Per-track failures release only that track and are reported through
    /// [`drain_events`](Self::drain_events). A paused engine does nothing.
    pub fn tick(&mut self) {
        if self.paused {
            return;
        }
        self.ticks += 1;
        self.metrics.ticks += 1;

        for slot in 0..self.pool.slot_count() {
            self.service_slot(slot);
        }

        self.metrics.maybe_log(self.config.metrics_interval_ticks);
    }

    fn service_slot(&mut self, slot: usize) {
        let Some(track) = self.pool.slot_mut(slot) else {
            return;
        };
        let id = track.id;

        if !track.is_open() {
            match open_track(&mut self.bank, &mut self.output, track) {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Finished) => {
                    self.finish_track(id);
                    return;
                }
                Err(error) => {
                    self.fail_track(id, error);
                    return;
                }
            }
        }

        let Some(track) = self.pool.slot_mut(slot) else {
            return;
        };
        let mut ctx = FeedContext {
            bank: &mut self.bank,
            output: &mut self.output,
            trigger: &mut self.trigger,
            events: &mut self.events,
            metrics: &mut self.metrics,
            scratch: &mut self.scratch,
            group_volumes: self.group_volumes,
            tick_rate: self.config.tick_rate,
            catch_up_on_starvation: self.config.catch_up_on_starvation,
        };
        let sound = track.sound_id;

        match feed_track(&mut ctx, track) {
            Ok(result) => self.apply_feed_result(id, sound, result),
            Err(source) => self.fail_track(
                id,
                EngineError::ResourceUnavailable { sound, source },
            ),
        }
    }

    fn apply_feed_result(&mut self, id: TrackRef, sound: SoundId, result: FeedResult) {
        let FeedResult {
            finished,
            fade_clones,
            follow_up,
        } = result;

        for clone in fade_clones {
            self.spawn_fade_clone(clone, id);
        }
        if finished {
            self.finish_track(id);
        }
        if let Some(request) = follow_up {
            self.start_follow_up(id, sound, request);
        }
    }

    /// Release a track that ran out of material (or faded to silence)
    fn finish_track(&mut self, id: TrackRef) {
        if let Some(track) = self.pool.release(id) {
            debug!("Sound {} in slot {} finished", track.sound_id, id.slot);
            self.close_handles(&track);
            self.events.push(TrackEvent::Finished {
                track: id,
                sound: track.sound_id,
            });
        }
    }

    /// Place a fade clone in the fade sub-pool and open its own handles
    fn spawn_fade_clone(&mut self, clone: Track, source: TrackRef) {
        if clone.volume == 0 {
            return;
        }

        let allocation = self.pool.allocate_fade(clone);
        if let Some(displaced) = allocation.displaced {
            debug!(
                "Fade pool full, force-completing clone of sound {} in slot {}",
                displaced.sound_id, displaced.id.slot
            );
            self.close_handles(&displaced);
            self.events.push(TrackEvent::FadeCloneForceCompleted {
                clone: displaced.id,
            });
        }

        let id = allocation.id;
        let Some(track) = self.pool.get_mut(id) else {
            return;
        };
        match open_track(&mut self.bank, &mut self.output, track) {
            Ok(Outcome::Continue) => {
                debug!(
                    "Fade clone of slot {} in slot {} at region {:?}",
                    source.slot, id.slot, track.region
                );
                self.metrics.fade_clones_spawned += 1;
                self.events.push(TrackEvent::FadeCloneSpawned { clone: id, source });
            }
            Ok(Outcome::Finished) => self.finish_track(id),
            Err(error) => self.fail_track(id, error),
        }
    }

    /// Start the track requested by a fired marker trigger
    fn start_follow_up(&mut self, source: TrackRef, sound: SoundId, request: StartRequest) {
        let next = match self.start_track(request) {
            Ok(started) => Some(started.track),
            Err(error) => {
                warn!(
                    "Trigger follow-up sound {} not started: {}",
                    request.sound_id, error
                );
                None
            }
        };
        self.events.push(TrackEvent::TriggerFired {
            track: source,
            sound,
            next,
        });
    }
}

/// Open a track's resource and output stream
///
/// Tracks without a region get the initial region; tracks that already carry
/// one (restored tracks, fade clones) are positioned inside it.
pub(super) fn open_track<B, O>(
    bank: &mut B,
    output: &mut O,
    track: &mut Track,
) -> Result<Outcome, EngineError>
where
    B: SoundBank + ?Sized,
    O: QueuedOutput + ?Sized,
{
    let sound = track.sound_id;
    let unavailable = move |source| EngineError::ResourceUnavailable { sound, source };

    let handle = bank.open_resource(sound).map_err(unavailable)?;
    // Stored right away so a failed open still gets closed on release
    track.resource = Some(handle);
    let format = bank.format(handle).map_err(unavailable)?;
    track.format = Some(format);

    match track.region {
        None => {
            if resolve_initial(&*bank, handle, track).map_err(unavailable)? == Outcome::Finished {
                return Ok(Outcome::Finished);
            }
        }
        Some(region) => seek_saved_position(&*bank, handle, track, region, format.frame_size())?,
    }

    let stream = output
        .open_stream(format)
        .map_err(|source| EngineError::OutputUnavailable { sound, source })?;
    track.output = Some(stream);
    Ok(Outcome::Continue)
}

/// Recompute the absolute cursor for a track that already has a region
fn seek_saved_position<B: SoundBank + ?Sized>(
    bank: &B,
    handle: ResourceHandle,
    track: &mut Track,
    region: usize,
    frame_size: usize,
) -> Result<(), EngineError> {
    let sound = track.sound_id;
    if track.offset_in_region % frame_size.max(1) != 0 {
        return Err(EngineError::InvalidRecord {
            sound,
            reason: format!(
                "offset {} is not a whole number of {}-byte frames",
                track.offset_in_region, frame_size
            ),
        });
    }

    let count = bank
        .region_count(handle)
        .map_err(|source| EngineError::ResourceUnavailable { sound, source })?;
    if region >= count {
        return Err(EngineError::InvalidRecord {
            sound,
            reason: format!("region {} past the last region ({} regions)", region, count),
        });
    }

    let bounds = bank
        .region_bounds(handle, region)
        .map_err(|source| EngineError::ResourceUnavailable { sound, source })?;
    if track.offset_in_region > bounds.length {
        return Err(EngineError::InvalidRecord {
            sound,
            reason: format!(
                "offset {} past the end of region {} ({} bytes)",
                track.offset_in_region, region, bounds.length
            ),
        });
    }

    track.region_length = bounds.length;
    track.offset_in_resource = bounds.offset + track.offset_in_region;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryBank;
    use crate::output::CaptureOutput;
    use nether_bank::{SoundFormat, SoundResourceBuilder};

    fn bank() -> MemoryBank {
        let resource = SoundResourceBuilder::new("two", SoundFormat::new(8_000, 16, 1))
            .region([0u8; 8])
            .region([1u8; 12])
            .build()
            .unwrap();
        let mut bank = MemoryBank::new();
        bank.insert(1, resource);
        bank
    }

    fn track(region: Option<usize>, offset: usize) -> Track {
        let id = TrackRef {
            slot: 0,
            generation: 1,
        };
        let mut track = Track::new(id, &StartRequest::new(1, 0, 100, 0), 0);
        track.region = region;
        track.offset_in_region = offset;
        track
    }

    #[test]
    fn test_open_resolves_initial_region() {
        let (mut bank, mut output) = (bank(), CaptureOutput::new());
        let mut t = track(None, 0);
        assert_eq!(
            open_track(&mut bank, &mut output, &mut t).unwrap(),
            Outcome::Continue
        );
        assert_eq!(t.region, Some(0));
        assert!(t.is_open());
    }

    #[test]
    fn test_open_keeps_saved_position() {
        let (mut bank, mut output) = (bank(), CaptureOutput::new());
        let mut t = track(Some(1), 4);
        open_track(&mut bank, &mut output, &mut t).unwrap();
        assert_eq!(t.offset_in_resource, 12);
        assert_eq!(t.region_length, 12);
    }

    #[test]
    fn test_open_rejects_position_outside_catalog() {
        let (mut bank, mut output) = (bank(), CaptureOutput::new());
        let mut t = track(Some(2), 0);
        assert!(matches!(
            open_track(&mut bank, &mut output, &mut t),
            Err(EngineError::InvalidRecord { sound: 1, .. })
        ));

        let mut t = track(Some(1), 14);
        assert!(matches!(
            open_track(&mut bank, &mut output, &mut t),
            Err(EngineError::InvalidRecord { .. })
        ));
        assert_eq!(output.open_streams(), 0);
    }

    #[test]
    fn test_open_rejects_offset_inside_a_frame() {
        let (mut bank, mut output) = (bank(), CaptureOutput::new());
        // 16-bit mono: frames are 2 bytes
        let mut t = track(Some(1), 3);
        assert!(matches!(
            open_track(&mut bank, &mut output, &mut t),
            Err(EngineError::InvalidRecord { sound: 1, .. })
        ));
        assert!(!t.is_open());

        let mut t = track(Some(1), 4);
        assert!(open_track(&mut bank, &mut output, &mut t).is_ok());
    }
}
