//! Per-tick feed scheduling
//!
//! Every tick each open track pulls exactly one tick's worth of decoded bytes
//! from its current region and queues them on its output stream. Region ends
//! are resolved inside the loop, so one tick may span several regions.

use nether_bank::{MAX_REGIONS, SoundFormat};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::bank::SoundBank;
use crate::error::ResourceError;
use crate::events::{EventQueue, TrackEvent};
use crate::metrics::FeedMetrics;
use crate::output::QueuedOutput;
use crate::track::{StartRequest, Track, VolumeGroup};
use crate::transition::{MarkerTrigger, Outcome, resolve_region_end};

/// Bytes to feed a track this tick
///
/// `sample_rate / tick_rate` frames, with the remainder carried in `carry` so
/// the total over a second matches the sample rate exactly. Doubled when
/// `catch_up` is set. Always a whole number of frames.
pub fn feed_quota(format: &SoundFormat, tick_rate: u32, carry: &mut u32, catch_up: bool) -> usize {
    let tick_rate = tick_rate.max(1) as u64;
    let total = format.sample_rate as u64 + *carry as u64;
    let frames = (total / tick_rate) as usize;
    *carry = (total % tick_rate) as u32;

    let bytes = frames * format.frame_size();
    if catch_up { bytes * 2 } else { bytes }
}

/// Shared state borrowed by the feed loop for one tick
pub(crate) struct FeedContext<'a, B: ?Sized, O: ?Sized> {
    pub bank: &'a mut B,
    pub output: &'a mut O,
    pub trigger: &'a mut Option<MarkerTrigger>,
    pub events: &'a mut EventQueue,
    pub metrics: &'a mut FeedMetrics,
    /// Reused read buffer
    pub scratch: &'a mut Vec<u8>,
    pub group_volumes: [u8; VolumeGroup::COUNT],
    pub tick_rate: u32,
    pub catch_up_on_starvation: bool,
}

/// What the engine must do after feeding one track
#[derive(Debug, Default)]
pub(crate) struct FeedResult {
    /// Track reached the end of its material (or faded to silence)
    pub finished: bool,
    /// Clones to place in the fade sub-pool
    pub fade_clones: SmallVec<[Track; 1]>,
    /// Follow-up start requested by a marker trigger
    pub follow_up: Option<StartRequest>,
}

/// Feed one open track for one tick
///
/// A read failure is returned as an error; the caller releases the track.
pub(crate) fn feed_track<B, O>(
    ctx: &mut FeedContext<'_, B, O>,
    track: &mut Track,
) -> Result<FeedResult, ResourceError>
where
    B: SoundBank + ?Sized,
    O: QueuedOutput + ?Sized,
{
    let mut result = FeedResult::default();

    let (Some(handle), Some(out), Some(format)) = (track.resource, track.output, track.format)
    else {
        return Err(ResourceError::InvalidHandle(0));
    };

    if track.step_ramp() && track.release_on_silence {
        result.finished = true;
        return Ok(result);
    }

    let starved = ctx.catch_up_on_starvation && ctx.output.is_starved(out);
    if starved {
        ctx.metrics.starved_feeds += 1;
    }
    let quota = feed_quota(&format, ctx.tick_rate, &mut track.feed_carry, starved);
    trace!(
        "Feed sound {} slot {}: quota {} bytes{}",
        track.sound_id,
        track.id.slot,
        quota,
        if starved { " (catch-up)" } else { "" }
    );

    let mut remaining = quota;
    let mut idle_transitions = 0usize;
    loop {
        if track.region.is_none() || track.remaining_in_region() == 0 {
            idle_transitions += 1;
            if idle_transitions > MAX_REGIONS + 1 {
                warn!(
                    "Malformed catalog: sound {} cycles through empty regions, stopping",
                    track.sound_id
                );
                result.finished = true;
                break;
            }

            let transition = resolve_region_end(&*ctx.bank, handle, track, ctx.trigger.as_ref())?;
            ctx.metrics.region_switches += 1;
            if transition.trigger_fired {
                *ctx.trigger = None;
                result.follow_up = transition.follow_up;
            }
            if let Some(clone) = transition.fade_clone {
                result.fade_clones.push(clone);
            }
            if transition.outcome == Outcome::Finished {
                result.finished = true;
                break;
            }
            continue;
        }

        if remaining == 0 {
            break;
        }

        let Some(region) = track.region else {
            continue;
        };
        let start = track.offset_in_region;
        let want = remaining.min(track.remaining_in_region());
        let read = ctx
            .bank
            .read_region_bytes(handle, region, start, want, ctx.scratch)?
            .min(want)
            .min(ctx.scratch.len());
        if read == 0 {
            return Err(ResourceError::ReadFailed(format!(
                "no data at region {} offset {}",
                region, start
            )));
        }

        ctx.output.queue_buffer(out, &ctx.scratch[..read]);
        ctx.metrics.bytes_queued += read as u64;

        let end = start + read;
        for marker in ctx.bank.markers(handle, region)? {
            if marker.offset >= start && marker.offset < end {
                ctx.events.push(TrackEvent::MarkerReached {
                    track: track.id,
                    sound: track.sound_id,
                    marker: marker.id,
                });
            }
        }

        track.offset_in_region = end;
        track.offset_in_resource += read;
        remaining -= read;
        idle_transitions = 0;
    }

    if !result.finished {
        let group_volume = ctx.group_volumes[track.group.index()];
        ctx.output
            .set_stream_params(out, track.effective_volume(group_volume), track.pan);
    }

    Ok(result)
}
