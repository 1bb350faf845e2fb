//! Offline mixdown of captured streams
//!
//! Turns the bytes a [`CaptureOutput`] received during one tick into
//! interleaved stereo 16-bit samples, applying each stream's volume and pan.
//! Streams at other sample rates are resampled by nearest neighbour.

use nether_bank::SoundFormat;

use crate::output::{CaptureOutput, OutputHandle};
use crate::track::{MAX_VOLUME, PAN_LEFT, PAN_RIGHT};

/// Stereo mixer for rendering captured engine output
#[derive(Debug)]
pub struct Mixdown {
    sample_rate: u32,
    /// Per-tick accumulation buffer (interleaved stereo)
    accum: Vec<i32>,
}

impl Mixdown {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            accum: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mix everything queued since the previous call and append it to `out`
    ///
    /// Closed streams are dropped from the output once mixed. Returns the
    /// number of stereo frames appended.
    pub fn mix_tick(&mut self, output: &mut CaptureOutput, out: &mut Vec<i16>) -> usize {
        self.accum.clear();

        let mut handles: Vec<OutputHandle> = output.streams().map(|(h, _)| h).collect();
        handles.sort_by_key(|h| h.0);

        for handle in handles {
            let Some((format, volume, pan)) = output
                .stream(handle)
                .map(|s| (s.format, s.volume, s.pan))
            else {
                continue;
            };
            let bytes = output.take_new_bytes(handle);
            if bytes.is_empty() || volume == 0 {
                continue;
            }
            self.mix_stream(bytes, &format, volume, pan);
        }
        output.prune_drained();

        let frames = self.accum.len() / 2;
        out.extend(
            self.accum
                .iter()
                .map(|&s| s.clamp(i16::MIN as i32, i16::MAX as i32) as i16),
        );
        frames
    }

    fn mix_stream(&mut self, bytes: &[u8], format: &SoundFormat, volume: u8, pan: i8) {
        let frame_size = format.frame_size();
        let source_frames = bytes.len() / frame_size;
        let frames =
            (source_frames as u64 * self.sample_rate as u64 / format.sample_rate.max(1) as u64) as usize;
        if self.accum.len() < frames * 2 {
            self.accum.resize(frames * 2, 0);
        }

        let (left_gain, right_gain) = pan_gains(pan);
        let gain = volume.min(MAX_VOLUME) as i32;

        for frame in 0..frames {
            let src = (frame as u64 * format.sample_rate as u64 / self.sample_rate as u64) as usize;
            let base = src.min(source_frames.saturating_sub(1)) * frame_size;
            let left = decode_sample(&bytes[base..], format);
            let right = if format.channels == 2 {
                decode_sample(&bytes[base + format.bytes_per_sample()..], format)
            } else {
                left
            };

            self.accum[frame * 2] += left * gain * left_gain / (MAX_VOLUME as i32 * 64);
            self.accum[frame * 2 + 1] += right * gain * right_gain / (MAX_VOLUME as i32 * 64);
        }
    }
}

/// Left/right gains out of 64 for a pan value
fn pan_gains(pan: i8) -> (i32, i32) {
    let pan = pan.clamp(PAN_LEFT, PAN_RIGHT) as i32;
    if pan > 0 {
        (64 - pan, 64)
    } else {
        (64, 64 + pan)
    }
}

/// Decode one sample at the start of `bytes` to signed 16-bit range
fn decode_sample(bytes: &[u8], format: &SoundFormat) -> i32 {
    if format.is_unsigned() {
        bytes.first().map_or(0, |&b| (b as i32 - 128) << 8)
    } else {
        match bytes {
            [lo, hi, ..] => i16::from_le_bytes([*lo, *hi]) as i32,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::QueuedOutput;

    #[test]
    fn test_mix_applies_volume() {
        let mut output = CaptureOutput::new();
        let h = output.open_stream(SoundFormat::new(8_000, 16, 1)).unwrap();
        output.set_stream_params(h, MAX_VOLUME, 0);
        output.queue_buffer(h, &1000i16.to_le_bytes().repeat(4));

        let mut mix = Mixdown::new(8_000);
        let mut out = Vec::new();
        assert_eq!(mix.mix_tick(&mut output, &mut out), 4);
        assert_eq!(out, vec![1000; 8]);

        // Already consumed
        out.clear();
        assert_eq!(mix.mix_tick(&mut output, &mut out), 0);

        output.set_stream_params(h, 0, 0);
        output.queue_buffer(h, &1000i16.to_le_bytes().repeat(4));
        assert_eq!(mix.mix_tick(&mut output, &mut out), 0);
    }

    #[test]
    fn test_closed_streams_are_mixed_then_dropped() {
        let mut output = CaptureOutput::new();
        let h = output.open_stream(SoundFormat::new(8_000, 16, 1)).unwrap();
        output.set_stream_params(h, MAX_VOLUME, 0);
        output.queue_buffer(h, &500i16.to_le_bytes().repeat(2));
        output.close_stream(h);

        let mut mix = Mixdown::new(8_000);
        let mut out = Vec::new();
        assert_eq!(mix.mix_tick(&mut output, &mut out), 2);
        assert_eq!(out, vec![500; 4]);
        assert_eq!(output.streams().count(), 0);
    }

    #[test]
    fn test_hard_left_pan_silences_right() {
        let mut output = CaptureOutput::new();
        let h = output.open_stream(SoundFormat::new(8_000, 16, 1)).unwrap();
        output.set_stream_params(h, MAX_VOLUME, PAN_LEFT);
        output.queue_buffer(h, &2000i16.to_le_bytes().repeat(2));

        let mut mix = Mixdown::new(8_000);
        let mut out = Vec::new();
        mix.mix_tick(&mut output, &mut out);
        assert_eq!(out, vec![2000, 0, 2000, 0]);
    }

    #[test]
    fn test_unsigned_8bit_and_resample() {
        let mut output = CaptureOutput::new();
        let h = output.open_stream(SoundFormat::new(4_000, 8, 1)).unwrap();
        output.set_stream_params(h, MAX_VOLUME, 0);
        output.queue_buffer(h, &[128, 192]);

        let mut mix = Mixdown::new(8_000);
        let mut out = Vec::new();
        assert_eq!(mix.mix_tick(&mut output, &mut out), 4);
        assert_eq!(out, vec![0, 0, 0, 0, 64 << 8, 64 << 8, 64 << 8, 64 << 8]);
    }
}
