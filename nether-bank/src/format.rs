//! PCM sample format and unit conversions

use crate::BankError;

/// Decoded PCM layout of a sound resource
///
/// 12-bit sources are decoded to 16-bit before they reach the catalog, so
/// they occupy two bytes per sample like 16-bit data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundFormat {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Source bit depth (8, 12 or 16)
    pub bits_per_sample: u8,
    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u8,
}

impl SoundFormat {
    pub const fn new(sample_rate: u32, bits_per_sample: u8, channels: u8) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
        }
    }

    /// Bytes per decoded sample
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        if self.bits_per_sample == 8 { 1 } else { 2 }
    }

    /// Bytes per frame (one sample for every channel)
    ///
    /// Every read and every region boundary is a multiple of this.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Decoded bytes per second of playback
    #[inline]
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.frame_size() as u64
    }

    /// Whether samples are unsigned (8-bit PCM is unsigned, 16-bit is signed)
    #[inline]
    pub fn is_unsigned(&self) -> bool {
        self.bits_per_sample == 8
    }

    pub fn validate(&self) -> Result<(), BankError> {
        let bits_ok = matches!(self.bits_per_sample, 8 | 12 | 16);
        let channels_ok = matches!(self.channels, 1 | 2);
        if !bits_ok || !channels_ok || self.sample_rate == 0 {
            return Err(BankError::UnsupportedFormat {
                bits_per_sample: self.bits_per_sample,
                channels: self.channels,
                sample_rate: self.sample_rate,
            });
        }
        Ok(())
    }
}

/// Convert a fade length in milliseconds to timer ticks
///
/// Integer division truncates, so fades shorter than one tick become 0
/// (an immediate cut).
pub fn fade_ticks_from_millis(millis: u32, tick_rate: u32) -> u16 {
    let ticks = millis as u64 * tick_rate as u64 / 1000;
    ticks.min(u16::MAX as u64) as u16
}

/// Number of bytes covering `millis` of audio, rounded down to a whole frame
pub fn millis_to_frame_bytes(millis: u32, format: &SoundFormat) -> usize {
    let frames = format.sample_rate as u64 * millis as u64 / 1000;
    frames as usize * format.frame_size()
}
