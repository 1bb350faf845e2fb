//! Nether-Bank: region catalog for interactive streamed music
//!
//! A sound resource is one block of decoded PCM split into contiguous
//! **regions**. Each region carries:
//!
//! - **Jump edges** - `(trigger hook) -> (target region, target hook, fade)`
//!   rules consulted when playback reaches the end of the region
//! - **Markers** - cue points at a byte offset inside the region
//!
//! Looping is expressed purely as a jump edge back to an earlier region;
//! there is no implicit wraparound at the end of the last region.
//!
//! This crate only describes and validates resources. Streaming them is the
//! job of `nether-music`.
//!
//! # Usage
//!
//! ```ignore
//! use nether_bank::{JumpEdge, SoundFormat, SoundResourceBuilder};
//!
//! let format = SoundFormat::new(22_050, 16, 1);
//! let resource = SoundResourceBuilder::new("theme", format)
//!     .region(intro_pcm)
//!     .region(loop_pcm)
//!     .region(ending_pcm)
//!     // Loop region 1 forever unless hook 1 is set, then go to the ending
//!     .jump(1, JumpEdge::new(0, 1, 0, 0))
//!     .jump(1, JumpEdge::new(1, 2, 0, 6))
//!     .build()?;
//! ```

mod builder;
mod error;
mod format;
mod resource;

pub use builder::SoundResourceBuilder;
pub use error::BankError;
pub use format::{SoundFormat, fade_ticks_from_millis, millis_to_frame_bytes};
pub use resource::{JumpEdge, Marker, Region, SoundResource};

/// Identifier of a sound resource
pub type SoundId = u32;

/// Interactive branch selector value
pub type HookId = u32;

/// Hook id that matches unconditionally (the fallback edge set)
pub const DEFAULT_HOOK: HookId = 0;

/// Maximum number of regions in one resource
pub const MAX_REGIONS: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_HOOK, 0);
        assert!(MAX_REGIONS <= u16::MAX as usize);
    }
}
