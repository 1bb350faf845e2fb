//! Bank manifest (bank.toml)
//!
//! Describes sounds as lists of synthesized tone regions with jump edges and
//! markers, for demos and tests. Real games hand the engine their own
//! [`SoundBank`](crate::SoundBank) implementation instead.
//!
//! ```toml
//! [[sounds]]
//! id = 1
//! name = "theme"
//! sample_rate = 22050
//! bits = 16
//! channels = 1
//!
//! [[sounds.regions]]
//! millis = 500
//! frequency = 220.0
//!
//! [[sounds.regions]]
//! millis = 500
//! frequency = 330.0
//!
//! # Loop region 1; hook 1 branches back to region 0 with a 200ms fade
//! [[sounds.jumps]]
//! from = 1
//! to = 1
//!
//! [[sounds.jumps]]
//! from = 1
//! hook = 1
//! to = 0
//! target_hook = 0
//! fade_ms = 200
//!
//! [[sounds.markers]]
//! region = 1
//! id = 7
//! offset_ms = 250
//! ```

use std::path::Path;

use nether_bank::{
    BankError, HookId, JumpEdge, SoundFormat, SoundId, SoundResource, SoundResourceBuilder,
    fade_ticks_from_millis, millis_to_frame_bytes,
};
use serde::Deserialize;

use crate::bank::MemoryBank;

/// Errors loading a bank manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("sound {sound}: {source}")]
    Bank {
        sound: SoundId,
        #[source]
        source: BankError,
    },

    #[error("sound {0} is defined more than once")]
    DuplicateSound(SoundId),
}

/// Bank manifest root
#[derive(Debug, Deserialize)]
pub struct BankManifest {
    #[serde(default)]
    pub sounds: Vec<SoundEntry>,
}

/// One sound resource
#[derive(Debug, Deserialize)]
pub struct SoundEntry {
    pub id: SoundId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bits")]
    pub bits: u8,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default)]
    pub regions: Vec<RegionEntry>,
    #[serde(default)]
    pub jumps: Vec<JumpEntry>,
    #[serde(default)]
    pub markers: Vec<MarkerEntry>,
}

/// A region filled with a sine tone (frequency 0 = silence)
#[derive(Debug, Deserialize)]
pub struct RegionEntry {
    pub millis: u32,
    #[serde(default)]
    pub frequency: f32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

/// Jump edge leaving region `from`
#[derive(Debug, Deserialize)]
pub struct JumpEntry {
    pub from: usize,
    /// Trigger hook (0 = default edge)
    #[serde(default)]
    pub hook: HookId,
    pub to: usize,
    /// Hook after the jump (defaults to `hook`)
    #[serde(default)]
    pub target_hook: Option<HookId>,
    #[serde(default)]
    pub fade_ms: u32,
}

/// Marker `offset_ms` into `region`
#[derive(Debug, Deserialize)]
pub struct MarkerEntry {
    pub region: usize,
    pub id: u32,
    #[serde(default)]
    pub offset_ms: u32,
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_bits() -> u8 {
    16
}

fn default_channels() -> u8 {
    1
}

fn default_amplitude() -> f32 {
    0.5
}

impl BankManifest {
    pub fn from_toml_str(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Synthesize every sound into a [`MemoryBank`]
    ///
    /// Fade lengths are converted from milliseconds to ticks at `tick_rate`.
    pub fn build_bank(&self, tick_rate: u32) -> Result<MemoryBank, ManifestError> {
        let mut bank = MemoryBank::new();
        for entry in &self.sounds {
            if bank.contains(entry.id) {
                return Err(ManifestError::DuplicateSound(entry.id));
            }
            let resource = entry
                .build(tick_rate)
                .map_err(|source| ManifestError::Bank {
                    sound: entry.id,
                    source,
                })?;
            bank.insert(entry.id, resource);
        }
        Ok(bank)
    }
}

impl SoundEntry {
    pub fn format(&self) -> SoundFormat {
        SoundFormat::new(self.sample_rate, self.bits, self.channels)
    }

    /// Synthesize the resource described by this entry
    pub fn build(&self, tick_rate: u32) -> Result<SoundResource, BankError> {
        let format = self.format();
        format.validate()?;

        let name = if self.name.is_empty() {
            format!("sound-{}", self.id)
        } else {
            self.name.clone()
        };
        let mut builder = SoundResourceBuilder::new(name, format);
        for region in &self.regions {
            builder = builder.region(synthesize_tone(&format, region));
        }
        for jump in &self.jumps {
            builder = builder.jump(
                jump.from,
                JumpEdge::new(
                    jump.hook,
                    jump.to,
                    jump.target_hook.unwrap_or(jump.hook),
                    fade_ticks_from_millis(jump.fade_ms, tick_rate),
                ),
            );
        }
        for marker in &self.markers {
            builder = builder.marker(
                marker.region,
                marker.id,
                millis_to_frame_bytes(marker.offset_ms, &format),
            );
        }
        builder.build()
    }
}

/// Render a sine tone in the format's native sample layout
fn synthesize_tone(format: &SoundFormat, region: &RegionEntry) -> Vec<u8> {
    let frames = millis_to_frame_bytes(region.millis, format) / format.frame_size();
    let amplitude = region.amplitude.clamp(0.0, 1.0);
    let step = std::f32::consts::TAU * region.frequency / format.sample_rate as f32;

    let mut pcm = Vec::with_capacity(frames * format.frame_size());
    for frame in 0..frames {
        let sample = if region.frequency > 0.0 {
            (step * frame as f32).sin() * amplitude
        } else {
            0.0
        };
        for _ in 0..format.channels {
            if format.is_unsigned() {
                pcm.push(((sample * 127.0) as i16 + 128) as u8);
            } else {
                pcm.extend_from_slice(&((sample * i16::MAX as f32) as i16).to_le_bytes());
            }
        }
    }
    pcm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::SoundBank;

    const MANIFEST: &str = r#"
[[sounds]]
id = 1
name = "theme"
sample_rate = 8000
bits = 16
channels = 2

[[sounds.regions]]
millis = 100
frequency = 440.0

[[sounds.regions]]
millis = 50

[[sounds.jumps]]
from = 1
hook = 2
to = 0
target_hook = 3
fade_ms = 500

[[sounds.markers]]
region = 0
id = 9
offset_ms = 50

[[sounds]]
id = 2
bits = 8

[[sounds.regions]]
millis = 10
frequency = 100.0
"#;

    #[test]
    fn test_build_bank_from_manifest() {
        let manifest = BankManifest::from_toml_str(MANIFEST).unwrap();
        let mut bank = manifest.build_bank(60).unwrap();

        let theme = bank.get(1).unwrap();
        assert_eq!(theme.name, "theme");
        assert_eq!(theme.region_count(), 2);
        // 100ms at 8kHz stereo 16-bit
        assert_eq!(theme.regions[0].length, 800 * 4);
        assert_eq!(theme.markers(0)[0].offset, 400 * 4);

        let handle = bank.open_resource(1).unwrap();
        let edges = bank.jump_edges(handle, 1, 2).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_hook, 3);
        assert_eq!(edges[0].fade_ticks, 30);

        let blip = bank.get(2).unwrap();
        assert_eq!(blip.format, SoundFormat::new(22_050, 8, 1));
        assert_eq!(blip.data.len(), 220);
    }

    #[test]
    fn test_silent_region_is_zero() {
        let manifest = BankManifest::from_toml_str(MANIFEST).unwrap();
        let bank = manifest.build_bank(60).unwrap();
        let theme = bank.get(1).unwrap();
        let silent = theme.region_bytes(1, 0, usize::MAX).unwrap();
        assert!(silent.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_manifest_reports_sound() {
        let bad = r#"
[[sounds]]
id = 4
bits = 24

[[sounds.regions]]
millis = 10
"#;
        let manifest = BankManifest::from_toml_str(bad).unwrap();
        assert!(matches!(
            manifest.build_bank(60),
            Err(ManifestError::Bank { sound: 4, .. })
        ));

        let duplicate = "[[sounds]]\nid = 1\n[[sounds.regions]]\nmillis = 10\n\
                         [[sounds]]\nid = 1\n[[sounds.regions]]\nmillis = 10\n";
        let manifest = BankManifest::from_toml_str(duplicate).unwrap();
        assert!(matches!(
            manifest.build_bank(60),
            Err(ManifestError::DuplicateSound(1))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.toml");
        std::fs::write(&path, MANIFEST).unwrap();
        let manifest = BankManifest::load(&path).unwrap();
        assert_eq!(manifest.sounds.len(), 2);
        assert!(matches!(
            BankManifest::load(dir.path().join("missing.toml")),
            Err(ManifestError::Io(_))
        ));
    }
}
