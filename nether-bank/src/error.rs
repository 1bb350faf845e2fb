//! Sound resource validation error types

use core::fmt;

/// Sound resource validation error types
#[derive(Debug, Clone, PartialEq)]
pub enum BankError {
    /// Resource has no PCM data at all
    EmptyResource,
    /// Sample format is not one we can stream (bits, channels or rate)
    UnsupportedFormat {
        bits_per_sample: u8,
        channels: u8,
        sample_rate: u32,
    },
    /// Region length or start is not a whole number of sample frames
    UnalignedRegion(usize),
    /// Region extends past the end of the PCM data
    RegionOutOfBounds(usize),
    /// Region starts before the previous one ends
    RegionsOverlap(usize),
    /// Jump edge points at a region that does not exist
    JumpTargetOutOfRange { region: usize, target: usize },
    /// Marker sits outside its region
    MarkerOutOfRange { region: usize, marker: u32 },
    /// Too many regions for the catalog
    TooManyRegions(usize),
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankError::EmptyResource => write!(f, "Sound resource has no PCM data"),
            BankError::UnsupportedFormat {
                bits_per_sample,
                channels,
                sample_rate,
            } => write!(
                f,
                "Unsupported sample format: {} bits, {} channels, {} Hz",
                bits_per_sample, channels, sample_rate
            ),
            BankError::UnalignedRegion(r) => {
                write!(f, "Region {} is not aligned to the sample frame size", r)
            }
            BankError::RegionOutOfBounds(r) => {
                write!(f, "Region {} extends past the end of the data", r)
            }
            BankError::RegionsOverlap(r) => {
                write!(f, "Region {} overlaps the previous region", r)
            }
            BankError::JumpTargetOutOfRange { region, target } => write!(
                f,
                "Jump in region {} targets missing region {}",
                region, target
            ),
            BankError::MarkerOutOfRange { region, marker } => {
                write!(f, "Marker {} lies outside region {}", marker, region)
            }
            BankError::TooManyRegions(n) => {
                write!(f, "Too many regions: {} (max {})", n, crate::MAX_REGIONS)
            }
        }
    }
}

impl std::error::Error for BankError {}
