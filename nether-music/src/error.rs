//! Engine error types
//!
//! Errors local to one track never escape the tick loop: they are logged,
//! turned into a [`TrackEvent`](crate::TrackEvent) and the track is released.
//! Only request-level failures (pool exhaustion, bad restore records) are
//! returned to the caller.

use nether_bank::SoundId;

/// Failure reported by a [`SoundBank`](crate::SoundBank)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    /// No resource with this id is available
    #[error("sound {0} is not available")]
    UnknownSound(SoundId),

    /// Handle was never opened or has already been closed
    #[error("resource handle {0} is not open")]
    InvalidHandle(u32),

    /// Region index past the end of the region table
    #[error("region {region} out of range (resource has {count})")]
    RegionOutOfRange { region: usize, count: usize },

    /// Decoder could not produce the requested bytes
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Failure reported by a [`QueuedOutput`](crate::QueuedOutput)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutputError {
    /// Output cannot accept any more streams
    #[error("no free output streams (max {0})")]
    NoFreeStreams(usize),

    /// Output is unable to play this format
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Errors surfaced by the engine's control API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Resource could not be opened or read
    #[error("sound {sound} unavailable: {source}")]
    ResourceUnavailable {
        sound: SoundId,
        #[source]
        source: ResourceError,
    },

    /// Output stream could not be opened for a track
    #[error("sound {sound} has no output stream: {source}")]
    OutputUnavailable {
        sound: SoundId,
        #[source]
        source: OutputError,
    },

    /// No free slot and no lower-priority track to evict
    #[error("track pool exhausted (request priority {priority})")]
    PoolExhausted { priority: i32 },

    /// Persisted track's sound is no longer available
    #[error("persisted sound {sound} is missing, track dropped")]
    RestoreResourceMissing { sound: SoundId },

    /// Persisted record does not fit the resource it names
    #[error("invalid persisted record for sound {sound}: {reason}")]
    InvalidRecord { sound: SoundId, reason: String },

    /// Track reference no longer names a live track
    #[error("track reference is stale")]
    StaleTrack,

    /// Fade clones keep the hook they were spawned with
    #[error("fade clones do not take hook changes")]
    FadeCloneHook,
}

/// Errors decoding a saved engine snapshot
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistError {
    /// Blob shorter than the fixed header
    #[error("snapshot too short ({0} bytes)")]
    TooShort(usize),

    /// Wrong magic bytes
    #[error("not an engine snapshot (bad magic)")]
    BadMagic,

    /// Snapshot written by an incompatible version
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// Record section shorter than the header claims
    #[error("snapshot truncated: expected {expected} record bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    /// Stored checksum does not match the records
    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            EngineError::PoolExhausted { priority: 5 }.to_string(),
            "track pool exhausted (request priority 5)"
        );
        assert_eq!(
            EngineError::ResourceUnavailable {
                sound: 3,
                source: ResourceError::UnknownSound(3),
            }
            .to_string(),
            "sound 3 unavailable: sound 3 is not available"
        );
        assert_eq!(
            PersistError::UnsupportedVersion(9).to_string(),
            "unsupported snapshot version 9"
        );
    }
}
