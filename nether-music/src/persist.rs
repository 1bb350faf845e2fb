//! Save/restore records
//!
//! Each regular track is saved as one fixed-size POD [`TrackRecord`]. Fade
//! clones are transient and never saved. [`EngineSnapshot`] bundles the
//! records with the group volumes into a checksummed blob.
//!
//! All record types are POD using bytemuck for zero-copy serialization.

use bytemuck::{Pod, Zeroable};
use nether_bank::{HookId, SoundId};

use crate::error::{EngineError, PersistError};
use crate::track::{MAX_VOLUME, Track, TrackRef, VolumeGroup, VolumeRamp};

/// Snapshot magic bytes
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"NMSV";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Region value meaning "not resolved yet"
pub const REGION_UNRESOLVED: i32 = -1;

/// Pending hook value meaning "no pending hook"
pub const NO_PENDING_HOOK: u32 = u32::MAX;

/// Track record flags
pub mod record_flags {
    /// A volume ramp is active
    pub const RAMP_ACTIVE: u8 = 1 << 0;
    /// Track is released when its volume reaches 0
    pub const RELEASE_ON_SILENCE: u8 = 1 << 1;
}

/// Persisted state of one regular track (36 bytes, POD)
///
/// The resource handle, output stream and format are not stored: they are
/// re-derived from `sound_id` on restore.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TrackRecord {
    pub sound_id: u32,
    /// Current region (-1 = unresolved)
    pub region: i32,
    pub offset_in_region: u32,
    pub hook_id: u32,
    /// Pending hook (u32::MAX = none)
    pub pending_hook: u32,
    pub priority: i32,
    pub volume: u16,
    pub ramp_target: u16,
    pub ramp_step: i16,
    pub pan: i8,
    /// See [`record_flags`]
    pub flags: u8,
    /// Regular pool slot the track occupied
    pub slot: u8,
    /// [`VolumeGroup`] index
    pub group: u8,
    pub _reserved: [u8; 2],
}

impl TrackRecord {
    /// Capture a regular track
    pub fn from_track(track: &Track) -> Self {
        let mut flags = 0;
        if track.ramp.is_some() {
            flags |= record_flags::RAMP_ACTIVE;
        }
        if track.release_on_silence {
            flags |= record_flags::RELEASE_ON_SILENCE;
        }
        let ramp = track.ramp.unwrap_or(VolumeRamp {
            target: track.volume,
            step: 0,
        });

        Self {
            sound_id: track.sound_id,
            region: track
                .region
                .and_then(|r| i32::try_from(r).ok())
                .unwrap_or(REGION_UNRESOLVED),
            offset_in_region: track.offset_in_region as u32,
            hook_id: track.hook_id,
            pending_hook: track.pending_hook.unwrap_or(NO_PENDING_HOOK),
            priority: track.priority,
            volume: track.volume as u16,
            ramp_target: ramp.target as u16,
            ramp_step: ramp.step,
            pan: track.pan,
            flags,
            slot: track.id.slot as u8,
            group: track.group.index() as u8,
            _reserved: [0; 2],
        }
    }

    pub fn sound(&self) -> SoundId {
        self.sound_id
    }

    /// Saved region, or None if the track had not resolved one yet
    pub fn region(&self) -> Option<usize> {
        usize::try_from(self.region).ok()
    }

    pub fn pending_hook(&self) -> Option<HookId> {
        (self.pending_hook != NO_PENDING_HOOK).then_some(self.pending_hook)
    }

    pub fn ramp(&self) -> Option<VolumeRamp> {
        (self.flags & record_flags::RAMP_ACTIVE != 0 && self.ramp_step != 0).then(|| VolumeRamp {
            target: self.ramp_target.min(MAX_VOLUME as u16) as u8,
            step: self.ramp_step,
        })
    }

    /// Rebuild an unopened regular track from the record
    ///
    /// The track keeps the saved region and offset; resource-derived fields
    /// are filled in when it is opened.
    pub fn to_track(&self, id: TrackRef, serial: u64) -> Result<Track, EngineError> {
        let group = VolumeGroup::from_index(self.group).ok_or_else(|| EngineError::InvalidRecord {
            sound: self.sound_id,
            reason: format!("unknown volume group {}", self.group),
        })?;
        if self.region < REGION_UNRESOLVED {
            return Err(EngineError::InvalidRecord {
                sound: self.sound_id,
                reason: format!("negative region {}", self.region),
            });
        }

        let request = crate::track::StartRequest {
            sound_id: self.sound_id,
            priority: self.priority,
            volume: self.volume.min(MAX_VOLUME as u16) as u8,
            hook_id: self.hook_id,
            group,
        };
        let mut track = Track::new(id, &request, serial);
        track.region = self.region();
        track.offset_in_region = self.offset_in_region as usize;
        track.pending_hook = self.pending_hook();
        track.ramp = self.ramp();
        track.pan = self.pan;
        track.release_on_silence = self.flags & record_flags::RELEASE_ON_SILENCE != 0;
        Ok(track)
    }
}

/// Fixed snapshot header (24 bytes, POD)
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, Pod, Zeroable)]
struct SnapshotHeader {
    magic: [u8; 4],
    version: u32,
    record_count: u32,
    /// Group volumes; the last byte is reserved
    group_volumes: [u8; 4],
    /// xxHash3 over group volumes and records
    checksum: u64,
}

const HEADER_SIZE: usize = std::mem::size_of::<SnapshotHeader>();
const RECORD_SIZE: usize = std::mem::size_of::<TrackRecord>();

/// Saved engine state: group volumes plus one record per regular track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub group_volumes: [u8; VolumeGroup::COUNT],
    pub records: Vec<TrackRecord>,
}

impl EngineSnapshot {
    pub fn new(group_volumes: [u8; VolumeGroup::COUNT], records: Vec<TrackRecord>) -> Self {
        Self {
            group_volumes,
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// xxHash3 checksum over the group volumes and records
    pub fn checksum(&self) -> u64 {
        use xxhash_rust::xxh3::Xxh3;
        let mut hasher = Xxh3::new();
        hasher.update(&self.group_volumes);
        hasher.update(bytemuck::cast_slice(&self.records));
        hasher.digest()
    }

    /// Serialize to a self-describing blob
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut group_volumes = [0u8; 4];
        group_volumes[..VolumeGroup::COUNT].copy_from_slice(&self.group_volumes);
        let header = SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            record_count: self.records.len() as u32,
            group_volumes,
            checksum: self.checksum(),
        };

        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.records.len() * RECORD_SIZE);
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.records));
        bytes
    }

    /// Parse a blob produced by [`to_bytes`](Self::to_bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PersistError::TooShort(bytes.len()));
        }
        let header: SnapshotHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
        if header.magic != SNAPSHOT_MAGIC {
            return Err(PersistError::BadMagic);
        }
        if header.version != SNAPSHOT_VERSION {
            return Err(PersistError::UnsupportedVersion(header.version));
        }

        let body = &bytes[HEADER_SIZE..];
        let expected = header.record_count as usize * RECORD_SIZE;
        if body.len() < expected {
            return Err(PersistError::Truncated {
                expected,
                found: body.len(),
            });
        }

        let records = body[..expected]
            .chunks_exact(RECORD_SIZE)
            .map(bytemuck::pod_read_unaligned::<TrackRecord>)
            .collect();
        let mut group_volumes = [0u8; VolumeGroup::COUNT];
        group_volumes.copy_from_slice(&header.group_volumes[..VolumeGroup::COUNT]);

        let snapshot = Self {
            group_volumes,
            records,
        };
        if snapshot.checksum() != header.checksum {
            return Err(PersistError::ChecksumMismatch);
        }
        Ok(snapshot)
    }
}

/// Outcome of restoring a snapshot
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Tracks recreated, in record order
    pub restored: Vec<TrackRef>,
    /// Records that could not be restored
    pub dropped: Vec<EngineError>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}
