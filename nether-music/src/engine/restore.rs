//! Save/restore of regular tracks

use tracing::{debug, warn};

use super::MusicEngine;
use super::tick::open_track;
use crate::bank::SoundBank;
use crate::error::{EngineError, ResourceError};
use crate::output::QueuedOutput;
use crate::persist::{EngineSnapshot, RestoreReport, TrackRecord};
use crate::track::{MAX_VOLUME, TrackRef, VolumeGroup};
use crate::transition::Outcome;

impl<B: SoundBank, O: QueuedOutput> MusicEngine<B, O> {
    /// Visit a record for every regular track (fade clones are never saved)
    pub fn for_each_persistable(&self, mut f: impl FnMut(&TrackRecord)) {
        for track in self.pool.iter().filter(|t| !t.is_fade_clone()) {
            f(&TrackRecord::from_track(track));
        }
    }

    /// Recreate one track from a saved record
    ///
    /// The resource is re-opened by sound id and the read cursor recomputed
    /// from the saved region and offset. The track resumes on the next tick.
    /// Restore never evicts: if no regular slot is free the record is rejected.
    pub fn restore_one(&mut self, record: &TrackRecord) -> Result<TrackRef, EngineError> {
        let sound = record.sound();
        let placeholder = TrackRef {
            slot: record.slot as u16,
            generation: 0,
        };
        let track = record.to_track(placeholder, 0)?;

        let id = match self.pool.insert_at(record.slot as usize, track) {
            Ok(id) => id,
            Err(track) => self
                .pool
                .insert(track)
                .map_err(|_| EngineError::PoolExhausted {
                    priority: record.priority,
                })?,
        };

        let Some(track) = self.pool.get_mut(id) else {
            return Err(EngineError::StaleTrack);
        };
        let opened = open_track(&mut self.bank, &mut self.output, track);
        let error = match opened {
            Ok(Outcome::Continue) => {
                debug!(
                    "Restored sound {} in slot {} at region {:?}",
                    sound, id.slot, record.region()
                );
                return Ok(id);
            }
            Ok(Outcome::Finished) => EngineError::InvalidRecord {
                sound,
                reason: "resource has no regions".into(),
            },
            Err(EngineError::ResourceUnavailable {
                source: ResourceError::UnknownSound(_),
                ..
            }) => EngineError::RestoreResourceMissing { sound },
            Err(error) => error,
        };

        if let Some(track) = self.pool.release(id) {
            self.close_handles(&track);
        }
        Err(error)
    }

    /// Capture group volumes and all regular tracks
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut records = Vec::with_capacity(self.pool.active_count());
        self.for_each_persistable(|record| records.push(*record));
        EngineSnapshot::new(self.group_volumes, records)
    }

    /// Replace the engine's tracks with those in a snapshot
    ///
    /// All current tracks are stopped first. Records that cannot be restored
    /// are dropped and listed in the report; the rest still play.
    pub fn restore_snapshot(&mut self, snapshot: &EngineSnapshot) -> RestoreReport {
        self.stop_all();
        for (group, volume) in snapshot.group_volumes.iter().enumerate() {
            if let Some(group) = VolumeGroup::from_index(group as u8) {
                self.group_volumes[group.index()] = (*volume).min(MAX_VOLUME);
            }
        }

        let mut report = RestoreReport::default();
        for record in &snapshot.records {
            match self.restore_one(record) {
                Ok(track) => report.restored.push(track),
                Err(error) => {
                    warn!("Dropping saved track for sound {}: {}", record.sound(), error);
                    report.dropped.push(error);
                }
            }
        }
        report
    }
}
