//! Fixed-capacity track pool
//!
//! Slots `0..regular` hold regular tracks; slots `regular..regular + fade`
//! hold fade clones. The two ranges never compete: ordinary allocation only
//! looks at (and only evicts from) the regular range, and fade clones only
//! ever displace other fade clones.

use tracing::debug;

use crate::track::{StartRequest, Track, TrackRef};

/// Result of allocating a regular track
#[derive(Debug)]
pub enum Allocation {
    /// A free slot was used
    Free(TrackRef),
    /// The lowest-priority track was evicted to make room
    Evicted { id: TrackRef, victim: Box<Track> },
    /// Every active track has priority >= the request
    Full,
}

/// Result of allocating a fade clone
#[derive(Debug)]
pub struct FadeAllocation {
    pub id: TrackRef,
    /// Oldest clone, force-completed because the fade sub-pool was full
    pub displaced: Option<Box<Track>>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    track: Option<Track>,
}

/// Regular tracks plus a smaller fade-clone sub-pool
#[derive(Debug)]
pub struct TrackPool {
    slots: Vec<Slot>,
    /// Number of regular slots (fade slots follow)
    regular: usize,
    /// Allocation counter, used to find the oldest track
    next_serial: u64,
}

impl TrackPool {
    pub fn new(regular: usize, fade: usize) -> Self {
        let mut slots = Vec::with_capacity(regular + fade);
        slots.resize_with(regular + fade, Slot::default);
        Self {
            slots,
            regular,
            next_serial: 0,
        }
    }

    /// Regular slot capacity
    pub fn capacity(&self) -> usize {
        self.regular
    }

    /// Fade slot capacity
    pub fn fade_capacity(&self) -> usize {
        self.slots.len() - self.regular
    }

    /// Total number of slots (regular + fade)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether `slot` belongs to the fade sub-pool
    pub fn is_fade_slot(&self, slot: usize) -> bool {
        slot >= self.regular
    }

    /// Allocate a regular track for `request`
    ///
    /// Never blocks. When no slot is free, the lowest-priority track with a
    /// priority strictly below the request's is evicted (oldest first on ties).
    pub fn allocate(&mut self, request: &StartRequest) -> Allocation {
        if let Some(slot) = (0..self.regular).find(|&i| self.slots[i].track.is_none()) {
            return Allocation::Free(self.install(slot, request));
        }

        let victim_slot = (0..self.regular)
            .filter_map(|i| self.slots[i].track.as_ref().map(|t| (i, t)))
            .filter(|(_, t)| t.priority < request.priority)
            .min_by_key(|(_, t)| (t.priority, t.serial))
            .map(|(i, _)| i);

        match victim_slot {
            Some(slot) => {
                let victim = self.slots[slot].track.take().map(Box::new);
                let id = self.install(slot, request);
                match victim {
                    Some(victim) => {
                        debug!(
                            "Evicted sound {} (priority {}) from slot {} for sound {} (priority {})",
                            victim.sound_id,
                            victim.priority,
                            slot,
                            request.sound_id,
                            request.priority
                        );
                        Allocation::Evicted { id, victim }
                    }
                    None => Allocation::Free(id),
                }
            }
            None => Allocation::Full,
        }
    }

    /// Place a fade clone built from `template` into the fade sub-pool
    ///
    /// The clone receives a fresh [`TrackRef`] and serial. If every fade slot
    /// is busy, the oldest clone is removed and returned so the caller can
    /// close it.
    pub fn allocate_fade(&mut self, mut template: Track) -> FadeAllocation {
        let fade_range = self.regular..self.slots.len();

        let (slot, displaced) =
            match fade_range.clone().find(|&i| self.slots[i].track.is_none()) {
                Some(slot) => (slot, None),
                None => {
                    let oldest = fade_range
                        .min_by_key(|&i| self.slots[i].track.as_ref().map_or(0, |t| t.serial))
                        .unwrap_or(self.regular);
                    (oldest, self.slots[oldest].track.take().map(Box::new))
                }
            };

        let entry = &mut self.slots[slot];
        entry.generation = entry.generation.wrapping_add(1);
        let id = TrackRef {
            slot: slot as u16,
            generation: entry.generation,
        };
        template.id = id;
        template.serial = self.next_serial;
        self.next_serial += 1;
        entry.track = Some(template);

        FadeAllocation { id, displaced }
    }

    /// Put a pre-built track into a specific free regular slot
    ///
    /// Used by restore to keep tracks in their saved slots. Returns the track
    /// back if the slot is out of range or occupied.
    pub fn insert_at(&mut self, slot: usize, mut track: Track) -> Result<TrackRef, Track> {
        if slot >= self.regular || self.slots[slot].track.is_some() {
            return Err(track);
        }
        let entry = &mut self.slots[slot];
        entry.generation = entry.generation.wrapping_add(1);
        let id = TrackRef {
            slot: slot as u16,
            generation: entry.generation,
        };
        track.id = id;
        track.serial = self.next_serial;
        self.next_serial += 1;
        entry.track = Some(track);
        Ok(id)
    }

    /// Put a pre-built track into the first free regular slot (never evicts)
    pub fn insert(&mut self, track: Track) -> Result<TrackRef, Track> {
        match (0..self.regular).find(|&i| self.slots[i].track.is_none()) {
            Some(slot) => self.insert_at(slot, track),
            None => Err(track),
        }
    }

    fn install(&mut self, slot: usize, request: &StartRequest) -> TrackRef {
        let entry = &mut self.slots[slot];
        entry.generation = entry.generation.wrapping_add(1);
        let id = TrackRef {
            slot: slot as u16,
            generation: entry.generation,
        };
        entry.track = Some(Track::new(id, request, self.next_serial));
        self.next_serial += 1;
        id
    }

    /// Remove a track, returning it if `id` is still live
    pub fn release(&mut self, id: TrackRef) -> Option<Track> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.track.take()
    }

    pub fn get(&self, id: TrackRef) -> Option<&Track> {
        let entry = self.slots.get(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.track.as_ref()
    }

    pub fn get_mut(&mut self, id: TrackRef) -> Option<&mut Track> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.track.as_mut()
    }

    /// Track in `slot` regardless of generation (tick loop access)
    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Track> {
        self.slots.get_mut(slot)?.track.as_mut()
    }

    /// Visit every active track in pool order
    pub fn for_each_active(&self, mut f: impl FnMut(&Track)) {
        for track in self.iter() {
            f(track);
        }
    }

    /// Active tracks in pool order (regular first, then fade clones)
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.slots.iter().filter_map(|s| s.track.as_ref())
    }

    /// Number of active regular tracks
    pub fn active_count(&self) -> usize {
        self.slots[..self.regular]
            .iter()
            .filter(|s| s.track.is_some())
            .count()
    }

    /// Number of active fade clones
    pub fn fade_count(&self) -> usize {
        self.slots[self.regular..]
            .iter()
            .filter(|s| s.track.is_some())
            .count()
    }

    /// Remove every track, returning them in pool order
    pub fn take_all(&mut self) -> Vec<Track> {
        self.slots.iter_mut().filter_map(|s| s.track.take()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(sound: u32, priority: i32) -> StartRequest {
        StartRequest::new(sound, priority, 100, 0)
    }

    #[test]
    fn test_allocate_uses_free_slots_first() {
        let mut pool = TrackPool::new(2, 1);
        assert!(matches!(pool.allocate(&req(1, 10)), Allocation::Free(_)));
        assert!(matches!(pool.allocate(&req(2, 1)), Allocation::Free(_)));
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_full_pool_rejects_lower_priority() {
        let mut pool = TrackPool::new(2, 1);
        pool.allocate(&req(1, 10));
        pool.allocate(&req(2, 10));
        assert!(matches!(pool.allocate(&req(3, 5)), Allocation::Full));
        // Equal priority does not evict either
        assert!(matches!(pool.allocate(&req(3, 10)), Allocation::Full));
        let sounds: Vec<u32> = pool.iter().map(|t| t.sound_id).collect();
        assert_eq!(sounds, vec![1, 2]);
    }

    #[test]
    fn test_full_pool_evicts_lowest_priority_oldest_first() {
        let mut pool = TrackPool::new(3, 1);
        pool.allocate(&req(1, 4));
        pool.allocate(&req(2, 2));
        pool.allocate(&req(3, 2));

        match pool.allocate(&req(4, 5)) {
            Allocation::Evicted { id, victim } => {
                assert_eq!(victim.sound_id, 2);
                assert_eq!(id.slot, 1);
                assert_eq!(pool.get(id).unwrap().sound_id, 4);
            }
            other => panic!("expected eviction, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_ref_does_not_address_new_track() {
        let mut pool = TrackPool::new(1, 1);
        let Allocation::Free(first) = pool.allocate(&req(1, 1)) else {
            panic!("expected free slot");
        };
        assert!(pool.release(first).is_some());
        let Allocation::Free(second) = pool.allocate(&req(2, 1)) else {
            panic!("expected free slot");
        };
        assert_eq!(first.slot, second.slot);
        assert!(pool.get(first).is_none());
        assert!(pool.release(first).is_none());
        assert_eq!(pool.get(second).unwrap().sound_id, 2);
    }

    #[test]
    fn test_fade_pool_is_disjoint_and_displaces_oldest() {
        let mut pool = TrackPool::new(1, 2);
        let Allocation::Free(id) = pool.allocate(&req(1, 1)) else {
            panic!("expected free slot");
        };
        let template = pool.get(id).unwrap().clone();

        let a = pool.allocate_fade(template.clone());
        let b = pool.allocate_fade(template.clone());
        assert!(a.displaced.is_none() && b.displaced.is_none());
        assert!(pool.is_fade_slot(a.id.slot as usize));
        assert_eq!(pool.fade_count(), 2);
        assert_eq!(pool.active_count(), 1);

        let c = pool.allocate_fade(template);
        let displaced = c.displaced.expect("oldest clone displaced");
        assert_eq!(displaced.id, a.id);
        assert_eq!(c.id.slot, a.id.slot);
        assert!(pool.get(a.id).is_none());
        assert_eq!(pool.fade_count(), 2);

        // Fade clones never make room for regular tracks
        assert!(matches!(pool.allocate(&req(9, 0)), Allocation::Full));
    }

    #[test]
    fn test_insert_at_respects_occupancy() {
        let mut pool = TrackPool::new(2, 1);
        let Allocation::Free(id) = pool.allocate(&req(1, 1)) else {
            panic!("expected free slot");
        };
        let track = pool.get(id).unwrap().clone();
        assert!(pool.insert_at(0, track.clone()).is_err());
        assert!(pool.insert_at(2, track.clone()).is_err());
        let placed = pool.insert_at(1, track).unwrap();
        assert_eq!(placed.slot, 1);
        assert_eq!(pool.active_count(), 2);
    }
}
