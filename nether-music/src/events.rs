//! Notifications for game logic
//!
//! Per-track failures and state changes never surface as return values from
//! `tick()`. They are queued here and drained by the caller.

use std::collections::VecDeque;

use nether_bank::SoundId;
use tracing::debug;

use crate::error::EngineError;
use crate::track::TrackRef;

/// Events kept before the oldest are discarded
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Something that happened to a track
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// Track was evicted by a higher-priority start request
    Evicted { track: TrackRef, sound: SoundId },
    /// Track played to the end of its material
    Finished { track: TrackRef, sound: SoundId },
    /// Resource or output stream failed; the track was released
    ResourceFailed {
        track: TrackRef,
        sound: SoundId,
        error: EngineError,
    },
    /// Cursor passed a marker
    MarkerReached {
        track: TrackRef,
        sound: SoundId,
        marker: u32,
    },
    /// An armed marker trigger fired (`next` is None if the follow-up could not start)
    TriggerFired {
        track: TrackRef,
        sound: SoundId,
        next: Option<TrackRef>,
    },
    /// Fade clone created for a transition
    FadeCloneSpawned { clone: TrackRef, source: TrackRef },
    /// Fade clone stopped early because the fade sub-pool was full
    FadeCloneForceCompleted { clone: TrackRef },
}

/// Bounded FIFO of [`TrackEvent`]s
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<TrackEvent>,
    dropped: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TrackEvent) {
        if self.events.len() >= EVENT_QUEUE_CAPACITY {
            self.events.pop_front();
            self.dropped += 1;
            debug!("Event queue full, dropped oldest event");
        }
        self.events.push_back(event);
    }

    /// Remove and return all queued events, oldest first
    pub fn drain(&mut self) -> Vec<TrackEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events discarded because nobody drained the queue
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(n: u32) -> TrackEvent {
        TrackEvent::Finished {
            track: TrackRef {
                slot: 0,
                generation: n,
            },
            sound: 1,
        }
    }

    #[test]
    fn test_drain_returns_in_order() {
        let mut queue = EventQueue::new();
        queue.push(finished(1));
        queue.push(finished(2));
        assert_eq!(queue.drain(), vec![finished(1), finished(2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = EventQueue::new();
        for n in 0..(EVENT_QUEUE_CAPACITY as u32 + 2) {
            queue.push(finished(n));
        }
        assert_eq!(queue.len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.drain()[0], finished(2));
    }
}
