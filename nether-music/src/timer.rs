//! Timer thread integration
//!
//! The engine is shared between game logic and a dedicated timer thread that
//! calls [`MusicEngine::tick`] at the configured rate. A single mutex
//! serializes control calls and ticks.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::bank::SoundBank;
use crate::engine::MusicEngine;
use crate::output::QueuedOutput;

/// Engine shared between game logic and the timer thread
pub type SharedEngine<B, O> = Arc<Mutex<MusicEngine<B, O>>>;

/// Wrap an engine for sharing with a [`TickTimer`]
pub fn share<B: SoundBank, O: QueuedOutput>(engine: MusicEngine<B, O>) -> SharedEngine<B, O> {
    Arc::new(Mutex::new(engine))
}

/// Lock a shared engine, recovering from a poisoned lock
pub fn lock_engine<B: SoundBank, O: QueuedOutput>(
    engine: &SharedEngine<B, O>,
) -> MutexGuard<'_, MusicEngine<B, O>> {
    engine.lock().unwrap_or_else(|poisoned| {
        warn!("Music engine lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Handle to the tick thread
///
/// Dropping the handle stops the thread and waits for it to exit.
pub struct TickTimer {
    /// Sender kept only to signal shutdown (Option to allow explicit drop before join)
    tx: Option<Sender<()>>,
    /// Thread join handle
    handle: Option<JoinHandle<()>>,
}

impl TickTimer {
    /// Spawn a thread that ticks `engine` every `interval`
    pub fn spawn<B, O>(engine: SharedEngine<B, O>, interval: Duration) -> std::io::Result<Self>
    where
        B: SoundBank + Send + 'static,
        O: QueuedOutput + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let interval = interval.max(Duration::from_micros(100));

        let handle = thread::Builder::new()
            .name("music-tick".into())
            .spawn(move || {
                debug!("Music tick thread started ({:?} period)", interval);
                let mut next = Instant::now() + interval;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            lock_engine(&engine).tick();
                            next += interval;
                            // Fell more than one period behind: resync instead of bursting
                            let now = Instant::now();
                            if next + interval < now {
                                next = now + interval;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Music tick thread stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Check if the tick thread is still running
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Drop the sender first so recv_timeout() sees Disconnected; joining
        // while still holding it would deadlock
        drop(self.tx.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Music tick thread panicked");
        }
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryBank;
    use crate::config::EngineConfig;
    use crate::output::CaptureOutput;

    fn engine() -> SharedEngine<MemoryBank, CaptureOutput> {
        share(MusicEngine::new(EngineConfig::default(), MemoryBank::new(), CaptureOutput::new()).unwrap())
    }

    #[test]
    fn test_timer_ticks_until_dropped() {
        let shared = engine();
        let timer = TickTimer::spawn(shared.clone(), Duration::from_millis(1)).unwrap();
        let started = Instant::now();
        while lock_engine(&shared).ticks() < 3 && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(timer.is_alive());
        drop(timer);

        let ticks = lock_engine(&shared).ticks();
        assert!(ticks >= 3);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(lock_engine(&shared).ticks(), ticks);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let shared = engine();
        let clone = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(shared.is_poisoned());
        lock_engine(&shared).tick();
        assert_eq!(lock_engine(&shared).ticks(), 1);
    }
}
