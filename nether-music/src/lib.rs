//! Nether-Music: interactive region-streaming music engine
//!
//! Plays several independently controlled tracks, each streaming a
//! multi-region [`SoundResource`](nether_bank::SoundResource). At every region
//! boundary the track consults the resource's jump edges for its current
//! hook id and decides whether to continue, loop, branch or end. Branches can
//! cross-fade: the material that would have followed keeps playing on a
//! short-lived fade clone that ramps down under the new region.
//!
//! # Architecture
//!
//! - [`MusicEngine`] - track pool, control API, per-tick feeding, save/restore
//! - [`SoundBank`] - region catalog and decoder boundary ([`MemoryBank`] in-process)
//! - [`QueuedOutput`] - queued playback streams ([`RingOutput`], [`CaptureOutput`])
//! - [`TickTimer`] - dedicated thread calling `tick()` at the configured rate
//!
//! # Usage
//!
//! ```ignore
//! let bank = BankManifest::load("bank.toml")?.build_bank(60)?;
//! let engine = MusicEngine::new(EngineConfig::default(), bank, RingOutput::new(12, 250))?;
//! let engine = share(engine);
//! let _timer = TickTimer::spawn(engine.clone(), Duration::from_millis(16))?;
//!
//! let theme = lock_engine(&engine).start_track(StartRequest::new(1, 10, 127, 0))?;
//! // Later: branch to the combat section at the next region boundary
//! lock_engine(&engine).set_hook_id(theme.track, 1)?;
//! ```

mod bank;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod manifest;
mod metrics;
mod mixdown;
mod output;
mod persist;
mod pool;
mod timer;
mod track;
mod transition;

pub use bank::{EdgeList, MarkerList, MemoryBank, RegionBounds, ResourceHandle, SoundBank};
pub use config::{ConfigError, EngineConfig};
pub use engine::{MusicEngine, Started};
pub use error::{EngineError, OutputError, PersistError, ResourceError};
pub use events::{EVENT_QUEUE_CAPACITY, EventQueue, TrackEvent};
pub use feed::feed_quota;
pub use manifest::{BankManifest, JumpEntry, ManifestError, MarkerEntry, RegionEntry, SoundEntry};
pub use metrics::FeedMetrics;
pub use mixdown::Mixdown;
pub use output::{
    CaptureOutput, CapturedStream, DEFAULT_RING_MILLIS, OutputHandle, QueuedOutput, RingOutput,
};
pub use persist::{EngineSnapshot, RestoreReport, TrackRecord};
pub use pool::{Allocation, FadeAllocation, TrackPool};
pub use timer::{SharedEngine, TickTimer, lock_engine, share};
pub use track::{
    MAX_VOLUME, PAN_LEFT, PAN_RIGHT, RegionEndPolicy, StartRequest, Track, TrackRef, TrackStatus,
    VolumeGroup, VolumeRamp,
};
pub use transition::{MarkerTrigger, Outcome, Transition, resolve_initial, resolve_region_end};

pub use nether_bank;
