//! Queued-playback boundary
//!
//! Each track owns one output stream. Every tick the engine appends the
//! decoded bytes it pulled for that track and pushes the track's effective
//! volume and pan. Resampling, panning hardware and the device callback live
//! behind this trait.
//!
//! Two implementations ship with the crate:
//! - [`RingOutput`] - one lock-free `ringbuf` ring per stream, drained by the
//!   device side through [`RingOutput::take_consumer`] or [`RingOutput::drain`]
//! - [`CaptureOutput`] - records every queued byte (tests, offline rendering)

use hashbrown::{HashMap, HashSet};
use nether_bank::SoundFormat;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use tracing::debug;

use crate::error::OutputError;

/// Opaque handle to one queued-playback stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle(pub u32);

/// Queued-buffer audio output
pub trait QueuedOutput {
    /// Open a stream that will receive PCM in `format`
    fn open_stream(&mut self, format: SoundFormat) -> Result<OutputHandle, OutputError>;

    /// Append decoded bytes to the stream's queue
    fn queue_buffer(&mut self, handle: OutputHandle, bytes: &[u8]);

    /// Update the stream's volume (0-127) and pan (-64..=63)
    fn set_stream_params(&mut self, handle: OutputHandle, volume: u8, pan: i8);

    /// Whether the stream has run dry and needs a catch-up feed
    fn is_starved(&self, handle: OutputHandle) -> bool;

    /// Stop accepting data; already queued bytes may still play out
    fn close_stream(&mut self, handle: OutputHandle);
}

// ============================================================================
// Capture output
// ============================================================================

/// One recorded stream
#[derive(Debug, Clone)]
pub struct CapturedStream {
    pub format: SoundFormat,
    /// Every byte queued so far
    pub bytes: Vec<u8>,
    /// Bytes already handed out by [`CaptureOutput::take_new_bytes`]
    pub consumed: usize,
    pub volume: u8,
    pub pan: i8,
    pub closed: bool,
    /// Number of `queue_buffer` calls
    pub queue_calls: usize,
}

/// Output that records everything queued to it
#[derive(Debug, Default)]
pub struct CaptureOutput {
    streams: HashMap<u32, CapturedStream>,
    starved: HashSet<u32>,
    next_handle: u32,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            starved: HashSet::new(),
            next_handle: 1,
        }
    }

    pub fn stream(&self, handle: OutputHandle) -> Option<&CapturedStream> {
        self.streams.get(&handle.0)
    }

    /// All streams ever opened, closed ones included
    pub fn streams(&self) -> impl Iterator<Item = (OutputHandle, &CapturedStream)> {
        self.streams.iter().map(|(h, s)| (OutputHandle(*h), s))
    }

    /// Number of streams still open
    pub fn open_streams(&self) -> usize {
        self.streams.values().filter(|s| !s.closed).count()
    }

    /// Bytes queued since the previous call for this stream
    pub fn take_new_bytes(&mut self, handle: OutputHandle) -> &[u8] {
        match self.streams.get_mut(&handle.0) {
            Some(stream) => {
                let start = stream.consumed;
                stream.consumed = stream.bytes.len();
                &stream.bytes[start..]
            }
            None => &[],
        }
    }

    /// Forget closed streams whose bytes have all been taken
    ///
    /// Returns the number of streams removed.
    pub fn prune_drained(&mut self) -> usize {
        let before = self.streams.len();
        self.streams
            .retain(|_, s| !(s.closed && s.consumed == s.bytes.len()));
        before - self.streams.len()
    }

    /// Force [`QueuedOutput::is_starved`] for a stream
    pub fn set_starved(&mut self, handle: OutputHandle, starved: bool) {
        if starved {
            self.starved.insert(handle.0);
        } else {
            self.starved.remove(&handle.0);
        }
    }
}

impl QueuedOutput for CaptureOutput {
    fn open_stream(&mut self, format: SoundFormat) -> Result<OutputHandle, OutputError> {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.streams.insert(
            handle,
            CapturedStream {
                format,
                bytes: Vec::new(),
                consumed: 0,
                volume: 0,
                pan: 0,
                closed: false,
                queue_calls: 0,
            },
        );
        Ok(OutputHandle(handle))
    }

    fn queue_buffer(&mut self, handle: OutputHandle, bytes: &[u8]) {
        if let Some(stream) = self.streams.get_mut(&handle.0)
            && !stream.closed
        {
            stream.bytes.extend_from_slice(bytes);
            stream.queue_calls += 1;
        }
    }

    fn set_stream_params(&mut self, handle: OutputHandle, volume: u8, pan: i8) {
        if let Some(stream) = self.streams.get_mut(&handle.0) {
            stream.volume = volume;
            stream.pan = pan;
        }
    }

    fn is_starved(&self, handle: OutputHandle) -> bool {
        self.starved.contains(&handle.0)
    }

    fn close_stream(&mut self, handle: OutputHandle) {
        if let Some(stream) = self.streams.get_mut(&handle.0) {
            stream.closed = true;
        }
        self.starved.remove(&handle.0);
    }
}

// ============================================================================
// Ring buffer output
// ============================================================================

/// Default queue depth per stream (~250ms)
pub const DEFAULT_RING_MILLIS: u32 = 250;

struct RingStream {
    format: SoundFormat,
    /// Engine side
    producer: HeapProd<u8>,
    /// Device side, until handed out with `take_consumer`
    consumer: Option<HeapCons<u8>>,
    /// Ring size in bytes
    capacity: usize,
    volume: u8,
    pan: i8,
    /// Bytes dropped because the ring was full
    dropped: u64,
}

/// Per-stream ring buffers between the engine and the device callback
pub struct RingOutput {
    streams: HashMap<u32, RingStream>,
    max_streams: usize,
    buffer_millis: u32,
    next_handle: u32,
}

impl RingOutput {
    /// Create an output with at most `max_streams` concurrent streams, each
    /// buffering `buffer_millis` of audio
    pub fn new(max_streams: usize, buffer_millis: u32) -> Self {
        Self {
            streams: HashMap::new(),
            max_streams,
            buffer_millis: buffer_millis.max(1),
            next_handle: 1,
        }
    }

    /// Hand the consuming end of a stream to the device thread
    ///
    /// Returns `None` if the stream is unknown or its consumer was already taken.
    pub fn take_consumer(&mut self, handle: OutputHandle) -> Option<HeapCons<u8>> {
        self.streams.get_mut(&handle.0)?.consumer.take()
    }

    /// Pop queued bytes for a stream whose consumer is still held here
    pub fn drain(&mut self, handle: OutputHandle, dst: &mut [u8]) -> usize {
        self.streams
            .get_mut(&handle.0)
            .and_then(|s| s.consumer.as_mut())
            .map(|c| c.pop_slice(dst))
            .unwrap_or(0)
    }

    /// Bytes currently queued for a stream
    pub fn queued_len(&self, handle: OutputHandle) -> usize {
        self.streams
            .get(&handle.0)
            .map(|s| s.producer.occupied_len())
            .unwrap_or(0)
    }

    /// Current `(volume, pan)` of a stream
    pub fn stream_params(&self, handle: OutputHandle) -> Option<(u8, i8)> {
        self.streams.get(&handle.0).map(|s| (s.volume, s.pan))
    }

    /// Format a stream was opened with
    pub fn stream_format(&self, handle: OutputHandle) -> Option<SoundFormat> {
        self.streams.get(&handle.0).map(|s| s.format)
    }

    /// Bytes dropped on overflow for a stream
    pub fn dropped(&self, handle: OutputHandle) -> u64 {
        self.streams.get(&handle.0).map(|s| s.dropped).unwrap_or(0)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

impl QueuedOutput for RingOutput {
    fn open_stream(&mut self, format: SoundFormat) -> Result<OutputHandle, OutputError> {
        if self.streams.len() >= self.max_streams {
            return Err(OutputError::NoFreeStreams(self.max_streams));
        }
        format
            .validate()
            .map_err(|e| OutputError::UnsupportedFormat(e.to_string()))?;

        let frames = (format.sample_rate as u64 * self.buffer_millis as u64 / 1000).max(1);
        let capacity = frames as usize * format.frame_size();
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();

        let handle = self.next_handle;
        self.next_handle += 1;
        self.streams.insert(
            handle,
            RingStream {
                format,
                producer,
                consumer: Some(consumer),
                capacity,
                volume: 0,
                pan: 0,
                dropped: 0,
            },
        );
        Ok(OutputHandle(handle))
    }

    fn queue_buffer(&mut self, handle: OutputHandle, bytes: &[u8]) {
        let Some(stream) = self.streams.get_mut(&handle.0) else {
            return;
        };
        let pushed = stream.producer.push_slice(bytes);
        if pushed < bytes.len() {
            // Consumer is running behind; drop the tail rather than block the tick
            let dropped = bytes.len() - pushed;
            stream.dropped += dropped as u64;
            debug!(
                "Output stream {} overflow: dropped {} bytes",
                handle.0, dropped
            );
        }
    }

    fn set_stream_params(&mut self, handle: OutputHandle, volume: u8, pan: i8) {
        if let Some(stream) = self.streams.get_mut(&handle.0) {
            stream.volume = volume;
            stream.pan = pan;
        }
    }

    fn is_starved(&self, handle: OutputHandle) -> bool {
        self.streams
            .get(&handle.0)
            .map(|s| s.producer.occupied_len() < s.capacity / 4)
            .unwrap_or(false)
    }

    fn close_stream(&mut self, handle: OutputHandle) {
        self.streams.remove(&handle.0);
    }
}
