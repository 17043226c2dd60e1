//! Observation events and the sinks that receive them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::debug;

/// Default upper bound on the bytes copied into an event sample.
pub const DEFAULT_SAMPLE_LIMIT: usize = 1024;

/// Which way the bytes of an observed operation moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed read or write.
///
/// `sample` is an owned copy of (a prefix of) the transferred bytes, never a
/// view into the caller's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationEvent {
    pub direction: Direction,
    pub byte_count: usize,
    pub sample: Option<Bytes>,
}

impl ObservationEvent {
    /// Builds an event for `transferred`, copying at most `sample_limit` bytes.
    pub(crate) fn capture(direction: Direction, transferred: &[u8], sample_limit: usize) -> Self {
        let sample = (sample_limit > 0 && !transferred.is_empty()).then(|| {
            let len = transferred.len().min(sample_limit);
            Bytes::copy_from_slice(&transferred[..len])
        });
        Self { direction, byte_count: transferred.len(), sample }
    }
}

/// Receives observation events.
///
/// Called inline on the I/O path, possibly from many connections and both
/// directions at once. Implementations must be thread-safe and should not block.
pub trait ObservationSink: Send + Sync {
    fn record(&self, event: ObservationEvent);
}

/// Observation options, set once when the middleware is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationOptions {
    sample_limit: usize,
}

impl ObservationOptions {
    /// Caps how many bytes of each operation are copied into the event.
    /// `0` disables samples entirely.
    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn sample_limit(&self) -> usize {
        self.sample_limit
    }
}

impl Default for ObservationOptions {
    fn default() -> Self {
        Self { sample_limit: DEFAULT_SAMPLE_LIMIT }
    }
}

// ── Built-in sinks ────────────────────────────────────────────────────────────

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservationSink for NoopSink {
    fn record(&self, _event: ObservationEvent) {}
}

/// Logs each event at `DEBUG` under the `conntap::traffic` target.
///
/// The sample is rendered twice: as uppercase hex and as printable ASCII with
/// `.` standing in for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn record(&self, event: ObservationEvent) {
        let sample = event.sample.as_deref().unwrap_or_default();
        debug!(
            target: "conntap::traffic",
            op = %event.direction,
            bytes = event.byte_count,
            hex = %hex::encode_upper(sample),
            ascii = %printable(sample),
            "{}[{}]",
            event.direction,
            event.byte_count,
        );
    }
}

fn printable(sample: &[u8]) -> String {
    sample
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Running totals per direction.
///
/// Lock-free; safe to share between any number of connections.
#[derive(Debug, Default)]
pub struct ByteCounters {
    read_bytes: AtomicU64,
    read_ops: AtomicU64,
    write_bytes: AtomicU64,
    write_ops: AtomicU64,
}

impl ByteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Read => self.read_bytes.load(Ordering::Relaxed),
            Direction::Write => self.write_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn operations(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Read => self.read_ops.load(Ordering::Relaxed),
            Direction::Write => self.write_ops.load(Ordering::Relaxed),
        }
    }
}

impl ObservationSink for ByteCounters {
    fn record(&self, event: ObservationEvent) {
        let (bytes, ops) = match event.direction {
            Direction::Read => (&self.read_bytes, &self.read_ops),
            Direction::Write => (&self.write_bytes, &self.write_ops),
        };
        bytes.fetch_add(event.byte_count as u64, Ordering::Relaxed);
        ops.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_copies_at_most_the_limit() {
        let event = ObservationEvent::capture(Direction::Write, b"Hello, world", 5);
        assert_eq!(event.byte_count, 12);
        assert_eq!(event.sample.as_deref(), Some(&b"Hello"[..]));

        let event = ObservationEvent::capture(Direction::Read, b"abc", 0);
        assert_eq!(event.byte_count, 3);
        assert!(event.sample.is_none());

        let event = ObservationEvent::capture(Direction::Read, b"", 16);
        assert_eq!(event.byte_count, 0);
        assert!(event.sample.is_none());
    }

    #[test]
    fn counters_split_by_direction() {
        let counters = ByteCounters::new();
        counters.record(ObservationEvent::capture(Direction::Read, b"1234", 0));
        counters.record(ObservationEvent::capture(Direction::Read, b"56", 0));
        counters.record(ObservationEvent::capture(Direction::Write, b"7", 0));

        assert_eq!(counters.bytes(Direction::Read), 6);
        assert_eq!(counters.operations(Direction::Read), 2);
        assert_eq!(counters.bytes(Direction::Write), 1);
        assert_eq!(counters.operations(Direction::Write), 1);
    }

    #[test]
    fn printable_masks_control_bytes() {
        assert_eq!(printable(b"GET /\r\n"), "GET /..");
        assert_eq!(hex::encode_upper(b"Hi"), "4869");
    }

    #[test]
    fn options_default_and_override() {
        assert_eq!(ObservationOptions::default().sample_limit(), DEFAULT_SAMPLE_LIMIT);
        assert_eq!(ObservationOptions::default().with_sample_limit(0).sample_limit(), 0);
    }
}
