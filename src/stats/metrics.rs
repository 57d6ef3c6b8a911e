//! Statistics for packet publishers

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live publisher counters, updated from the read thread
#[derive(Debug)]
pub struct PublisherStats {
    started_at: Instant,
    units_read: AtomicU64,
    packets_published: AtomicU64,
    packets_discarded: AtomicU64,
    keyframes: AtomicU64,
    bytes_published: AtomicU64,
}

impl PublisherStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            units_read: AtomicU64::new(0),
            packets_published: AtomicU64::new(0),
            packets_discarded: AtomicU64::new(0),
            keyframes: AtomicU64::new(0),
            bytes_published: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_read(&self) {
        self.units_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one packet delivered to at least one subscriber
    pub(crate) fn record_published(&self, bytes: usize, keyframe: bool) {
        self.packets_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published.fetch_add(bytes as u64, Ordering::Relaxed);
        if keyframe {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one packet dropped for lack of subscribers
    pub(crate) fn record_discarded(&self) {
        self.packets_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            units_read: self.units_read.load(Ordering::Relaxed),
            packets_published: self.packets_published.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            keyframes: self.keyframes.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}

impl Default for PublisherStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Publisher counters at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStatsSnapshot {
    /// Units read from the source
    pub units_read: u64,
    /// Packets handed to at least one subscriber
    pub packets_published: u64,
    /// Packets dropped because no subscriber was registered
    pub packets_discarded: u64,
    /// Published packets classified as key frames
    pub keyframes: u64,
    /// Payload bytes of published packets (counted once per packet)
    pub bytes_published: u64,
    /// Time since the counters were created
    pub duration: Duration,
}

impl PublisherStatsSnapshot {
    /// Published payload bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_published * 8) / secs
        } else {
            0
        }
    }
}
