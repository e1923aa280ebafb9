pub mod classifier;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geo::Coord;

pub use classifier::{IndoorReading, SignalQuality, SignalReport, SignalTrend};

/// Default number of samples kept per session.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Where a position fix came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FixSource {
    Gps,
    Wifi,
    Network,
    Indoor,
    Hybrid,
}

impl std::fmt::Display for FixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixSource::Gps => write!(f, "GPS"),
            FixSource::Wifi => write!(f, "Wi-Fi"),
            FixSource::Network => write!(f, "Network"),
            FixSource::Indoor => write!(f, "Indoor"),
            FixSource::Hybrid => write!(f, "Hybrid"),
        }
    }
}

/// A single timestamped position reading.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoFix {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
    /// Radius of the 68% confidence circle, in meters
    pub accuracy_meters: f64,
    pub source: FixSource,
    /// Capture time in milliseconds since the unix epoch
    pub captured_at_millis: i64,
}

impl GeoFix {
    pub fn new(
        coord: Coord,
        accuracy_meters: f64,
        source: FixSource,
        captured_at_millis: i64,
    ) -> Self {
        Self {
            lat: coord.lat,
            lng: coord.lng,
            accuracy_meters,
            source,
            captured_at_millis,
        }
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.lat, self.lng)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignalSample {
    pub timestamp_ms: i64,
    pub accuracy_m: f64,
    pub source: FixSource,
}

impl From<&GeoFix> for SignalSample {
    fn from(fix: &GeoFix) -> Self {
        Self {
            timestamp_ms: fix.captured_at_millis,
            accuracy_m: fix.accuracy_meters,
            source: fix.source,
        }
    }
}

/// Bounded ring of signal samples, sorted by capture time ascending.
///
/// When full, the oldest sample is evicted first.
#[derive(Clone, Debug)]
pub struct SignalHistory {
    samples: VecDeque<SignalSample>,
    capacity: usize,
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SignalHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a sample at its capture-time position.
    ///
    /// Samples arrive from two producers, so a sample may land before the
    /// tail. A sample older than everything in a full ring is dropped.
    pub fn push(&mut self, sample: SignalSample) {
        let pos = self
            .samples
            .partition_point(|s| s.timestamp_ms <= sample.timestamp_ms);
        if pos == 0 && self.samples.len() >= self.capacity {
            return;
        }
        self.samples.insert(pos, sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalSample> {
        self.samples.iter()
    }

    /// The most recent `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &SignalSample> {
        self.samples.iter().skip(self.samples.len().saturating_sub(n))
    }

    pub fn latest(&self) -> Option<&SignalSample> {
        self.samples.back()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
