use std::path::Path;

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{
    BeelineError,
    signal::{GeoFix, IndoorReading},
};

use super::Role;

/// A fix pushed by the sensor collaborator for one party.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixEvent {
    pub role: Role,
    pub fix: GeoFix,
    /// Indoor estimate from the venue subsystem, seeker only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indoor: Option<IndoorReading>,
    /// When the fix reached this device. Recorded streams carry it so
    /// freshness is judged on the original timeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at_ms: Option<i64>,
}

impl FixEvent {
    pub fn new(role: Role, fix: GeoFix) -> Self {
        Self {
            role,
            fix,
            indoor: None,
            received_at_ms: None,
        }
    }

    pub fn received_at(mut self, received_at_ms: i64) -> Self {
        self.received_at_ms = Some(received_at_ms);
        self
    }
}

/// A source of position fixes for a tracking session.
///
/// # Lifecycle
///
/// 1. Call `start()` to obtain location access from the platform
/// 2. Call `next_fix()` repeatedly until it returns `None`
pub trait FixProducer {
    /// Acquire location access.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `GeolocationUnavailable` when tracking
    /// cannot proceed; both are surfaced to the user with a retry affordance.
    fn start(&mut self) -> Result<(), BeelineError>;

    /// The next fix, or `None` once the source is exhausted.
    fn next_fix(&mut self) -> Result<Option<FixEvent>, BeelineError>;
}

/// Replays a fixed list of fixes, either built in code or recorded as
/// JSON Lines.
#[derive(Debug, Default)]
pub struct ReplayFixProducer {
    cur_tick: usize,
    events: Vec<FixEvent>,
}

impl ReplayFixProducer {
    pub fn from_events(events: Vec<FixEvent>) -> Self {
        Self {
            cur_tick: 0,
            events,
        }
    }

    /// Loads one `FixEvent` per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be read, or a line
    /// is not a valid fix event.
    pub fn from_file(path: &Path) -> Result<Self, BeelineError> {
        if !path.exists() {
            return Err(BeelineError::InvalidFixFile {
                path: format!("{:?}", path),
            });
        }

        let events = serde_jsonlines::json_lines::<FixEvent, _>(path)
            .map_err(|e| BeelineError::FixLoaderError { source: e })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!("Could not parse fix event in {:?}: {}", path, e);
                BeelineError::FixLoaderError { source: e }
            })?;

        debug!("Loaded {} fix events from {:?}", events.len(), path);
        Ok(Self::from_events(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FixProducer for ReplayFixProducer {
    fn start(&mut self) -> Result<(), BeelineError> {
        // recorded fixes need no location permission
        Ok(())
    }

    fn next_fix(&mut self) -> Result<Option<FixEvent>, BeelineError> {
        let event = self.events.get(self.cur_tick).cloned();
        if event.is_some() {
            self.cur_tick += 1;
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{geo::Coord, signal::FixSource};

    fn event(role: Role, captured_at_millis: i64) -> FixEvent {
        FixEvent::new(
            role,
            GeoFix::new(
                Coord::new(40.0, -74.0),
                8.,
                FixSource::Gps,
                captured_at_millis,
            ),
        )
    }

    #[test]
    fn test_replay_from_events() {
        let mut producer =
            ReplayFixProducer::from_events(vec![event(Role::Seeker, 1), event(Role::Target, 2)]);
        assert!(producer.start().is_ok());
        assert_eq!(producer.next_fix().unwrap().unwrap().role, Role::Seeker);
        assert_eq!(producer.next_fix().unwrap().unwrap().role, Role::Target);
        assert_eq!(producer.next_fix().unwrap(), None);
        assert_eq!(producer.next_fix().unwrap(), None);
    }

    #[test]
    fn test_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"role":"seeker","fix":{{"lat":40.0,"lng":-74.0,"accuracyMeters":6.0,"source":"gps","capturedAtMillis":1000}},"receivedAtMs":1200}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"role":"target","fix":{{"lat":40.0,"lng":-73.999,"accuracyMeters":25.0,"source":"wifi","capturedAtMillis":1100}},"indoor":{{"isIndoor":true,"confidence":0.7}}}}"#
        )
        .unwrap();

        let mut producer = ReplayFixProducer::from_file(file.path()).unwrap();
        assert_eq!(producer.len(), 2);

        let first = producer.next_fix().unwrap().unwrap();
        assert_eq!(first.received_at_ms, Some(1200));
        assert_eq!(first.fix.source, FixSource::Gps);

        let second = producer.next_fix().unwrap().unwrap();
        assert_eq!(second.role, Role::Target);
        assert_eq!(second.received_at_ms, None);
        assert!(second.indoor.is_some());
    }

    #[test]
    fn test_missing_file() {
        let result = ReplayFixProducer::from_file(Path::new("/definitely/not/here.jsonl"));
        assert!(matches!(result, Err(BeelineError::InvalidFixFile { .. })));
    }

    #[test]
    fn test_malformed_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"role\":\"spectator\"}}").unwrap();
        let result = ReplayFixProducer::from_file(file.path());
        assert!(matches!(result, Err(BeelineError::FixLoaderError { .. })));
    }
}
