// Replays recorded fix streams end to end: JSON lines in, alerts through the
// channel feedback, alert log out.

use std::{path::Path, sync::mpsc, thread};

use beeline::alerts::{AlertEvent, ChannelFeedback, LogFeedback};
use beeline::clock::ManualClock;
use beeline::geo::{self, Coord};
use beeline::signal::{FixSource, GeoFix, IndoorReading, SignalQuality};
use beeline::tracking::producer::{FixEvent, ReplayFixProducer};
use beeline::tracking::{PeerProfile, Role, track_fixes};
use beeline::{BeelineError, TrackerConfig, writer};

const START_MS: i64 = 1_700_000_000_000;

fn target_spot() -> Coord {
    Coord::new(40.0, -73.999)
}

/// Target stands still while the seeker closes in from 40 m, one fix per
/// second, with a few out-of-order fixes mixed in.
fn recorded_walk() -> Vec<FixEvent> {
    let mut events = vec![
        FixEvent::new(
            Role::Target,
            GeoFix::new(target_spot(), 6., FixSource::Gps, START_MS),
        )
        .received_at(START_MS),
    ];

    for (i, distance_m) in [40., 30., 14., 10., 5., 2., 3., 1.].into_iter().enumerate() {
        let at_ms = START_MS + (i as i64 + 1) * 1_000;
        let position = geo::offset(target_spot(), 180., distance_m);
        let mut event = FixEvent::new(
            Role::Seeker,
            GeoFix::new(position, 12. - i as f64, FixSource::Gps, at_ms),
        )
        .received_at(at_ms);
        if i == 0 {
            event.indoor = Some(IndoorReading {
                is_indoor: true,
                confidence: 0.8,
            });
        }
        events.push(event);

        if i == 3 {
            // a late duplicate from the beginning of the walk
            events.push(
                FixEvent::new(
                    Role::Seeker,
                    GeoFix::new(position, 20., FixSource::Network, START_MS),
                )
                .received_at(at_ms),
            );
        }
    }
    events
}

fn write_recording(path: &Path, events: &[FixEvent]) {
    serde_jsonlines::write_json_lines(path, events).unwrap();
}

#[test]
fn test_replay_file_through_alert_log() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("walk.jsonl");
    let output = dir.path().join("alerts.jsonl");
    write_recording(&input, &recorded_walk());

    let config = TrackerConfig::default();
    let session = config.position_session("event-9", PeerProfile::new("peer-3", "Sam"));
    let mut engine = config.alert_engine(config.tier_table().unwrap());
    let clock = ManualClock::new(0);

    let (alert_tx, alert_rx) = mpsc::channel();
    let writer_output = output.clone();
    let writer_handle = thread::spawn(move || writer::write_alerts(&writer_output, alert_rx));

    let producer = ReplayFixProducer::from_file(&input).unwrap();
    assert_eq!(producer.len(), 10);
    let mut feedback = ChannelFeedback::new(alert_tx);
    let summary = track_fixes(producer, &session, &mut engine, &clock, &mut feedback).unwrap();
    drop(feedback);

    assert_eq!(summary.fixes_ingested, 9);
    assert_eq!(summary.fixes_rejected, 1);
    let thresholds: Vec<Option<f64>> = summary.alerts.iter().map(|e| e.threshold_m()).collect();
    assert_eq!(thresholds, vec![Some(15.), Some(6.), Some(3.), None]);

    assert_eq!(writer_handle.join().unwrap().unwrap(), 4);
    let logged: Vec<AlertEvent> = serde_jsonlines::json_lines(&output)
        .unwrap()
        .collect::<std::io::Result<_>>()
        .unwrap();
    assert_eq!(logged, summary.alerts);

    let report = session.signal_report();
    assert_eq!(report.quality, SignalQuality::Good);
    assert!(report.indoor);
    assert_eq!(session.history_len(), 9);
}

#[test]
fn test_replay_without_receive_times_uses_clock() {
    let events: Vec<FixEvent> = recorded_walk()
        .into_iter()
        .map(|mut e| {
            e.received_at_ms = None;
            e
        })
        .collect();

    let config = TrackerConfig::default();
    let session = config.position_session("event-9", PeerProfile::new("peer-3", "Sam"));
    let mut engine = config.alert_engine(config.tier_table().unwrap());
    // an hour after the recording everything is stale
    let clock = ManualClock::new(START_MS + 3_600_000);

    let summary = track_fixes(
        ReplayFixProducer::from_events(events),
        &session,
        &mut engine,
        &clock,
        &mut LogFeedback,
    )
    .unwrap();

    assert_eq!(summary.fixes_ingested, 9);
    assert!(summary.alerts.is_empty());
    assert!(!engine.state().arrived());
}

#[test]
fn test_recording_format_is_camel_case() {
    let line = r#"{"role":"target","fix":{"lat":40.0,"lng":-73.999,"accuracyMeters":6.0,"source":"wifi","capturedAtMillis":1700000000000},"receivedAtMs":1700000000500}"#;
    let event: FixEvent = serde_json::from_str(line).unwrap();
    assert_eq!(event.role, Role::Target);
    assert_eq!(event.fix.source, FixSource::Wifi);
    assert_eq!(event.received_at_ms, Some(1_700_000_000_500));
    assert!(event.indoor.is_none());
}

#[test]
fn test_missing_recording_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let result = ReplayFixProducer::from_file(&dir.path().join("nope.jsonl"));
    assert!(matches!(result, Err(BeelineError::InvalidFixFile { .. })));
}
