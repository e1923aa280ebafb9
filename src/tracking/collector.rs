use log::{debug, info, warn};

use crate::{
    BeelineError,
    alerts::{AlertEvent, FeedbackSink, ProximityAlertEngine},
    clock::Clock,
};

use super::{PositionSession, Role, producer::FixProducer};

/// Counters from one run of [`track_fixes`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingSummary {
    pub fixes_ingested: usize,
    pub fixes_rejected: usize,
    pub alerts: Vec<AlertEvent>,
}

/// Pumps fixes from `producer` into `session`, feeding every resulting
/// distance through `engine` and handing alerts to `feedback`.
///
/// Runs until the producer is exhausted. Rejected fixes are bookkeeping only
/// and do not stop tracking.
pub fn track_fixes(
    mut producer: impl FixProducer,
    session: &PositionSession,
    engine: &mut ProximityAlertEngine,
    clock: &dyn Clock,
    feedback: &mut dyn FeedbackSink,
) -> Result<TrackingSummary, BeelineError> {
    // tracking does not begin until location access is granted
    producer.start().inspect_err(|e| warn!("Cannot start tracking: {}", e))?;

    let mut summary = TrackingSummary::default();
    while let Some(event) = producer.next_fix()? {
        let now_ms = event.received_at_ms.unwrap_or_else(|| clock.now_millis());

        if event.role == Role::Seeker && event.indoor.is_some() {
            session.set_indoor_reading(event.indoor);
        }

        match session.ingest(event.fix, event.role) {
            Ok(()) => summary.fixes_ingested += 1,
            Err(BeelineError::FixRejected { role, reason }) => {
                debug!("Skipping {} fix: {}", role, reason);
                summary.fixes_rejected += 1;
                continue;
            }
            Err(e) => return Err(e),
        }

        let Some(sample) = session.distance_sample(now_ms) else {
            continue;
        };
        let events = engine.observe_and_dispatch(&sample, feedback)?;
        summary.alerts.extend(events);
    }

    info!(
        "Tracking {} finished: {} fixes ingested, {} rejected, {} alerts",
        session.target().peer_id,
        summary.fixes_ingested,
        summary.fixes_rejected,
        summary.alerts.len()
    );
    Ok(summary)
}
