pub mod simulation;

use std::sync::{Arc, mpsc::Sender};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    BeelineError,
    tracking::{DistanceSample, Freshness},
};

/// Distance under which the seeker is considered to have arrived
pub const DEFAULT_ARRIVAL_EPSILON_M: f64 = 2.5;

/// One proximity-alert threshold and the feedback to play when it is crossed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProximityTier {
    pub threshold_m: f64,
    pub label: String,
    /// Alternating vibrate/pause durations in milliseconds
    pub haptic_pattern_ms: Vec<u32>,
    pub tone_hz: f32,
    /// Hex color of the visual pulse
    pub color: String,
    /// Phrase spoken by the voice cue
    pub voice_phrase: String,
}

impl ProximityTier {
    pub fn new(
        threshold_m: f64,
        label: &str,
        haptic_pattern_ms: &[u32],
        tone_hz: f32,
        color: &str,
        voice_phrase: &str,
    ) -> Self {
        Self {
            threshold_m,
            label: label.to_string(),
            haptic_pattern_ms: haptic_pattern_ms.to_vec(),
            tone_hz,
            color: color.to_string(),
            voice_phrase: voice_phrase.to_string(),
        }
    }
}

pub fn default_tiers() -> Vec<ProximityTier> {
    vec![
        ProximityTier::new(
            15.,
            "Getting close",
            &[200],
            440.,
            "#f5a623",
            "You're getting close",
        ),
        ProximityTier::new(
            6.,
            "Very close",
            &[200, 100, 200],
            660.,
            "#f8e71c",
            "Very close now",
        ),
        ProximityTier::new(
            3.,
            "Almost there",
            &[100, 50, 100, 50, 300],
            880.,
            "#7ed321",
            "Almost there, look around",
        ),
    ]
}

/// Validated tier list, ordered farthest to nearest.
///
/// Read-only once built and shared between sessions behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct TierTable {
    tiers: Vec<ProximityTier>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

impl TierTable {
    pub fn new(tiers: Vec<ProximityTier>) -> Result<Self, BeelineError> {
        if tiers.is_empty() {
            return Err(BeelineError::InvalidTierTable {
                reason: "at least one tier is required".to_string(),
            });
        }
        if let Some(tier) = tiers
            .iter()
            .find(|t| !t.threshold_m.is_finite() || t.threshold_m <= 0.)
        {
            return Err(BeelineError::InvalidTierTable {
                reason: format!("threshold {} must be a positive distance", tier.threshold_m),
            });
        }
        if let Some(pair) = tiers.windows(2).find(|w| w[1].threshold_m >= w[0].threshold_m) {
            return Err(BeelineError::InvalidTierTable {
                reason: format!(
                    "thresholds must be strictly decreasing but {} follows {}",
                    pair[1].threshold_m, pair[0].threshold_m
                ),
            });
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[ProximityTier] {
        &self.tiers
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.tiers.iter().map(|t| t.threshold_m).collect()
    }
}

/// Thresholds already fired for a session and whether it has arrived.
///
/// Both only ever grow until [`AlertState::reset`] is called for a new target.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertState {
    triggered_thresholds: Vec<f64>,
    arrived: bool,
}

impl AlertState {
    pub fn is_triggered(&self, threshold_m: f64) -> bool {
        self.triggered_thresholds.contains(&threshold_m)
    }

    /// Records the threshold, returning false if it was already there.
    pub fn mark_triggered(&mut self, threshold_m: f64) -> bool {
        if self.is_triggered(threshold_m) {
            return false;
        }
        self.triggered_thresholds.push(threshold_m);
        true
    }

    pub fn triggered_thresholds(&self) -> &[f64] {
        &self.triggered_thresholds
    }

    pub fn arrived(&self) -> bool {
        self.arrived
    }

    /// Sets arrived, returning false if it was already set.
    pub fn mark_arrived(&mut self) -> bool {
        !std::mem::replace(&mut self.arrived, true)
    }

    pub fn reset(&mut self) {
        self.triggered_thresholds.clear();
        self.arrived = false;
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertPhase {
    /// No usable distance yet
    Idle,
    /// Distance known, no tier crossed
    Approaching,
    /// Number of tiers fired so far
    ThresholdsFiring(usize),
    Arrived,
}

/// Whether an alert came from real fixes or from an operator simulation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertOrigin {
    Live,
    Simulated,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum AlertEvent {
    Fired {
        tier: ProximityTier,
        distance_m: f64,
        origin: AlertOrigin,
    },
    Arrived {
        distance_m: f64,
        origin: AlertOrigin,
    },
}

impl AlertEvent {
    pub fn origin(&self) -> AlertOrigin {
        match self {
            AlertEvent::Fired { origin, .. } | AlertEvent::Arrived { origin, .. } => *origin,
        }
    }

    /// Threshold of a fired tier, `None` for arrival.
    pub fn threshold_m(&self) -> Option<f64> {
        match self {
            AlertEvent::Fired { tier, .. } => Some(tier.threshold_m),
            AlertEvent::Arrived { .. } => None,
        }
    }
}

impl std::fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.origin() {
            AlertOrigin::Live => "",
            AlertOrigin::Simulated => " (simulated)",
        };
        match self {
            AlertEvent::Fired {
                tier, distance_m, ..
            } => write!(
                f,
                "{} [{} m] at {:.1} m{}",
                tier.label, tier.threshold_m, distance_m, tag
            ),
            AlertEvent::Arrived { distance_m, .. } => {
                write!(f, "Arrived at {:.1} m{}", distance_m, tag)
            }
        }
    }
}

/// Receives alert events and performs the vibration, tone, voice and visual
/// pulse. Playback is entirely the sink's business.
pub trait FeedbackSink {
    fn deliver(&mut self, event: &AlertEvent) -> Result<(), BeelineError>;
}

/// Feedback sink that only writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn deliver(&mut self, event: &AlertEvent) -> Result<(), BeelineError> {
        info!("{}", event);
        Ok(())
    }
}

/// Feedback sink forwarding alerts to another thread.
pub struct ChannelFeedback {
    sender: Sender<AlertEvent>,
}

impl ChannelFeedback {
    pub fn new(sender: Sender<AlertEvent>) -> Self {
        Self { sender }
    }
}

impl FeedbackSink for ChannelFeedback {
    fn deliver(&mut self, event: &AlertEvent) -> Result<(), BeelineError> {
        self.sender.send(event.clone())?;
        Ok(())
    }
}

/// Proximity state machine for one position session.
///
/// Replaying the same ordered distances through a fresh engine always yields
/// the same ordered alerts.
#[derive(Debug)]
pub struct ProximityAlertEngine {
    tiers: Arc<TierTable>,
    arrival_epsilon_m: f64,
    state: AlertState,
    phase: AlertPhase,
}

impl ProximityAlertEngine {
    pub fn new(tiers: Arc<TierTable>) -> Self {
        Self::with_arrival_epsilon(tiers, DEFAULT_ARRIVAL_EPSILON_M)
    }

    pub fn with_arrival_epsilon(tiers: Arc<TierTable>, arrival_epsilon_m: f64) -> Self {
        Self {
            tiers,
            arrival_epsilon_m,
            state: AlertState::default(),
            phase: AlertPhase::Idle,
        }
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Feeds a distance computed from real fixes.
    ///
    /// Stale samples never fire anything, so a frozen last-known position
    /// cannot produce a false arrival.
    pub fn observe(&mut self, sample: &DistanceSample) -> Vec<AlertEvent> {
        if sample.freshness == Freshness::Stale {
            debug!(
                "Ignoring stale distance sample of {:.1} m captured at {}",
                sample.meters, sample.captured_at_ms
            );
            return Vec::new();
        }
        self.step(sample.meters, AlertOrigin::Live)
    }

    /// Feeds an operator-injected distance. Alerts are tagged as simulated.
    pub fn observe_simulated(&mut self, distance_m: f64) -> Vec<AlertEvent> {
        self.step(distance_m, AlertOrigin::Simulated)
    }

    /// Observes and hands every resulting alert to `sink`, in order.
    pub fn observe_and_dispatch(
        &mut self,
        sample: &DistanceSample,
        sink: &mut dyn FeedbackSink,
    ) -> Result<Vec<AlertEvent>, BeelineError> {
        let events = self.observe(sample);
        for event in &events {
            sink.deliver(event)?;
        }
        Ok(events)
    }

    /// Clears all alert bookkeeping, for when the seeker switches target.
    pub fn reset(&mut self) {
        self.state.reset();
        self.phase = AlertPhase::Idle;
    }

    fn step(&mut self, distance_m: f64, origin: AlertOrigin) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        if self.state.arrived() || !distance_m.is_finite() || distance_m < 0. {
            return events;
        }

        if self.phase == AlertPhase::Idle {
            self.phase = AlertPhase::Approaching;
        }

        for tier in self.tiers.tiers() {
            // recorded before the event leaves the engine so a retried
            // delivery can never fire the same tier twice
            if distance_m <= tier.threshold_m && self.state.mark_triggered(tier.threshold_m) {
                info!(
                    "Proximity tier {} m fired at {:.1} m ({:?})",
                    tier.threshold_m, distance_m, origin
                );
                events.push(AlertEvent::Fired {
                    tier: tier.clone(),
                    distance_m,
                    origin,
                });
                self.phase = AlertPhase::ThresholdsFiring(self.state.triggered_thresholds().len());
            }
        }

        if distance_m < self.arrival_epsilon_m && self.state.mark_arrived() {
            info!("Arrived at {:.1} m ({:?})", distance_m, origin);
            events.push(AlertEvent::Arrived { distance_m, origin });
            self.phase = AlertPhase::Arrived;
        }

        events
    }
}
