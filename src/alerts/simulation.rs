use log::info;

use super::{AlertEvent, ProximityAlertEngine};

pub const DEFAULT_START_M: f64 = 20.;
pub const DEFAULT_STEP_M: f64 = 5.;

/// Operator-driven walk towards the target used to exercise the alert engine
/// without real fixes.
///
/// Yields `start_m`, `start_m - step_m`, ... down to zero.
#[derive(Clone, Debug)]
pub struct SimulatedApproach {
    next_m: Option<f64>,
    step_m: f64,
}

impl Default for SimulatedApproach {
    fn default() -> Self {
        Self::new(DEFAULT_START_M, DEFAULT_STEP_M)
    }
}

impl SimulatedApproach {
    pub fn new(start_m: f64, step_m: f64) -> Self {
        let valid = start_m.is_finite() && start_m >= 0. && step_m.is_finite() && step_m > 0.;
        Self {
            next_m: valid.then_some(start_m),
            step_m,
        }
    }

    /// Runs the whole walk through `engine`, returning every alert raised.
    pub fn run(self, engine: &mut ProximityAlertEngine) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for distance_m in self {
            let step_events = engine.observe_simulated(distance_m);
            info!(
                "Simulated distance {:.1} m raised {} alert(s)",
                distance_m,
                step_events.len()
            );
            events.extend(step_events);
        }
        events
    }
}

impl Iterator for SimulatedApproach {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let current = self.next_m?;
        self.next_m = if current > 0. {
            Some((current - self.step_m).max(0.))
        } else {
            None
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alerts::{AlertOrigin, TierTable};

    #[test]
    fn test_default_walk() {
        let distances: Vec<f64> = SimulatedApproach::default().collect();
        assert_eq!(distances, vec![20., 15., 10., 5., 0.]);
    }

    #[test]
    fn test_walk_clamps_at_zero() {
        let distances: Vec<f64> = SimulatedApproach::new(7., 3.).collect();
        assert_eq!(distances, vec![7., 4., 1., 0.]);
    }

    #[test]
    fn test_invalid_walk_is_empty() {
        assert_eq!(SimulatedApproach::new(20., 0.).count(), 0);
        assert_eq!(SimulatedApproach::new(-1., 5.).count(), 0);
    }

    #[test]
    fn test_simulation_fires_all_tiers_tagged() {
        let mut engine = ProximityAlertEngine::new(Arc::new(TierTable::default()));
        let events = SimulatedApproach::default().run(&mut engine);
        let thresholds: Vec<Option<f64>> = events.iter().map(|e| e.threshold_m()).collect();
        assert_eq!(thresholds, vec![Some(15.), Some(6.), Some(3.), None]);
        assert!(events.iter().all(|e| e.origin() == AlertOrigin::Simulated));
    }
}
