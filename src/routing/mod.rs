pub mod link;
pub mod polyline;
pub mod provider;
pub mod session;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    BeelineError,
    geo::{self, Coord},
};

use provider::{DirectionsResponse, WireStep};

pub use provider::{DirectionsProvider, DirectionsRequest, HttpDirectionsProvider};
pub use session::{RouteSession, RouteSettings};

/// Straight-line progress towards the destination, as a fraction of the
/// current step's planned distance, needed to move to the next step.
const STEP_PROGRESS_RATIO: f64 = 0.5;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ManeuverKind {
    Depart,
    Straight,
    TurnLeft,
    TurnRight,
    TurnSlightLeft,
    TurnSlightRight,
    TurnSharpLeft,
    TurnSharpRight,
    KeepLeft,
    KeepRight,
    UturnLeft,
    UturnRight,
    RoundaboutLeft,
    RoundaboutRight,
    Arrive,
    Other(String),
}

impl ManeuverKind {
    /// Maps the provider's maneuver tag; steps without one continue straight.
    pub fn from_wire(maneuver: Option<&str>) -> Self {
        match maneuver {
            None | Some("") | Some("straight") => ManeuverKind::Straight,
            Some("turn-left") => ManeuverKind::TurnLeft,
            Some("turn-right") => ManeuverKind::TurnRight,
            Some("turn-slight-left") => ManeuverKind::TurnSlightLeft,
            Some("turn-slight-right") => ManeuverKind::TurnSlightRight,
            Some("turn-sharp-left") => ManeuverKind::TurnSharpLeft,
            Some("turn-sharp-right") => ManeuverKind::TurnSharpRight,
            Some("keep-left") | Some("fork-left") | Some("ramp-left") => ManeuverKind::KeepLeft,
            Some("keep-right") | Some("fork-right") | Some("ramp-right") => {
                ManeuverKind::KeepRight
            }
            Some("uturn-left") => ManeuverKind::UturnLeft,
            Some("uturn-right") => ManeuverKind::UturnRight,
            Some("roundabout-left") => ManeuverKind::RoundaboutLeft,
            Some("roundabout-right") => ManeuverKind::RoundaboutRight,
            Some(other) => ManeuverKind::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RouteStep {
    pub instruction: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub maneuver: ManeuverKind,
    pub end_location: Option<Coord>,
    /// Decoded step geometry, empty if the provider sent none
    pub geometry: Vec<Coord>,
}

impl RouteStep {
    fn from_wire(step: &WireStep, first: bool) -> Self {
        let geometry = polyline::decode(&step.polyline.points).unwrap_or_else(|| {
            debug!("Dropping undecodable step geometry");
            Vec::new()
        });
        let maneuver = match ManeuverKind::from_wire(step.maneuver.as_deref()) {
            ManeuverKind::Straight if first => ManeuverKind::Depart,
            other => other,
        };
        Self {
            instruction: plain_instruction(&step.html_instructions),
            distance_m: step.distance.value,
            duration_s: step.duration.value,
            maneuver,
            end_location: step.end_location.map(|l| Coord::new(l.lat, l.lng)),
            geometry,
        }
    }
}

/// A walking route. Never holds zero steps, and every distance and duration
/// is finite and non-negative.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RoutePlanRecord")]
pub struct RoutePlan {
    steps: Vec<RouteStep>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
    pub fetched_at_ms: i64,
}

impl RoutePlan {
    pub fn new(
        steps: Vec<RouteStep>,
        total_distance_m: f64,
        total_duration_s: f64,
        fetched_at_ms: i64,
    ) -> Result<Self, BeelineError> {
        if steps.is_empty() {
            return Err(BeelineError::RouteFetchFailed {
                reason: "route has no steps".to_string(),
            });
        }
        check_quantity("total distance", total_distance_m)?;
        check_quantity("total duration", total_duration_s)?;
        for (i, step) in steps.iter().enumerate() {
            check_quantity(&format!("step {} distance", i + 1), step.distance_m)?;
            check_quantity(&format!("step {} duration", i + 1), step.duration_s)?;
        }
        Ok(Self {
            steps,
            total_distance_m,
            total_duration_s,
            fetched_at_ms,
        })
    }

    /// Builds a plan from the first route of a provider response.
    pub fn from_response(
        response: &DirectionsResponse,
        fetched_at_ms: i64,
    ) -> Result<Self, BeelineError> {
        if !response.is_ok() {
            let reason = match &response.error_message {
                Some(message) => format!("{}: {}", response.status, message),
                None => response.status.clone(),
            };
            return Err(BeelineError::RouteFetchFailed { reason });
        }

        let route = response
            .routes
            .first()
            .ok_or_else(|| BeelineError::RouteFetchFailed {
                reason: "provider returned no routes".to_string(),
            })?;

        let steps = route
            .legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .enumerate()
            .map(|(i, step)| RouteStep::from_wire(step, i == 0))
            .collect_vec();
        let total_distance_m = route.legs.iter().map(|l| l.distance.value).sum();
        let total_duration_s = route.legs.iter().map(|l| l.duration.value).sum();

        Self::new(steps, total_distance_m, total_duration_s, fetched_at_ms)
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }
}

fn check_quantity(what: &str, value: f64) -> Result<(), BeelineError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(BeelineError::RouteFetchFailed {
            reason: format!("route {} is not a valid quantity: {}", what, value),
        })
    }
}

/// Serialized form of a plan, validated on the way back in.
#[derive(Deserialize)]
struct RoutePlanRecord {
    steps: Vec<RouteStep>,
    total_distance_m: f64,
    total_duration_s: f64,
    fetched_at_ms: i64,
}

impl TryFrom<RoutePlanRecord> for RoutePlan {
    type Error = BeelineError;

    fn try_from(record: RoutePlanRecord) -> Result<Self, Self::Error> {
        RoutePlan::new(
            record.steps,
            record.total_distance_m,
            record.total_duration_s,
            record.fetched_at_ms,
        )
    }
}

/// Navigation state for one route session, independent of any I/O.
#[derive(Clone, Debug, Default)]
pub struct RouteState {
    origin: Option<Coord>,
    destination: Option<Coord>,
    plan: Option<RoutePlan>,
    current_step_index: usize,
    last_fetch_at_ms: Option<i64>,
    eta_ms: Option<i64>,
    /// Straight-line distance to the destination when the current step began
    step_anchor_m: Option<f64>,
    last_position: Option<Coord>,
}

impl RouteState {
    /// Installs a freshly fetched plan, replacing any previous one wholesale.
    pub fn apply_plan(&mut self, origin: Coord, destination: Coord, plan: RoutePlan) {
        self.origin = Some(origin);
        self.destination = Some(destination);
        self.last_fetch_at_ms = Some(plan.fetched_at_ms);
        // the float to int cast saturates, so only the addition can overflow
        let duration_ms = (plan.total_duration_s * 1000.).round() as i64;
        self.eta_ms = Some(plan.fetched_at_ms.saturating_add(duration_ms));
        self.current_step_index = 0;
        self.step_anchor_m = self
            .last_position
            .map(|position| geo::distance_meters(position, destination));
        debug!(
            "Route plan installed: {} steps, {:.0} m, {:.0} s",
            plan.steps.len(),
            plan.total_distance_m,
            plan.total_duration_s
        );
        self.plan = Some(plan);
    }

    /// Moves to the next step once the seeker has made enough straight-line
    /// progress towards the destination. Returns whether the step changed.
    ///
    /// This is a proximity approximation, not off-route detection.
    pub fn advance_if_reached(&mut self, position: Coord) -> bool {
        self.last_position = Some(position);
        let (Some(plan), Some(destination)) = (&self.plan, self.destination) else {
            return false;
        };

        let remaining_m = geo::distance_meters(position, destination);
        let Some(anchor_m) = self.step_anchor_m else {
            self.step_anchor_m = Some(remaining_m);
            return false;
        };

        if self.current_step_index >= plan.last_index() {
            return false;
        }

        let step = &plan.steps[self.current_step_index];
        let progress_m = anchor_m - remaining_m;
        if progress_m >= step.distance_m * STEP_PROGRESS_RATIO {
            self.current_step_index = (self.current_step_index + 1).min(plan.last_index());
            self.step_anchor_m = Some(remaining_m);
            debug!(
                "Advanced to route step {} with {:.0} m to go",
                self.current_step_index, remaining_m
            );
            return true;
        }
        false
    }

    pub fn plan(&self) -> Option<&RoutePlan> {
        self.plan.as_ref()
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn current_step(&self) -> Option<&RouteStep> {
        self.plan
            .as_ref()
            .and_then(|plan| plan.steps.get(self.current_step_index))
    }

    pub fn last_fetch_at_ms(&self) -> Option<i64> {
        self.last_fetch_at_ms
    }

    /// Arrival time as of the last successful fetch.
    pub fn eta_millis(&self) -> Option<i64> {
        self.eta_ms
    }

    /// Straight-line distance from the last known position to the destination.
    pub fn remaining_distance_m(&self) -> Option<f64> {
        Some(geo::distance_meters(self.last_position?, self.destination?))
    }

    /// Planned walking distance of the current and remaining steps.
    pub fn remaining_route_distance_m(&self) -> Option<f64> {
        let plan = self.plan.as_ref()?;
        Some(
            plan.steps[self.current_step_index..]
                .iter()
                .map(|s| s.distance_m)
                .sum(),
        )
    }

    pub fn destination(&self) -> Option<Coord> {
        self.destination
    }

    /// Request used to re-plan from wherever the seeker is now.
    pub fn refresh_request(&self) -> Option<DirectionsRequest> {
        let destination = self.destination?;
        let origin = self.last_position.or(self.origin)?;
        Some(DirectionsRequest::walking(origin, destination))
    }
}

/// Turns provider HTML instructions into plain text.
fn plain_instruction(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                // block tags separate sentences
                text.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::provider::{WireLeg, WirePolyline, WireRoute, WireValue};

    fn wire_step(instruction: &str, distance: f64, duration: f64, maneuver: Option<&str>) -> WireStep {
        WireStep {
            html_instructions: instruction.to_string(),
            distance: WireValue {
                value: distance,
                text: None,
            },
            duration: WireValue {
                value: duration,
                text: None,
            },
            maneuver: maneuver.map(str::to_string),
            end_location: None,
            polyline: WirePolyline {
                points: "_p~iF~ps|U".to_string(),
            },
        }
    }

    fn response(routes: Vec<WireRoute>) -> DirectionsResponse {
        DirectionsResponse {
            status: "OK".to_string(),
            routes,
            error_message: None,
        }
    }

    fn route(steps: Vec<WireStep>, distance: f64, duration: f64) -> WireRoute {
        WireRoute {
            legs: vec![WireLeg {
                distance: WireValue {
                    value: distance,
                    text: None,
                },
                duration: WireValue {
                    value: duration,
                    text: None,
                },
                steps,
            }],
        }
    }

    fn step(distance_m: f64) -> RouteStep {
        RouteStep {
            instruction: "Walk".to_string(),
            distance_m,
            duration_s: distance_m,
            maneuver: ManeuverKind::Straight,
            end_location: None,
            geometry: Vec::new(),
        }
    }

    #[test]
    fn test_plan_from_first_route_only() {
        let first = route(
            vec![
                wire_step("Head <b>east</b> on <b>Main St</b>", 60., 45., None),
                wire_step("Turn <b>left</b>", 40., 30., Some("turn-left")),
            ],
            100.,
            75.,
        );
        let second = route(vec![wire_step("Other", 500., 400., None)], 500., 400.);

        let plan = RoutePlan::from_response(&response(vec![first, second]), 1_000).unwrap();

        assert_eq!(plan.steps().len(), 2);
        assert_eq!(plan.total_distance_m, 100.);
        assert_eq!(plan.total_duration_s, 75.);
        assert_eq!(plan.steps()[0].instruction, "Head east on Main St");
        assert_eq!(plan.steps()[0].maneuver, ManeuverKind::Depart);
        assert_eq!(plan.steps()[1].maneuver, ManeuverKind::TurnLeft);
        assert_eq!(plan.steps()[0].geometry.len(), 1);
    }

    #[test]
    fn test_empty_route_is_fetch_failure() {
        let result = RoutePlan::from_response(&response(Vec::new()), 0);
        assert!(matches!(result, Err(BeelineError::RouteFetchFailed { .. })));

        let result = RoutePlan::from_response(&response(vec![route(Vec::new(), 0., 0.)]), 0);
        assert!(matches!(result, Err(BeelineError::RouteFetchFailed { .. })));
    }

    #[test]
    fn test_provider_error_is_fetch_failure() {
        let response = DirectionsResponse {
            status: "ZERO_RESULTS".to_string(),
            routes: Vec::new(),
            error_message: None,
        };
        let err = RoutePlan::from_response(&response, 0).unwrap_err();
        assert_eq!(err.to_string(), "Failed to get directions: ZERO_RESULTS");
    }

    #[test]
    fn test_invalid_quantities_rejected() {
        for duration in [f64::NAN, f64::INFINITY, -1.] {
            let result = RoutePlan::new(vec![step(100.)], 100., duration, 0);
            assert!(matches!(result, Err(BeelineError::RouteFetchFailed { .. })));
        }
        let result = RoutePlan::new(vec![step(100.), step(-5.)], 95., 60., 0);
        assert!(matches!(result, Err(BeelineError::RouteFetchFailed { .. })));

        let bad_leg = route(vec![wire_step("Walk", 50., 40., None)], 50., f64::INFINITY);
        let result = RoutePlan::from_response(&response(vec![bad_leg]), 0);
        assert!(matches!(result, Err(BeelineError::RouteFetchFailed { .. })));
    }

    #[test]
    fn test_eta_saturates_on_huge_duration() {
        let mut state = RouteState::default();
        let plan = RoutePlan::new(vec![step(1.)], 1., 1e300, 1_700_000_000_000).unwrap();
        state.apply_plan(Coord::new(40.0, -74.0), Coord::new(40.0, -73.999), plan);
        assert_eq!(state.eta_millis(), Some(i64::MAX));
    }

    #[test]
    fn test_deserialized_plan_is_validated() {
        let plan = RoutePlan::new(vec![step(100.)], 100., 90., 10_000).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        assert_eq!(serde_json::from_str::<RoutePlan>(&json).unwrap(), plan);

        let empty = r#"{"steps":[],"total_distance_m":0.0,"total_duration_s":0.0,"fetched_at_ms":0}"#;
        assert!(serde_json::from_str::<RoutePlan>(empty).is_err());
    }

    #[test]
    fn test_eta_from_fetch_time() {
        let mut state = RouteState::default();
        let plan = RoutePlan::new(vec![step(100.)], 100., 90., 10_000).unwrap();
        state.apply_plan(Coord::new(40.0, -74.0), Coord::new(40.0, -73.999), plan);
        assert_eq!(state.eta_millis(), Some(100_000));
        assert_eq!(state.last_fetch_at_ms(), Some(10_000));
    }

    #[test]
    fn test_advance_on_progress_and_clamp() {
        let origin = Coord::new(40.0, -74.0);
        let destination = geo::offset(origin, 90., 100.);
        let mut state = RouteState::default();
        let plan = RoutePlan::new(vec![step(40.), step(40.), step(20.)], 100., 80., 0).unwrap();
        state.apply_plan(origin, destination, plan);

        // first position only anchors the step
        assert!(!state.advance_if_reached(origin));
        assert_eq!(state.current_step_index(), 0);

        // 10 m of progress is not enough for a 40 m step
        assert!(!state.advance_if_reached(geo::offset(origin, 90., 10.)));
        assert!(state.advance_if_reached(geo::offset(origin, 90., 25.)));
        assert_eq!(state.current_step_index(), 1);

        assert!(state.advance_if_reached(geo::offset(origin, 90., 50.)));
        assert_eq!(state.current_step_index(), 2);

        // already on the last step
        assert!(!state.advance_if_reached(destination));
        assert_eq!(state.current_step_index(), 2);
        assert!(state.remaining_distance_m().unwrap() < 0.01);
        assert_eq!(state.remaining_route_distance_m(), Some(20.));
    }

    #[test]
    fn test_apply_plan_resets_step() {
        let origin = Coord::new(40.0, -74.0);
        let destination = geo::offset(origin, 0., 200.);
        let mut state = RouteState::default();
        state.apply_plan(
            origin,
            destination,
            RoutePlan::new(vec![step(20.), step(180.)], 200., 150., 0).unwrap(),
        );
        state.advance_if_reached(origin);
        state.advance_if_reached(geo::offset(origin, 0., 30.));
        assert_eq!(state.current_step_index(), 1);

        state.apply_plan(
            origin,
            destination,
            RoutePlan::new(vec![step(170.)], 170., 120., 5_000).unwrap(),
        );
        assert_eq!(state.current_step_index(), 0);
        assert_eq!(state.plan().unwrap().steps().len(), 1);

        // re-plans from the latest position
        let request = state.refresh_request().unwrap();
        assert!(geo::distance_meters(request.origin, geo::offset(origin, 0., 30.)) < 0.01);
    }

    #[test]
    fn test_plain_instruction() {
        assert_eq!(
            plain_instruction("Turn <b>right</b> onto <b>5th Ave</b><div style=\"x\">Destination will be on the left</div>"),
            "Turn right onto 5th Ave Destination will be on the left"
        );
        assert_eq!(plain_instruction("Cross&nbsp;A &amp; B"), "Cross A & B");
    }

    #[test]
    fn test_maneuver_mapping() {
        assert_eq!(ManeuverKind::from_wire(None), ManeuverKind::Straight);
        assert_eq!(ManeuverKind::from_wire(Some("fork-right")), ManeuverKind::KeepRight);
        assert_eq!(
            ManeuverKind::from_wire(Some("ferry")),
            ManeuverKind::Other("ferry".to_string())
        );
    }
}
