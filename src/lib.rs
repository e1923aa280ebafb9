// Library interface for beeline
// This allows the binary and integration tests to share the core modules

pub mod alerts;
pub mod clock;
pub mod config;
pub mod errors;
pub mod geo;
pub mod roster;
pub mod routing;
pub mod signal;
pub mod tracking;
pub mod writer;

// Re-export commonly used types
pub use alerts::{AlertEvent, FeedbackSink, ProximityAlertEngine, ProximityTier, TierTable};
pub use config::TrackerConfig;
pub use errors::BeelineError;
pub use geo::Coord;
pub use roster::RosterEntry;
pub use routing::{RoutePlan, RouteSession};
pub use signal::{FixSource, GeoFix, SignalReport};
pub use tracking::{Freshness, PeerProfile, PositionSession, Role};
