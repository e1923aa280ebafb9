pub mod collector;
pub mod producer;

use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock,
    atomic::{AtomicI64, Ordering},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    BeelineError,
    geo,
    signal::{GeoFix, IndoorReading, SignalHistory, SignalReport, SignalSample, classifier},
};

pub use collector::track_fixes;

/// Fixes younger than this are live
pub const LIVE_MAX_AGE_MS: i64 = 30_000;
/// Fixes younger than this are recent, anything older is stale
pub const RECENT_MAX_AGE_MS: i64 = 120_000;

/// Which party a fix belongs to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seeker,
    Target,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Seeker => write!(f, "seeker"),
            Role::Target => write!(f, "target"),
        }
    }
}

/// Qualitative age bucket of a fix. Ordered from best to worst.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Live,
    Recent,
    Stale,
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Freshness::Live => write!(f, "Live"),
            Freshness::Recent => write!(f, "Recent"),
            Freshness::Stale => write!(f, "Stale"),
        }
    }
}

/// Age thresholds used to bucket fixes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreshnessThresholds {
    pub live_max_age_ms: i64,
    pub recent_max_age_ms: i64,
}

impl Default for FreshnessThresholds {
    fn default() -> Self {
        Self {
            live_max_age_ms: LIVE_MAX_AGE_MS,
            recent_max_age_ms: RECENT_MAX_AGE_MS,
        }
    }
}

impl FreshnessThresholds {
    /// Fixes stamped in the future (clock skew between devices) count as live.
    pub fn classify(&self, fix: &GeoFix, now_ms: i64) -> Freshness {
        let age_ms = now_ms - fix.captured_at_millis;
        if age_ms < self.live_max_age_ms {
            Freshness::Live
        } else if age_ms < self.recent_max_age_ms {
            Freshness::Recent
        } else {
            Freshness::Stale
        }
    }
}

/// Display details of the peer being tracked.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerProfile {
    pub peer_id: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

impl PeerProfile {
    pub fn new(peer_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }
}

/// A distance reading together with how trustworthy its inputs are.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceSample {
    pub meters: f64,
    /// The worse freshness of the two contributing fixes
    pub freshness: Freshness,
    /// Capture time of the newer contributing fix
    pub captured_at_ms: i64,
}

/// One seeker tracking one target inside one event.
///
/// Seeker and target fixes are written by independent producers. Each role
/// only ever replaces its own slot, and the shared history ring sits behind a
/// mutex, so `ingest` can be called from both producers at once.
#[derive(Debug)]
pub struct PositionSession {
    event_id: String,
    target: PeerProfile,
    seeker_fix: RwLock<Option<GeoFix>>,
    target_fix: RwLock<Option<GeoFix>>,
    seeker_indoor: RwLock<Option<IndoorReading>>,
    history: Mutex<SignalHistory>,
    last_updated_at_ms: AtomicI64,
    freshness: FreshnessThresholds,
}

impl PositionSession {
    pub fn new(event_id: impl Into<String>, target: PeerProfile) -> Self {
        Self::with_settings(
            event_id,
            target,
            crate::signal::DEFAULT_HISTORY_CAPACITY,
            FreshnessThresholds::default(),
        )
    }

    pub fn with_settings(
        event_id: impl Into<String>,
        target: PeerProfile,
        history_capacity: usize,
        freshness: FreshnessThresholds,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            target,
            seeker_fix: RwLock::new(None),
            target_fix: RwLock::new(None),
            seeker_indoor: RwLock::new(None),
            history: Mutex::new(SignalHistory::with_capacity(history_capacity)),
            last_updated_at_ms: AtomicI64::new(0),
            freshness,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn target(&self) -> &PeerProfile {
        &self.target
    }

    /// Stores a fix for `role`.
    ///
    /// A fix captured before the one already stored for the same role is
    /// rejected and leaves the session untouched.
    pub fn ingest(&self, fix: GeoFix, role: Role) -> Result<(), BeelineError> {
        if !fix.lat.is_finite() || !fix.lng.is_finite() {
            debug!("Rejecting non-finite {} fix for {}", role, self.target.peer_id);
            return Err(BeelineError::FixRejected {
                role,
                reason: "non-finite coordinate".to_string(),
            });
        }

        {
            let mut slot = write_lock(self.slot(role));
            if let Some(current) = slot.as_ref() {
                if fix.captured_at_millis < current.captured_at_millis {
                    debug!(
                        "Rejecting out-of-order {} fix for {}: captured at {} but holding {}",
                        role, self.target.peer_id, fix.captured_at_millis, current.captured_at_millis
                    );
                    return Err(BeelineError::FixRejected {
                        role,
                        reason: format!(
                            "captured at {} which is older than stored fix at {}",
                            fix.captured_at_millis, current.captured_at_millis
                        ),
                    });
                }
            }
            *slot = Some(fix);
        }

        lock(&self.history).push(SignalSample::from(&fix));
        self.last_updated_at_ms
            .fetch_max(fix.captured_at_millis, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_indoor_reading(&self, reading: Option<IndoorReading>) {
        *write_lock(&self.seeker_indoor) = reading;
    }

    pub fn fix(&self, role: Role) -> Option<GeoFix> {
        *read_lock(self.slot(role))
    }

    /// Capture time of the newest fix ingested for either role, 0 if none.
    pub fn last_updated_at(&self) -> i64 {
        self.last_updated_at_ms.load(Ordering::SeqCst)
    }

    pub fn current_distance(&self) -> Option<f64> {
        let (seeker, target) = self.both_fixes()?;
        Some(geo::distance_meters(seeker.coord(), target.coord()))
    }

    /// Bearing from seeker to target; `None` until both fixes exist or when
    /// both stand on the same spot.
    pub fn current_bearing(&self) -> Option<f64> {
        let (seeker, target) = self.both_fixes()?;
        geo::initial_bearing_degrees(seeker.coord(), target.coord())
    }

    /// Rotation for the finder arrow given the device compass heading.
    pub fn arrow_rotation(&self, device_heading: Option<f64>) -> Option<f64> {
        self.current_bearing()
            .map(|bearing| geo::relative_rotation(bearing, device_heading))
    }

    pub fn freshness_of(&self, fix: &GeoFix, now_ms: i64) -> Freshness {
        self.freshness.classify(fix, now_ms)
    }

    /// Freshness of the stored fix for `role`; stale when there is none.
    pub fn role_freshness(&self, role: Role, now_ms: i64) -> Freshness {
        self.fix(role)
            .map(|fix| self.freshness_of(&fix, now_ms))
            .unwrap_or(Freshness::Stale)
    }

    /// Distance plus the freshness gate the alert engine needs.
    pub fn distance_sample(&self, now_ms: i64) -> Option<DistanceSample> {
        let (seeker, target) = self.both_fixes()?;
        let freshness = self
            .freshness_of(&seeker, now_ms)
            .max(self.freshness_of(&target, now_ms));
        Some(DistanceSample {
            meters: geo::distance_meters(seeker.coord(), target.coord()),
            freshness,
            captured_at_ms: seeker.captured_at_millis.max(target.captured_at_millis),
        })
    }

    pub fn signal_report(&self) -> SignalReport {
        let seeker_accuracy = self.fix(Role::Seeker).map(|f| f.accuracy_meters);
        let indoor = *read_lock(&self.seeker_indoor);
        classifier::report(&lock(&self.history), seeker_accuracy, indoor.as_ref())
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    /// Copy of the history ring, oldest first.
    pub fn history_snapshot(&self) -> Vec<SignalSample> {
        lock(&self.history).iter().copied().collect()
    }

    fn slot(&self, role: Role) -> &RwLock<Option<GeoFix>> {
        match role {
            Role::Seeker => &self.seeker_fix,
            Role::Target => &self.target_fix,
        }
    }

    fn both_fixes(&self) -> Option<(GeoFix, GeoFix)> {
        Some((self.fix(Role::Seeker)?, self.fix(Role::Target)?))
    }
}

// A panic while holding one of these locks cannot leave a fix half-written,
// so a poisoned lock is still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
