use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, info, warn};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{BeelineError, clock::Clock, geo::Coord};

use super::{DirectionsProvider, DirectionsRequest, RoutePlan, RouteState, RouteStep};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteSettings {
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

struct Shared<P> {
    provider: P,
    clock: Arc<dyn Clock>,
    settings: RouteSettings,
    state: Mutex<RouteState>,
    cancel: CancellationToken,
}

/// A walking-route session against an external directions provider.
///
/// Fetches run as cancellable tasks on the tokio runtime and the plan is
/// re-fetched on a fixed interval while the session lives. Tearing the
/// session down (explicitly or by dropping it) cancels any in-flight fetch
/// and the refresh timer; nothing fires afterwards.
pub struct RouteSession<P: DirectionsProvider + 'static> {
    shared: Arc<Shared<P>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl<P: DirectionsProvider + 'static> RouteSession<P> {
    pub fn new(provider: P, clock: Arc<dyn Clock>, settings: RouteSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                clock,
                settings,
                state: Mutex::new(RouteState::default()),
                cancel: CancellationToken::new(),
            }),
            refresher: Mutex::new(None),
        }
    }

    /// Fetches a route and starts the periodic refresh.
    ///
    /// On failure any previous plan is kept and the error is returned for the
    /// user. If the session is torn down while the fetch is in flight the
    /// result is discarded and `Ok` is returned.
    pub async fn start(&self, origin: Coord, destination: Coord) -> Result<(), BeelineError> {
        let request = DirectionsRequest::walking(origin, destination);
        match fetch_plan(&self.shared, &request).await {
            Ok(Some(plan)) => {
                info!(
                    "Route to {} ready: {} steps, {:.0} m",
                    destination,
                    plan.steps().len(),
                    plan.total_distance_m
                );
                lock(&self.shared.state).apply_plan(origin, destination, plan);
                self.ensure_refresher();
                Ok(())
            }
            Ok(None) => {
                debug!("Route session torn down while starting");
                Ok(())
            }
            Err(e) => {
                warn!("Could not start route to {}: {}", destination, e);
                Err(e)
            }
        }
    }

    /// Re-plans from the latest known position.
    ///
    /// Returns `Ok(false)` when there is nothing to refresh or the session is
    /// torn down. The background timer calls this and swallows failures.
    pub async fn refresh(&self) -> Result<bool, BeelineError> {
        refresh_once(&self.shared).await
    }

    pub fn advance_if_reached(&self, position: Coord) -> bool {
        lock(&self.shared.state).advance_if_reached(position)
    }

    pub fn eta_millis(&self) -> Option<i64> {
        lock(&self.shared.state).eta_millis()
    }

    pub fn remaining_distance_m(&self) -> Option<f64> {
        lock(&self.shared.state).remaining_distance_m()
    }

    pub fn current_step(&self) -> Option<RouteStep> {
        lock(&self.shared.state).current_step().cloned()
    }

    pub fn current_step_index(&self) -> usize {
        lock(&self.shared.state).current_step_index()
    }

    pub fn plan(&self) -> Option<RoutePlan> {
        lock(&self.shared.state).plan().cloned()
    }

    /// Copy of the full navigation state.
    pub fn snapshot(&self) -> RouteState {
        lock(&self.shared.state).clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Stops the refresh timer and abandons any in-flight fetch.
    pub fn teardown(&self) {
        if !self.shared.cancel.is_cancelled() {
            debug!("Tearing down route session");
        }
        self.shared.cancel.cancel();
        if let Some(handle) = lock(&self.refresher).take() {
            handle.abort();
        }
    }

    fn ensure_refresher(&self) {
        let mut refresher = lock(&self.refresher);
        if refresher.is_some() || self.shared.cancel.is_cancelled() {
            return;
        }
        let shared = self.shared.clone();
        *refresher = Some(tokio::spawn(refresh_loop(shared)));
    }
}

impl<P: DirectionsProvider + 'static> Drop for RouteSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn refresh_loop<P: DirectionsProvider>(shared: Arc<Shared<P>>) {
    let period = shared.settings.refresh_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // failures stay quiet and are retried on the next tick
        if let Err(e) = refresh_once(&shared).await {
            warn!("Route refresh failed, retrying in {:?}: {}", period, e);
        }
    }
    debug!("Route refresh loop stopped");
}

async fn refresh_once<P: DirectionsProvider>(shared: &Shared<P>) -> Result<bool, BeelineError> {
    let Some(request) = lock(&shared.state).refresh_request() else {
        return Ok(false);
    };

    match fetch_plan(shared, &request).await? {
        Some(plan) => {
            let mut state = lock(&shared.state);
            // the destination may have been changed by a concurrent start
            if state.destination() != Some(request.destination) {
                return Ok(false);
            }
            state.apply_plan(request.origin, request.destination, plan);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Fetches and validates a plan. `Ok(None)` means the session was torn down.
async fn fetch_plan<P: DirectionsProvider>(
    shared: &Shared<P>,
    request: &DirectionsRequest,
) -> Result<Option<RoutePlan>, BeelineError> {
    if shared.cancel.is_cancelled() {
        return Ok(None);
    }

    let timeout = shared.settings.fetch_timeout;
    let response = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => return Ok(None),
        response = time::timeout(timeout, shared.provider.directions(request)) => response,
    };

    let response = response.map_err(|_| BeelineError::RouteFetchFailed {
        reason: format!("no response within {:?}", timeout),
    })??;

    RoutePlan::from_response(&response, shared.clock.now_millis()).map(Some)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
