use std::{path::Path, sync::Arc, time::Duration};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    BeelineError,
    alerts::{
        DEFAULT_ARRIVAL_EPSILON_M, ProximityAlertEngine, ProximityTier, TierTable, default_tiers,
    },
    routing::{RouteSettings, provider::DEFAULT_DIRECTIONS_ENDPOINT},
    signal::DEFAULT_HISTORY_CAPACITY,
    tracking::{FreshnessThresholds, PeerProfile, PositionSession},
};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "beeline";
const MAX_HISTORY_CAPACITY: usize = 1000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub history_capacity: usize,
    pub freshness: FreshnessThresholds,
    pub arrival_epsilon_m: f64,
    pub tiers: Vec<ProximityTier>,
    pub route_refresh_interval_s: u64,
    pub directions_timeout_s: u64,
    pub directions_endpoint: String,
    pub directions_api_key: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            freshness: FreshnessThresholds::default(),
            arrival_epsilon_m: DEFAULT_ARRIVAL_EPSILON_M,
            tiers: default_tiers(),
            route_refresh_interval_s: 30,
            directions_timeout_s: 10,
            directions_endpoint: DEFAULT_DIRECTIONS_ENDPOINT.to_string(),
            directions_api_key: None,
        }
    }
}

impl TrackerConfig {
    /// Loads the config from the user's config directory, `None` if there is
    /// no config file yet.
    pub fn from_local_file() -> Result<Option<Self>, BeelineError> {
        let config_path = dirs::config_dir()
            .ok_or(BeelineError::NoConfigDir)?
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::from_file(&config_path).map(Some)
        } else {
            debug!("No config file at {:?}, using defaults", config_path);
            Ok(None)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BeelineError> {
        let file =
            std::fs::File::open(path).map_err(|e| BeelineError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| BeelineError::ConfigSerializeError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), BeelineError> {
        let config_path = dirs::config_dir()
            .ok_or(BeelineError::NoConfigDir)?
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), BeelineError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BeelineError::ConfigIOError { source: e })?;
        }

        let file =
            std::fs::File::create(path).map_err(|e| BeelineError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| BeelineError::ConfigSerializeError { source: e })
    }

    pub fn validate(&self) -> Result<(), BeelineError> {
        if self.history_capacity == 0 || self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(BeelineError::InvalidConfig {
                field: "history_capacity".to_string(),
                reason: format!("must be between 1 and {}", MAX_HISTORY_CAPACITY),
            });
        }
        if self.freshness.live_max_age_ms <= 0
            || self.freshness.recent_max_age_ms <= self.freshness.live_max_age_ms
        {
            return Err(BeelineError::InvalidConfig {
                field: "freshness".to_string(),
                reason: "live age must be positive and below the recent age".to_string(),
            });
        }
        if !self.arrival_epsilon_m.is_finite() || self.arrival_epsilon_m < 0. {
            return Err(BeelineError::InvalidConfig {
                field: "arrival_epsilon_m".to_string(),
                reason: "must be a non-negative distance".to_string(),
            });
        }
        if self.route_refresh_interval_s == 0 || self.directions_timeout_s == 0 {
            return Err(BeelineError::InvalidConfig {
                field: "route_refresh_interval_s".to_string(),
                reason: "refresh interval and timeout must be at least one second".to_string(),
            });
        }
        TierTable::new(self.tiers.clone())?;
        Ok(())
    }

    pub fn tier_table(&self) -> Result<Arc<TierTable>, BeelineError> {
        TierTable::new(self.tiers.clone()).map(Arc::new)
    }

    pub fn route_settings(&self) -> RouteSettings {
        RouteSettings {
            refresh_interval: Duration::from_secs(self.route_refresh_interval_s),
            fetch_timeout: Duration::from_secs(self.directions_timeout_s),
        }
    }

    pub fn position_session(&self, event_id: &str, target: PeerProfile) -> PositionSession {
        PositionSession::with_settings(event_id, target, self.history_capacity, self.freshness)
    }

    pub fn alert_engine(&self, tiers: Arc<TierTable>) -> ProximityAlertEngine {
        ProximityAlertEngine::with_arrival_epsilon(tiers, self.arrival_epsilon_m)
    }
}
