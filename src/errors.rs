// Error types for beeline

use crate::alerts::AlertEvent;
use crate::tracking::Role;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum BeelineError {
    // Position ingestion bookkeeping, never shown to the user
    #[snafu(display("Fix rejected for {role}: {reason}"))]
    FixRejected { role: Role, reason: String },

    // Errors from the directions provider
    #[snafu(display("Failed to get directions: {reason}"))]
    RouteFetchFailed { reason: String },

    // Errors from the geolocation collaborator
    #[snafu(display("Location unavailable: {reason}"))]
    GeolocationUnavailable { reason: String },
    #[snafu(display("Location permission denied, enable location access and retry"))]
    PermissionDenied,

    // Proximity tier table errors
    #[snafu(display("Invalid proximity tiers: {reason}"))]
    InvalidTierTable { reason: String },

    // Config management errors
    #[snafu(display("Invalid configuration: {field} - {reason}"))]
    InvalidConfig { field: String, reason: String },
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Fix replay errors
    #[snafu(display("Invalid fix file: {path}"))]
    InvalidFixFile { path: String },
    #[snafu(display("Error loading fix file"))]
    FixLoaderError { source: io::Error },

    // Errors while writing and broadcasting alerts
    #[snafu(display("Error writing alert log"))]
    WriterError { source: io::Error },
    #[snafu(display("Error broadcasting alert"))]
    AlertBroadcastError { source: Box<SendError<AlertEvent>> },
}

impl BeelineError {
    /// Whether the error should be surfaced to the user with a retry affordance.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            BeelineError::RouteFetchFailed { .. }
                | BeelineError::GeolocationUnavailable { .. }
                | BeelineError::PermissionDenied
        )
    }
}

impl From<SendError<AlertEvent>> for BeelineError {
    fn from(value: SendError<AlertEvent>) -> Self {
        BeelineError::AlertBroadcastError {
            source: Box::new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_errors() {
        assert!(
            BeelineError::RouteFetchFailed {
                reason: "empty route".to_string()
            }
            .is_user_visible()
        );
        assert!(BeelineError::PermissionDenied.is_user_visible());
        assert!(
            !BeelineError::FixRejected {
                role: Role::Seeker,
                reason: "older than stored fix".to_string()
            }
            .is_user_visible()
        );
    }

    #[test]
    fn test_route_fetch_failed_message() {
        let err = BeelineError::RouteFetchFailed {
            reason: "ZERO_RESULTS".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to get directions: ZERO_RESULTS");
    }
}
