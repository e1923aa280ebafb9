//! Directions provider wire contract and HTTP client.
//!
//! Responses follow the Directions API JSON layout:
//!
//! ```text
//! { "status": "OK",
//!   "routes": [ { "legs": [ { "distance": {"value": 312}, "duration": {"value": 240},
//!                             "steps": [ { "html_instructions": "Head <b>east</b>",
//!                                          "distance": {"value": 80}, "duration": {"value": 60},
//!                                          "maneuver": "turn-left",
//!                                          "end_location": {"lat": 40.0, "lng": -73.99},
//!                                          "polyline": {"points": "..."} } ] } ] } ] }
//! ```

use std::future::Future;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BeelineError, geo::Coord};

pub const DEFAULT_DIRECTIONS_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/directions/json";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walking,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionsRequest {
    pub origin: Coord,
    pub destination: Coord,
    pub mode: TravelMode,
}

impl DirectionsRequest {
    pub fn walking(origin: Coord, destination: Coord) -> Self {
        Self {
            origin,
            destination,
            mode: TravelMode::Walking,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WireValue {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireLatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WirePolyline {
    pub points: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireStep {
    #[serde(default)]
    pub html_instructions: String,
    #[serde(default)]
    pub distance: WireValue,
    #[serde(default)]
    pub duration: WireValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maneuver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_location: Option<WireLatLng>,
    #[serde(default)]
    pub polyline: WirePolyline,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireLeg {
    #[serde(default)]
    pub distance: WireValue,
    #[serde(default)]
    pub duration: WireValue,
    #[serde(default)]
    pub steps: Vec<WireStep>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireRoute {
    #[serde(default)]
    pub legs: Vec<WireLeg>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DirectionsResponse {
    pub status: String,
    #[serde(default)]
    pub routes: Vec<WireRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DirectionsResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// An external walking-directions service.
pub trait DirectionsProvider: Send + Sync {
    /// Fetches routes for `request`.
    ///
    /// Implementations only report transport-level failures; an empty or
    /// non-OK response is judged by the caller.
    fn directions(
        &self,
        request: &DirectionsRequest,
    ) -> impl Future<Output = Result<DirectionsResponse, BeelineError>> + Send;
}

/// Directions provider speaking the Directions API over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpDirectionsProvider {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpDirectionsProvider {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, BeelineError> {
        let endpoint = Url::parse(endpoint).map_err(|e| BeelineError::InvalidConfig {
            field: "directions_endpoint".to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("beeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BeelineError::RouteFetchFailed {
                reason: format!("could not build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn request_url(&self, request: &DirectionsRequest) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("origin", &request.origin.to_string())
                .append_pair("destination", &request.destination.to_string())
                .append_pair("mode", request.mode.as_str());
            if let Some(key) = &self.api_key {
                query.append_pair("key", key);
            }
        }
        url
    }
}

impl DirectionsProvider for HttpDirectionsProvider {
    async fn directions(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsResponse, BeelineError> {
        let url = self.request_url(request);
        debug!(
            "Requesting walking directions {} -> {}",
            request.origin, request.destination
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BeelineError::RouteFetchFailed {
                reason: format!("network error: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Directions provider returned HTTP {}", status);
            return Err(BeelineError::RouteFetchFailed {
                reason: format!("provider returned HTTP {}", status),
            });
        }

        let body = response
            .json::<DirectionsResponse>()
            .await
            .map_err(|e| BeelineError::RouteFetchFailed {
                reason: format!("invalid provider response: {}", e),
            })?;
        trace!(
            "Directions response status {} with {} route(s)",
            body.status,
            body.routes.len()
        );
        Ok(body)
    }
}
