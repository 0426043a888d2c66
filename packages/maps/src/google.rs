//! Google Maps web-service client.
//!
//! See <https://developers.google.com/maps/documentation/directions/get-directions>,
//! <https://developers.google.com/maps/documentation/places/web-service/search-nearby>
//! and <https://developers.google.com/maps/documentation/distance-matrix/distance-matrix>.
//!
//! Every endpoint answers HTTP 200 and reports failures in the body's
//! `status` field, so status handling lives in [`check_status`].

use std::time::Duration;

use async_trait::async_trait;
use listing_enrich_models::TravelMode;
use serde::Deserialize;

use crate::types::{DirectionsRequest, DistanceMatrix, PlaceQuery, PlacesPage, PlacesRequest, Route};
use crate::{ApiStatus, MapsClient, MapsError};

/// Base URL of the Google Maps web services.
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`MapsClient`] backed by the Google Maps HTTP APIs.
pub struct GoogleMapsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for GoogleMapsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleMapsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GoogleMapsClient {
    /// Creates a client for `base_url` (no trailing slash needed).
    ///
    /// # Errors
    ///
    /// Returns [`MapsError::Unexpected`] if `api_key` is blank, or
    /// [`MapsError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MapsError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MapsError::Unexpected {
                message: "Maps API key is empty".to_string(),
            });
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, MapsError> {
        let url = format!("{}/{endpoint}/json", self.base_url);
        params.push(("key", self.api_key.clone()));

        log::trace!("GET {url}");

        let resp = self.http.get(&url).query(&params).send().await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MapsError::Api {
                status: ApiStatus::OverQueryLimit,
                message: format!("HTTP 429 from {endpoint}"),
            });
        }

        let body: serde_json::Value = resp.error_for_status()?.json().await?;
        check_status(&body)?;
        Ok(serde_json::from_value(body)?)
    }
}

#[derive(Deserialize)]
struct DirectionsBody {
    #[serde(default)]
    routes: Vec<Route>,
}

#[async_trait]
impl MapsClient for GoogleMapsClient {
    async fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Route>, MapsError> {
        let body: DirectionsBody = self
            .get_json("directions", directions_params(request))
            .await?;
        Ok(body.routes)
    }

    async fn places_nearby(&self, request: &PlacesRequest) -> Result<PlacesPage, MapsError> {
        self.get_json("place/nearbysearch", places_params(request))
            .await
    }

    async fn distance_matrix(
        &self,
        origins: &[String],
        destinations: &[String],
        mode: TravelMode,
    ) -> Result<DistanceMatrix, MapsError> {
        self.get_json(
            "distancematrix",
            vec![
                ("origins", origins.join("|")),
                ("destinations", destinations.join("|")),
                ("mode", mode.as_ref().to_string()),
            ],
        )
        .await
    }
}

/// Maps a response body's `status` to `Ok` or [`MapsError::Api`].
///
/// `OK` and `ZERO_RESULTS` both succeed; an empty result is an answer,
/// not a failure.
///
/// # Errors
///
/// Returns [`MapsError::Api`] for any other status (including a missing
/// one), carrying the body's `error_message` when present.
pub fn check_status(body: &serde_json::Value) -> Result<(), MapsError> {
    let status = body
        .get("status")
        .and_then(serde_json::Value::as_str)
        .map_or(ApiStatus::Unrecognized, ApiStatus::from_code);

    if status.is_success() {
        return Ok(());
    }

    let message = body
        .get("error_message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(MapsError::Api { status, message })
}

/// Query parameters for a directions request.
#[must_use]
pub fn directions_params(request: &DirectionsRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("origin", request.origin.clone()),
        ("destination", request.destination.clone()),
        ("mode", request.mode.as_ref().to_string()),
    ];
    if let Some(departure) = request.departure_time {
        params.push(("departure_time", departure.query_value()));
    }
    params
}

/// Query parameters for a nearby-places request. A continuation request
/// carries only the page token.
#[must_use]
pub fn places_params(request: &PlacesRequest) -> Vec<(&'static str, String)> {
    let location = || {
        vec![
            ("location", request.location.to_string()),
            ("radius", request.radius_meters.to_string()),
        ]
    };

    match &request.query {
        PlaceQuery::PageToken(token) => vec![("pagetoken", token.clone())],
        PlaceQuery::Type(place_type) => {
            let mut params = location();
            params.push(("type", place_type.clone()));
            params
        }
        PlaceQuery::Keyword(keyword) => {
            let mut params = location();
            params.push(("keyword", keyword.clone()));
            params
        }
    }
}
