#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Live maps-provider features for listings.
//!
//! - [`MapsClient`] abstracts the three provider capabilities the
//!   pipeline needs (directions, nearby places, distance matrix).
//!   [`google::GoogleMapsClient`] implements it over HTTP.
//! - [`retry::ResilientCaller`] runs a provider call with bounded
//!   exponential backoff on quota/auth denials and degrades to a typed
//!   default instead of failing.
//! - [`commute::CommuteResolver`] and [`proximity::ProximityResolver`]
//!   turn provider responses into [`listing_enrich_models`] feature
//!   records.

pub mod commute;
pub mod google;
pub mod proximity;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use listing_enrich_models::TravelMode;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use types::{DirectionsRequest, DistanceMatrix, PlacesPage, PlacesRequest, Route};

/// Status codes reported in provider response bodies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiStatus {
    /// Request succeeded.
    Ok,
    /// Request succeeded but matched nothing.
    ZeroResults,
    /// An origin, destination or waypoint could not be geocoded.
    NotFound,
    /// Key missing, invalid, or not authorised for this API.
    RequestDenied,
    /// Rate or quota limit hit.
    OverQueryLimit,
    /// Daily quota or billing limit hit.
    OverDailyLimit,
    /// Malformed request.
    InvalidRequest,
    /// Provider-side failure; may succeed on a later attempt.
    UnknownError,
    /// A status this client does not recognise.
    Unrecognized,
}

impl ApiStatus {
    /// Parses a status string, mapping unknown values to
    /// [`ApiStatus::Unrecognized`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        code.parse().unwrap_or(Self::Unrecognized)
    }

    /// Returns `true` for statuses carrying a usable (possibly empty) body.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::ZeroResults)
    }

    /// Returns `true` for the quota/auth-denied class that is worth
    /// retrying with backoff.
    #[must_use]
    pub const fn is_quota_or_denied(self) -> bool {
        matches!(
            self,
            Self::RequestDenied | Self::OverQueryLimit | Self::OverDailyLimit
        )
    }
}

/// Errors from maps-provider calls.
#[derive(Debug, thiserror::Error)]
pub enum MapsError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// Provider status code.
        status: ApiStatus,
        /// Provider error message, if any.
        message: String,
    },

    /// Anything else (missing credentials, malformed route, ...).
    #[error("Unexpected error: {message}")]
    Unexpected {
        /// Description of what went wrong.
        message: String,
    },
}

impl MapsError {
    /// Returns the provider status for [`MapsError::Api`] errors.
    #[must_use]
    pub const fn status(&self) -> Option<ApiStatus> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The maps-provider capabilities used by the resolvers.
///
/// Implementations must be `Send + Sync` so a single client can serve
/// listings enriched concurrently.
#[async_trait]
pub trait MapsClient: Send + Sync {
    /// Returns candidate routes from origin to destination, best first.
    /// An empty vector means no route exists.
    ///
    /// # Errors
    ///
    /// Returns [`MapsError`] if the request fails or is rejected.
    async fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Route>, MapsError>;

    /// Returns one page of places near a location.
    ///
    /// # Errors
    ///
    /// Returns [`MapsError`] if the request fails or is rejected.
    async fn places_nearby(&self, request: &PlacesRequest) -> Result<PlacesPage, MapsError>;

    /// Returns travel durations for every origin/destination pair.
    ///
    /// # Errors
    ///
    /// Returns [`MapsError`] if the request fails or is rejected.
    async fn distance_matrix(
        &self,
        origins: &[String],
        destinations: &[String],
        mode: TravelMode,
    ) -> Result<DistanceMatrix, MapsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(ApiStatus::from_code("OK"), ApiStatus::Ok);
        assert_eq!(
            ApiStatus::from_code("OVER_QUERY_LIMIT"),
            ApiStatus::OverQueryLimit
        );
        assert_eq!(
            ApiStatus::from_code("REQUEST_DENIED"),
            ApiStatus::RequestDenied
        );
        assert_eq!(ApiStatus::from_code("SOMETHING_NEW"), ApiStatus::Unrecognized);
    }

    #[test]
    fn quota_class() {
        assert!(ApiStatus::OverQueryLimit.is_quota_or_denied());
        assert!(ApiStatus::RequestDenied.is_quota_or_denied());
        assert!(!ApiStatus::InvalidRequest.is_quota_or_denied());
        assert!(!ApiStatus::UnknownError.is_quota_or_denied());
    }
}
