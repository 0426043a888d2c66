//! Nearby points of interest around a listing.
//!
//! One nearby-places search (plus at most one continuation page), ranked
//! closest-first by great-circle distance. Only the closest place gets a
//! walking-duration lookup; every further lookup would be another paid
//! call per listing per category.

use std::sync::Arc;
use std::time::Duration;

use listing_enrich_geo::{CoordinateColumns, distances_miles};
use listing_enrich_models::{Coordinate, NearbyPlace, ProximityResult, TravelMode};

use crate::retry::ResilientCaller;
use crate::types::{Place, PlaceQuery, PlacesRequest};
use crate::{MapsClient, MapsError};

/// Default search radius (about two miles).
pub const DEFAULT_RADIUS_METERS: u32 = 3200;

/// Places at or under this distance count as walkable.
pub const WALKABLE_MILES: f64 = 0.5;

/// Wait before using a continuation token; the provider rejects tokens
/// used immediately after they are issued.
pub const DEFAULT_PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);

/// Place categories searched by keyword rather than by place type.
pub const DEFAULT_KEYWORD_QUERIES: &[&str] =
    &["Whole Foods", "Trader Joe's", "Chicago Public Library"];

/// A place with a known coordinate and its distance from the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPlace {
    /// Display name.
    pub name: String,
    /// Place location.
    pub coordinate: Coordinate,
    /// Distance from the origin in miles.
    pub distance_miles: f64,
}

/// Resolves nearby places of a category.
pub struct ProximityResolver {
    client: Arc<dyn MapsClient>,
    caller: ResilientCaller,
    keyword_queries: Vec<String>,
    page_token_delay: Duration,
}

impl ProximityResolver {
    /// Creates a resolver with the default keyword list and page-token
    /// delay.
    #[must_use]
    pub fn new(client: Arc<dyn MapsClient>, caller: ResilientCaller) -> Self {
        Self {
            client,
            caller,
            keyword_queries: DEFAULT_KEYWORD_QUERIES
                .iter()
                .map(ToString::to_string)
                .collect(),
            page_token_delay: DEFAULT_PAGE_TOKEN_DELAY,
        }
    }

    /// Replaces the categories searched by keyword.
    #[must_use]
    pub fn with_keyword_queries(mut self, keyword_queries: Vec<String>) -> Self {
        self.keyword_queries = keyword_queries;
        self
    }

    /// Replaces the wait before fetching a continuation page.
    #[must_use]
    pub const fn with_page_token_delay(mut self, delay: Duration) -> Self {
        self.page_token_delay = delay;
        self
    }

    /// The query used for a category: keyword for named chains and
    /// institutions, place type otherwise.
    #[must_use]
    pub fn query_for(&self, category: &str) -> PlaceQuery {
        if self.keyword_queries.iter().any(|k| k == category) {
            PlaceQuery::Keyword(category.to_string())
        } else {
            PlaceQuery::Type(category.to_string())
        }
    }

    /// Resolves nearby places, degrading to the empty
    /// [`ProximityResult::default`] on failure.
    pub async fn resolve(
        &self,
        origin: Coordinate,
        category: &str,
        radius_meters: u32,
    ) -> ProximityResult {
        self.try_resolve(origin, category, radius_meters)
            .await
            .unwrap_or_default()
    }

    /// Resolves nearby places, returning `None` if the search itself
    /// failed.
    pub async fn try_resolve(
        &self,
        origin: Coordinate,
        category: &str,
        radius_meters: u32,
    ) -> Option<ProximityResult> {
        let request = PlacesRequest {
            location: origin,
            radius_meters,
            query: self.query_for(category),
        };

        let request = &request;
        let label = format!("places_nearby {category} @ {origin}");
        let places = self
            .caller
            .try_call(&label, move || self.fetch_places(request))
            .await?;

        if places.is_empty() {
            log::debug!("No {category} places near {origin}");
            return Some(ProximityResult::default());
        }

        let ranked = rank_places(origin, &places);
        let Some(closest) = ranked.first() else {
            return Some(ProximityResult::default());
        };

        let destination = closest.coordinate;
        let walk_label = format!("walking duration to {}", closest.name);
        let closest_walk_duration = self
            .caller
            .call(&walk_label, None, move || {
                self.walking_duration(origin, destination)
            })
            .await;

        Some(summarize(&ranked, closest_walk_duration))
    }

    /// First page of results plus, if offered, one continuation page.
    async fn fetch_places(&self, request: &PlacesRequest) -> Result<Vec<Place>, MapsError> {
        let first = self.client.places_nearby(request).await?;
        let mut places = first.results;

        if let Some(token) = first.next_page_token.filter(|t| !t.is_empty()) {
            self.caller.sleeper().sleep(self.page_token_delay).await;
            let next = self
                .client
                .places_nearby(&PlacesRequest {
                    location: request.location,
                    radius_meters: request.radius_meters,
                    query: PlaceQuery::PageToken(token),
                })
                .await?;
            places.extend(next.results);
        }

        Ok(places)
    }

    async fn walking_duration(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Option<String>, MapsError> {
        let matrix = self
            .client
            .distance_matrix(
                &[origin.to_string()],
                &[destination.to_string()],
                TravelMode::Walking,
            )
            .await?;
        Ok(matrix.first_duration_text())
    }
}

/// Canonical cache key for a nearby-places lookup.
#[must_use]
pub fn cache_key(origin: Coordinate, category: &str, radius_meters: u32) -> String {
    format!("places|{origin}|{}|{radius_meters}", category.trim())
}

/// Drops places without coordinates and sorts the rest closest-first.
#[must_use]
pub fn rank_places(origin: Coordinate, places: &[Place]) -> Vec<RankedPlace> {
    let located: Vec<(&Place, Coordinate)> = places
        .iter()
        .filter_map(|p| p.coordinate().map(|c| (p, c)))
        .collect();

    let skipped = places.len() - located.len();
    if skipped > 0 {
        log::debug!("Skipped {skipped} places without coordinates");
    }

    let columns: CoordinateColumns = located.iter().map(|(_, c)| *c).collect();
    let distances = distances_miles(origin, &columns);

    let mut ranked: Vec<RankedPlace> = located
        .into_iter()
        .zip(distances)
        .map(|((place, coordinate), distance_miles)| RankedPlace {
            name: place.name.clone().unwrap_or_default(),
            coordinate,
            distance_miles,
        })
        .collect();

    ranked.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));
    ranked
}

/// Builds the proximity record from closest-first places.
#[must_use]
pub fn summarize(ranked: &[RankedPlace], closest_walk_duration: Option<String>) -> ProximityResult {
    let Some(closest) = ranked.first() else {
        return ProximityResult::default();
    };

    ProximityResult {
        closest_name: Some(closest.name.clone()),
        closest_distance_miles: Some(closest.distance_miles),
        closest_walk_duration,
        count_within_half_mile: ranked
            .iter()
            .filter(|p| p.distance_miles <= WALKABLE_MILES)
            .count(),
        nearby_places: ranked
            .iter()
            .map(|p| NearbyPlace {
                name: p.name.clone(),
                distance_miles: p.distance_miles,
            })
            .collect(),
    }
}
