#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-listing enrichment.
//!
//! For each listing the [`Enricher`] computes crime and affordable-housing
//! features from in-memory datasets, then resolves one commute per
//! configured destination and one proximity summary per configured place
//! category. Every live lookup checks the TTL cache first; on a miss it
//! goes through the resilient caller and writes a real answer back. A
//! degraded answer (retries exhausted, fatal provider error) is returned
//! to the listing but never cached.
//!
//! Nothing here fails per listing: a listing whose lookups all fail still
//! gets a complete record with unavailable features.

pub mod config;
pub mod io;
pub mod progress;

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use listing_enrich_cache::TtlCache;
use listing_enrich_maps::commute::CommuteResolver;
use listing_enrich_maps::google::GoogleMapsClient;
use listing_enrich_maps::proximity::{self, ProximityResolver};
use listing_enrich_maps::retry::ResilientCaller;
use listing_enrich_maps::types::{DepartureTime, DirectionsRequest};
use listing_enrich_maps::{MapsClient, MapsError};
use listing_enrich_models::{
    DirectionsResult, EnrichedListing, Listing, ProximityResult, TravelMode,
};
use listing_enrich_scoring::{DatasetError, GeoScorer};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{CategoryConfig, ConfigError, DestinationConfig, EnrichConfig};
use crate::progress::ProgressCallback;

/// Errors from setting up or running a batch.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A dataset could not be loaded.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The maps client could not be built.
    #[error(transparent)]
    Maps(#[from] MapsError),

    /// Listings CSV could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File IO failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listings file lacks a required column.
    #[error("Listings file is missing required column '{column}'")]
    MissingColumn {
        /// Expected column name.
        column: &'static str,
    },
}

/// A commute destination with its departure time resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Column prefix.
    pub name: String,
    /// Address or `lat,lng`.
    pub address: String,
    /// Travel mode.
    pub mode: TravelMode,
    /// Explicit departure, if configured.
    pub departure_time: Option<DepartureTime>,
}

impl TryFrom<&DestinationConfig> for Destination {
    type Error = ConfigError;

    fn try_from(config: &DestinationConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            name: config.name.clone(),
            address: config.address.clone(),
            mode: config.mode,
            departure_time: config.departure()?,
        })
    }
}

/// A place category to search around each listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCategory {
    /// Column prefix.
    pub name: String,
    /// Place type or keyword sent to the provider.
    pub query: String,
    /// Search radius in metres.
    pub radius_meters: u32,
}

impl From<&CategoryConfig> for PlaceCategory {
    fn from(config: &CategoryConfig) -> Self {
        Self {
            name: config.name.clone(),
            query: config.query().to_string(),
            radius_meters: config.radius_meters(),
        }
    }
}

/// Enriches listings.
pub struct Enricher {
    scorer: GeoScorer,
    cache: Option<TtlCache>,
    commute: Option<CommuteResolver>,
    proximity: Option<ProximityResolver>,
    destinations: Vec<Destination>,
    categories: Vec<PlaceCategory>,
    concurrency: usize,
}

impl Enricher {
    /// Creates an enricher with static scoring only: no cache, no live
    /// resolvers, sequential processing.
    #[must_use]
    pub const fn new(scorer: GeoScorer) -> Self {
        Self {
            scorer,
            cache: None,
            commute: None,
            proximity: None,
            destinations: Vec::new(),
            categories: Vec::new(),
            concurrency: 1,
        }
    }

    /// Builds the full enricher described by `config`.
    ///
    /// Without an API key in the configured environment variable the live
    /// resolvers are disabled and their features stay unavailable. A cache
    /// that cannot be opened (for example, locked by another process) is
    /// logged and the run proceeds uncached.
    ///
    /// # Errors
    ///
    /// * If a dataset cannot be loaded
    /// * If a destination has an invalid departure time
    /// * If the HTTP client cannot be built
    pub fn from_config(config: &EnrichConfig) -> Result<Self, PipelineError> {
        let scorer = GeoScorer::load(
            config.datasets.crime_csv.as_deref(),
            config.datasets.affordable_csv.as_deref(),
        )?;

        let destinations = config
            .commute
            .destinations
            .iter()
            .map(Destination::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let categories = config
            .proximity
            .categories
            .iter()
            .map(PlaceCategory::from)
            .collect();

        let mut enricher = Self::new(scorer).with_concurrency(config.concurrency);
        match TtlCache::open(&config.cache.path, &config.cache.table, config.cache.ttl()) {
            Ok(cache) => enricher = enricher.with_cache(cache),
            Err(e) => log::warn!(
                "Failed to open cache {}: {e}; continuing without caching",
                config.cache.path.display()
            ),
        }

        let Some(api_key) = config.maps.api_key() else {
            log::warn!(
                "{} is not set; commute and proximity features will be unavailable",
                config.maps.api_key_env
            );
            return Ok(enricher);
        };

        let client: Arc<dyn MapsClient> = Arc::new(GoogleMapsClient::new(
            api_key,
            config.maps.base_url.clone(),
            config.maps.timeout(),
        )?);
        let caller = ResilientCaller::new(config.retry.policy());

        enricher = enricher
            .with_commute(
                CommuteResolver::new(Arc::clone(&client), caller.clone()),
                destinations,
            )
            .with_proximity(
                ProximityResolver::new(client, caller)
                    .with_keyword_queries(config.proximity.keyword_queries.clone())
                    .with_page_token_delay(config.maps.page_token_delay()),
                categories,
            );

        Ok(enricher)
    }

    /// Caches live lookups in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: TtlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolves commutes to `destinations` with `resolver`.
    #[must_use]
    pub fn with_commute(
        mut self,
        resolver: CommuteResolver,
        destinations: Vec<Destination>,
    ) -> Self {
        self.commute = Some(resolver);
        self.destinations = destinations;
        self
    }

    /// Resolves nearby places of `categories` with `resolver`.
    #[must_use]
    pub fn with_proximity(
        mut self,
        resolver: ProximityResolver,
        categories: Vec<PlaceCategory>,
    ) -> Self {
        self.proximity = Some(resolver);
        self.categories = categories;
        self
    }

    /// Number of listings enriched at once (at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The cache, if configured.
    #[must_use]
    pub const fn cache(&self) -> Option<&TtlCache> {
        self.cache.as_ref()
    }

    /// Computes every feature for one listing.
    pub async fn enrich_listing(&self, listing: Listing) -> EnrichedListing {
        let crime = self.scorer.crime_scores(listing.coordinate);
        let affordable = self.scorer.affordable(listing.coordinate);

        let origin = listing.origin();
        let mut commutes = Vec::with_capacity(self.destinations.len());
        for destination in &self.destinations {
            commutes.push((
                destination.name.clone(),
                self.commute(&origin, destination).await,
            ));
        }

        let mut proximity = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            proximity.push((
                category.name.clone(),
                self.places(&listing, category).await,
            ));
        }

        EnrichedListing {
            listing,
            crime,
            affordable,
            commutes,
            proximity,
        }
    }

    /// Enriches every listing, `concurrency` at a time, returning records
    /// in input order.
    pub async fn enrich_all(
        &self,
        listings: Vec<Listing>,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Vec<EnrichedListing> {
        let total = listings.len();
        progress.set_total(total as u64);
        progress.set_message("Enriching listings".to_string());

        let mut indexed: Vec<(usize, EnrichedListing)> =
            futures::stream::iter(listings.into_iter().enumerate())
                .map(|(index, listing)| async move { (index, self.enrich_listing(listing).await) })
                .buffer_unordered(self.concurrency)
                .inspect(|_| progress.inc(1))
                .collect()
                .await;

        indexed.sort_by_key(|(index, _)| *index);

        progress.finish(format!("Enriched {total} listings"));
        log::info!("Enriched {total} listings");

        indexed.into_iter().map(|(_, record)| record).collect()
    }

    async fn commute(&self, origin: &str, destination: &Destination) -> DirectionsResult {
        let Some(resolver) = &self.commute else {
            return DirectionsResult::default();
        };

        let request = DirectionsRequest::new(
            origin,
            destination.address.as_str(),
            destination.mode,
            destination.departure_time,
        );
        let key = request.cache_key();
        let request = &request;

        self.cached(&key, move || resolver.try_resolve(request))
            .await
    }

    async fn places(&self, listing: &Listing, category: &PlaceCategory) -> ProximityResult {
        let Some(resolver) = &self.proximity else {
            return ProximityResult::default();
        };

        let key = proximity::cache_key(listing.coordinate, &category.query, category.radius_meters);

        self.cached(&key, || {
            resolver.try_resolve(listing.coordinate, &category.query, category.radius_meters)
        })
        .await
    }

    /// Returns the cached value for `key`, or resolves and caches it.
    ///
    /// `resolve` yields `None` for a degraded answer, which is returned as
    /// the default and left uncached. Cache failures are logged and
    /// otherwise ignored.
    async fn cached<T, F, Fut>(&self, key: &str, resolve: F) -> T
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get::<T>(key) {
                log::trace!("Cache hit: {key}");
                return hit;
            }
            log::debug!("Cache miss: {key}");
        }

        let Some(value) = resolve().await else {
            return T::default();
        };

        if let Some(cache) = &self.cache
            && let Err(e) = cache.set(key, &value)
        {
            log::warn!("Failed to cache {key}: {e}");
        }

        value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use listing_enrich_maps::ApiStatus;
    use listing_enrich_maps::retry::{RetryPolicy, Sleeper};
    use listing_enrich_maps::types::{DistanceMatrix, PlacesPage, PlacesRequest, Route};
    use listing_enrich_models::Coordinate;
    use listing_enrich_scoring::{AffordableDataset, CrimeDataset};

    use super::*;
    use crate::progress::null_progress;

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    /// Answers directions with a fixed route (or a quota error while
    /// `deny` is set) and places with nothing (or a dropped connection
    /// while `fail_places` is set).
    #[derive(Default)]
    struct FakeClient {
        directions_calls: AtomicU32,
        places_calls: AtomicU32,
        deny: Mutex<bool>,
        fail_places: Mutex<bool>,
    }

    #[async_trait]
    impl MapsClient for FakeClient {
        async fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Route>, MapsError> {
            self.directions_calls.fetch_add(1, Ordering::SeqCst);
            if *self.deny.lock().unwrap() {
                return Err(MapsError::Api {
                    status: ApiStatus::OverQueryLimit,
                    message: String::new(),
                });
            }
            Ok(serde_json::from_value(serde_json::json!([{
                "legs": [{
                    "duration": { "text": format!("to {}", request.destination), "value": 600 },
                    "steps": [{ "travel_mode": "DRIVING", "html_instructions": "Go" }]
                }]
            }]))
            .unwrap())
        }

        async fn places_nearby(&self, _request: &PlacesRequest) -> Result<PlacesPage, MapsError> {
            self.places_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_places.lock().unwrap() {
                return Err(MapsError::Unexpected {
                    message: "connection reset".to_string(),
                });
            }
            Ok(PlacesPage::default())
        }

        async fn distance_matrix(
            &self,
            _origins: &[String],
            _destinations: &[String],
            _mode: TravelMode,
        ) -> Result<DistanceMatrix, MapsError> {
            Ok(DistanceMatrix::default())
        }
    }

    fn listing(id: &str, latitude: f64) -> Listing {
        Listing {
            id: id.to_string(),
            address: Some(format!("{id} Main St")),
            coordinate: Coordinate::new(latitude, -87.65),
            extra: std::collections::BTreeMap::new(),
        }
    }

    fn enricher(client: &Arc<FakeClient>) -> Enricher {
        let client: Arc<dyn MapsClient> = Arc::clone(client) as Arc<dyn MapsClient>;
        let caller = ResilientCaller::with_sleeper(RetryPolicy::default(), Arc::new(NoSleep));

        let mut crime = CrimeDataset::default();
        crime.push(Coordinate::new(41.9, -87.65), "NARCOTICS", "POSS");

        Enricher::new(GeoScorer::new(
            Arc::new(crime),
            Arc::new(AffordableDataset::default()),
        ))
            .with_cache(TtlCache::in_memory(Duration::from_secs(3600)).unwrap())
            .with_commute(
                CommuteResolver::new(Arc::clone(&client), caller.clone()),
                vec![Destination {
                    name: "work".to_string(),
                    address: "Loop".to_string(),
                    mode: TravelMode::Driving,
                    departure_time: None,
                }],
            )
            .with_proximity(
                ProximityResolver::new(client, caller),
                vec![PlaceCategory {
                    name: "park".to_string(),
                    query: "park".to_string(),
                    radius_meters: 3200,
                }],
            )
    }

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let client = Arc::new(FakeClient::default());
        let enricher = enricher(&client);

        let first = enricher.enrich_listing(listing("1", 41.9)).await;
        let second = enricher.enrich_listing(listing("1", 41.9)).await;

        assert_eq!(first.commutes, second.commutes);
        assert_eq!(first.commutes[0].1.commute_time.as_deref(), Some("to Loop"));
        assert!((first.crime.drug_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(client.directions_calls.load(Ordering::SeqCst), 1);
        // An empty places answer is still an answer and is cached.
        assert_eq!(client.places_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.proximity[0].1, ProximityResult::default());
    }

    #[tokio::test]
    async fn degraded_answer_is_not_cached() {
        let client = Arc::new(FakeClient::default());
        *client.deny.lock().unwrap() = true;
        let enricher = enricher(&client);

        let degraded = enricher.enrich_listing(listing("1", 41.9)).await;
        assert_eq!(degraded.commutes[0].1, DirectionsResult::default());
        assert_eq!(client.directions_calls.load(Ordering::SeqCst), 3);

        *client.deny.lock().unwrap() = false;
        let recovered = enricher.enrich_listing(listing("1", 41.9)).await;
        assert_eq!(
            recovered.commutes[0].1.commute_time.as_deref(),
            Some("to Loop")
        );
        assert_eq!(client.directions_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let client = Arc::new(FakeClient::default());
        let enricher = enricher(&client).with_concurrency(4);

        let listings: Vec<Listing> = (0..10)
            .map(|i| listing(&i.to_string(), 41.8 + f64::from(i) * 0.01))
            .collect();
        let records = enricher.enrich_all(listings, &null_progress()).await;

        let ids: Vec<&str> = records.iter().map(|r| r.listing.id.as_str()).collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
    }

    #[tokio::test]
    async fn without_resolvers_features_are_unavailable() {
        let enricher = Enricher::new(GeoScorer::default());
        let record = enricher.enrich_listing(listing("1", 41.9)).await;
        assert!(record.commutes.is_empty());
        assert!(record.proximity.is_empty());
        assert_eq!(record.affordable.count, 0);
    }

    #[test]
    fn unopenable_cache_runs_uncached() {
        let blocker = std::env::temp_dir().join("listing_enrich_cache_blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut config = EnrichConfig::default();
        config.cache.path = blocker.join("cache.duckdb");
        config.maps.api_key_env = "LISTING_ENRICH_TEST_UNSET_KEY".to_string();

        let enricher = Enricher::from_config(&config).unwrap();
        assert!(enricher.cache().is_none());
        assert!(enricher.commute.is_none());
    }

    #[tokio::test]
    async fn failed_places_page_is_not_cached() {
        let client = Arc::new(FakeClient::default());
        *client.fail_places.lock().unwrap() = true;
        let enricher = enricher(&client);

        let degraded = enricher.enrich_listing(listing("1", 41.9)).await;
        assert_eq!(degraded.proximity[0].1, ProximityResult::default());
        assert_eq!(client.places_calls.load(Ordering::SeqCst), 1);

        let key = proximity::cache_key(Coordinate::new(41.9, -87.65), "park", 3200);
        assert_eq!(enricher.cache().unwrap().get_raw(&key).unwrap(), None);

        *client.fail_places.lock().unwrap() = false;
        enricher.enrich_listing(listing("1", 41.9)).await;
        assert_eq!(client.places_calls.load(Ordering::SeqCst), 2);
        assert!(enricher.cache().unwrap().get_raw(&key).unwrap().is_some());
    }

    #[test]
    fn destination_from_config() {
        let config = EnrichConfig::from_toml_str(
            r#"
[[commute.destinations]]
name = "work"
address = "Loop"
departure_time = "now"
"#,
        )
        .unwrap();
        let destination = Destination::try_from(&config.commute.destinations[0]).unwrap();
        assert_eq!(destination.mode, TravelMode::Transit);
        assert_eq!(destination.departure_time, Some(DepartureTime::Now));
    }
}
