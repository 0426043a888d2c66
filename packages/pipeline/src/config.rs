//! Enrichment configuration loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid (if
//! uneventful) configuration: no destinations, no place categories, no
//! datasets.
//!
//! ```toml
//! concurrency = 4
//!
//! [cache]
//! ttl_days = 14
//!
//! [[commute.destinations]]
//! name = "work"
//! address = "233 S Wacker Dr, Chicago, IL"
//! mode = "transit"
//!
//! [[proximity.categories]]
//! name = "grocery"
//! query = "Whole Foods"
//!
//! [datasets]
//! crime_csv = "data/crimes.csv"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use listing_enrich_cache::paths;
use listing_enrich_maps::google;
use listing_enrich_maps::proximity::{
    DEFAULT_KEYWORD_QUERIES, DEFAULT_PAGE_TOKEN_DELAY, DEFAULT_RADIUS_METERS,
};
use listing_enrich_maps::retry::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_RETRIES, RetryPolicy};
use listing_enrich_maps::types::DepartureTime;
use listing_enrich_models::TravelMode;
use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "enrich.toml";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`EnrichConfig`].
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Config file path (or `<string>`).
        path: String,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A destination's `departure_time` is neither `now` nor RFC 3339.
    #[error("Destination '{destination}': invalid departure_time '{value}'")]
    InvalidDeparture {
        /// Destination name.
        destination: String,
        /// Offending value.
        value: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Listings enriched at the same time.
    pub concurrency: usize,
    /// API result cache.
    pub cache: CacheConfig,
    /// Retry policy for provider calls.
    pub retry: RetryConfig,
    /// Maps provider connection.
    pub maps: MapsConfig,
    /// Commute destinations.
    pub commute: CommuteConfig,
    /// Nearby place categories.
    pub proximity: ProximityConfig,
    /// Static datasets.
    pub datasets: DatasetsConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            maps: MapsConfig::default(),
            commute: CommuteConfig::default(),
            proximity: ProximityConfig::default(),
            datasets: DatasetsConfig::default(),
        }
    }
}

/// API result cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `DuckDB` file holding the cache.
    pub path: PathBuf,
    /// Entry lifetime in days; `0` disables expiry.
    pub ttl_days: u64,
    /// Table name.
    pub table: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: paths::cache_db_path(),
            ttl_days: 14,
            table: listing_enrich_cache::DEFAULT_TABLE.to_string(),
        }
    }
}

impl CacheConfig {
    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 60 * 60))
    }
}

/// Retry settings for provider calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call.
    pub max_retries: u32,
    /// Delay before the second attempt, doubled after each retry.
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: u64::try_from(DEFAULT_INITIAL_DELAY.as_millis()).unwrap_or(1000),
        }
    }
}

impl RetryConfig {
    /// The equivalent [`RetryPolicy`].
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }
}

/// Maps provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapsConfig {
    /// Web-service base URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Wait before using a continuation token, in milliseconds.
    pub page_token_delay_ms: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            base_url: google::DEFAULT_BASE_URL.to_string(),
            api_key_env: "GOOGLE_MAPS_API_KEY".to_string(),
            timeout_secs: google::DEFAULT_TIMEOUT.as_secs(),
            page_token_delay_ms: u64::try_from(DEFAULT_PAGE_TOKEN_DELAY.as_millis())
                .unwrap_or(2000),
        }
    }
}

impl MapsConfig {
    /// Reads the API key from the configured environment variable.
    /// Blank values count as missing.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Wait before using a continuation token.
    #[must_use]
    pub const fn page_token_delay(&self) -> Duration {
        Duration::from_millis(self.page_token_delay_ms)
    }
}

/// Commute settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommuteConfig {
    /// Destinations to compute commutes to, in output order.
    pub destinations: Vec<DestinationConfig>,
}

/// One commute destination.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    /// Column prefix, e.g. `work` → `WORK_COMMUTE_TIME`.
    pub name: String,
    /// Address or `lat,lng` of the destination.
    pub address: String,
    /// Travel mode.
    #[serde(default)]
    pub mode: TravelMode,
    /// `now` or an RFC 3339 timestamp. Transit departs now when unset.
    #[serde(default)]
    pub departure_time: Option<String>,
}

impl DestinationConfig {
    /// Parses [`Self::departure_time`].
    ///
    /// # Errors
    ///
    /// * If the value is neither `now` nor a valid RFC 3339 timestamp
    pub fn departure(&self) -> Result<Option<DepartureTime>, ConfigError> {
        let Some(value) = self.departure_time.as_deref().map(str::trim) else {
            return Ok(None);
        };

        if value.eq_ignore_ascii_case("now") {
            return Ok(Some(DepartureTime::Now));
        }

        DateTime::parse_from_rfc3339(value)
            .map(|at| Some(DepartureTime::At(at.with_timezone(&Utc))))
            .map_err(|_| ConfigError::InvalidDeparture {
                destination: self.name.clone(),
                value: value.to_string(),
            })
    }
}

/// Proximity settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Place categories to search, in output order.
    pub categories: Vec<CategoryConfig>,
    /// Queries searched by keyword instead of place type.
    pub keyword_queries: Vec<String>,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            keyword_queries: DEFAULT_KEYWORD_QUERIES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// One place category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    /// Column prefix, e.g. `grocery` → `GROCERY_CLOSEST_NAME`.
    pub name: String,
    /// Place type or keyword to search; defaults to `name`.
    #[serde(default)]
    pub query: Option<String>,
    /// Search radius in metres.
    #[serde(default)]
    pub radius_meters: Option<u32>,
}

impl CategoryConfig {
    /// The place type or keyword sent to the provider.
    #[must_use]
    pub fn query(&self) -> &str {
        self.query.as_deref().unwrap_or(&self.name)
    }

    /// Search radius, falling back to the default.
    #[must_use]
    pub fn radius_meters(&self) -> u32 {
        self.radius_meters.unwrap_or(DEFAULT_RADIUS_METERS)
    }
}

/// Static dataset locations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatasetsConfig {
    /// Crime incidents CSV.
    pub crime_csv: Option<PathBuf>,
    /// Affordable-housing developments CSV.
    pub affordable_csv: Option<PathBuf>,
}

impl EnrichConfig {
    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// * If the file cannot be read
    /// * If the TOML is invalid
    /// * If a destination has an invalid departure time
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let label = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: label.clone(),
            source,
        })?;
        let config = Self::parse(&contents, &label)?;
        log::info!(
            "Loaded config from {label}: {} destinations, {} place categories",
            config.commute.destinations.len(),
            config.proximity.categories.len()
        );
        Ok(config)
    }

    /// Parses TOML config text.
    ///
    /// # Errors
    ///
    /// * If the TOML is invalid
    /// * If a destination has an invalid departure time
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, "<string>")
    }

    fn parse(contents: &str, label: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(contents).map_err(|source| ConfigError::Parse {
            path: label.to_string(),
            source,
        })?;

        for destination in &config.commute.destinations {
            destination.departure()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EnrichConfig::from_toml_str("").unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.cache.ttl(), listing_enrich_cache::DEFAULT_TTL);
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert_eq!(config.maps.api_key_env, "GOOGLE_MAPS_API_KEY");
        assert_eq!(config.maps.page_token_delay(), DEFAULT_PAGE_TOKEN_DELAY);
        assert_eq!(config.proximity.keyword_queries.len(), 3);
        assert!(config.commute.destinations.is_empty());
        assert!(config.datasets.crime_csv.is_none());
    }

    #[test]
    fn parses_full_config() {
        let config = EnrichConfig::from_toml_str(
            r#"
concurrency = 4

[cache]
ttl_days = 0
table = "api_cache"

[retry]
max_retries = 5
initial_delay_ms = 250

[[commute.destinations]]
name = "work"
address = "233 S Wacker Dr, Chicago, IL"

[[commute.destinations]]
name = "airport"
address = "O'Hare International Airport"
mode = "driving"
departure_time = "2025-03-03T08:30:00-06:00"

[[proximity.categories]]
name = "grocery"
query = "Whole Foods"

[[proximity.categories]]
name = "park"
radius_meters = 800

[datasets]
crime_csv = "data/crimes.csv"
"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.cache.ttl(), Duration::ZERO);
        assert_eq!(config.cache.table, "api_cache");
        assert_eq!(config.retry.policy().max_retries, 5);
        assert_eq!(
            config.retry.policy().initial_delay,
            Duration::from_millis(250)
        );

        let work = &config.commute.destinations[0];
        assert_eq!(work.mode, TravelMode::Transit);
        assert_eq!(work.departure().unwrap(), None);

        let airport = &config.commute.destinations[1];
        assert_eq!(airport.mode, TravelMode::Driving);
        let Some(DepartureTime::At(at)) = airport.departure().unwrap() else {
            panic!("expected fixed departure");
        };
        assert_eq!(at.timestamp(), 1_741_012_200);

        assert_eq!(config.proximity.categories[0].query(), "Whole Foods");
        assert_eq!(
            config.proximity.categories[0].radius_meters(),
            DEFAULT_RADIUS_METERS
        );
        assert_eq!(config.proximity.categories[1].query(), "park");
        assert_eq!(config.proximity.categories[1].radius_meters(), 800);
        assert_eq!(
            config.datasets.crime_csv.as_deref(),
            Some(Path::new("data/crimes.csv"))
        );
    }

    #[test]
    fn invalid_departure_is_rejected() {
        let err = EnrichConfig::from_toml_str(
            r#"
[[commute.destinations]]
name = "work"
address = "somewhere"
departure_time = "tomorrow morning"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDeparture { .. }));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = EnrichConfig::from_toml_str(
            r#"
[[commute.destinations]]
name = "work"
address = "somewhere"
mode = "teleport"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
