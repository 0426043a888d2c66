#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature types shared by every stage of the listing enrichment pipeline.
//!
//! The geospatial scorer produces [`CrimeScores`] and
//! [`AffordableSummary`], the live resolvers produce [`DirectionsResult`]
//! and [`ProximityResult`], and [`EnrichedListing`] flattens all of them
//! into the single column-per-feature record consumed downstream.

pub mod record;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use record::{EnrichedListing, FeatureValue};

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl std::fmt::Display for Coordinate {
    /// Formats as `lat,lng` with six decimal places (~0.1 m), the form
    /// accepted by the maps provider and used in cache keys.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Travel mode for a directions or distance-matrix request.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TravelMode {
    /// Public transit. Departure defaults to "now".
    #[default]
    Transit,
    /// Driving, with no forced departure time.
    Driving,
    /// Walking.
    Walking,
}

/// Named rail lines detected in transit routes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RailLine {
    /// Brown line (short code `Brn`)
    Brown,
    /// Red line
    Red,
    /// Blue line
    Blue,
    /// Pink line
    Pink,
    /// Green line
    Green,
    /// Orange line
    Orange,
    /// Purple line
    Purple,
}

impl RailLine {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Brown,
            Self::Red,
            Self::Blue,
            Self::Pink,
            Self::Green,
            Self::Orange,
            Self::Purple,
        ]
    }

    /// Lowercase substring identifying this line in a transit line name.
    #[must_use]
    pub const fn name_keyword(self) -> &'static str {
        match self {
            Self::Brown => "brown",
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Pink => "pink",
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Purple => "purple",
        }
    }

    /// Lowercase substring identifying this line in a line short name,
    /// for lines that publish a short code.
    #[must_use]
    pub const fn short_code(self) -> Option<&'static str> {
        match self {
            Self::Brown => Some("brn"),
            _ => None,
        }
    }

    /// Flat-record column name, e.g. `USES_RED_LINE`.
    #[must_use]
    pub fn column(self) -> String {
        format!("USES_{}_LINE", self.as_ref())
    }
}

/// Mutually exclusive crime categories used for scoring.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CrimeCategory {
    /// Weapons offenses and any incident describing a firearm
    Gun,
    /// Narcotics offenses
    Drug,
    /// Homicide
    Murder,
    /// Violent and property crimes (burglary, robbery, assault, theft)
    Theft,
    /// Exploitation offenses (trafficking, kidnapping, sex offenses)
    Human,
    /// Anything not matched by the categories above
    Other,
}

impl CrimeCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Gun,
            Self::Drug,
            Self::Murder,
            Self::Theft,
            Self::Human,
            Self::Other,
        ]
    }

    /// Flat-record column name, e.g. `GUN_SCORE`.
    #[must_use]
    pub fn column(self) -> String {
        format!("{}_SCORE", self.as_ref())
    }
}

/// Decay-weighted crime scores for one listing, one per [`CrimeCategory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CrimeScores {
    /// Sum of decay weights of [`CrimeCategory::Gun`] incidents.
    pub gun_score: f64,
    /// Sum of decay weights of [`CrimeCategory::Drug`] incidents.
    pub drug_score: f64,
    /// Sum of decay weights of [`CrimeCategory::Murder`] incidents.
    pub murder_score: f64,
    /// Sum of decay weights of [`CrimeCategory::Theft`] incidents.
    pub theft_score: f64,
    /// Sum of decay weights of [`CrimeCategory::Human`] incidents.
    pub human_score: f64,
    /// Sum of decay weights of [`CrimeCategory::Other`] incidents.
    pub other_score: f64,
}

impl CrimeScores {
    /// Returns the score for a category.
    #[must_use]
    pub const fn get(&self, category: CrimeCategory) -> f64 {
        match category {
            CrimeCategory::Gun => self.gun_score,
            CrimeCategory::Drug => self.drug_score,
            CrimeCategory::Murder => self.murder_score,
            CrimeCategory::Theft => self.theft_score,
            CrimeCategory::Human => self.human_score,
            CrimeCategory::Other => self.other_score,
        }
    }

    /// Adds `weight` to a category's score.
    pub const fn add(&mut self, category: CrimeCategory, weight: f64) {
        let slot = match category {
            CrimeCategory::Gun => &mut self.gun_score,
            CrimeCategory::Drug => &mut self.drug_score,
            CrimeCategory::Murder => &mut self.murder_score,
            CrimeCategory::Theft => &mut self.theft_score,
            CrimeCategory::Human => &mut self.human_score,
            CrimeCategory::Other => &mut self.other_score,
        };
        *slot += weight;
    }

    /// Sum of all category scores.
    #[must_use]
    pub fn total(&self) -> f64 {
        CrimeCategory::all().iter().map(|c| self.get(*c)).sum()
    }
}

/// Affordable-housing developments near a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffordableSummary {
    /// Number of developments inside the cutoff radius.
    pub count: usize,
    /// Distinct development descriptions, in first-seen order.
    pub descriptions: Vec<String>,
}

impl AffordableSummary {
    /// Distinct descriptions joined by `,` (the `AFFORDABLE_DESC` column).
    #[must_use]
    pub fn joined_descriptions(&self) -> String {
        self.descriptions.join(",")
    }
}

/// Commute between a listing and one destination.
///
/// Every field is optional: `None` means "unavailable", never zero. The
/// [`Default`] value (all `None`, no rail lines) is what callers get when
/// no route exists or the provider call failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionsResult {
    /// Total duration text as reported by the provider (e.g. `"34 mins"`).
    pub commute_time: Option<String>,
    /// Human-readable instruction per step, in route order.
    pub steps: Option<Vec<String>>,
    /// Number of steps.
    pub num_steps: Option<usize>,
    /// Total walking time in transit mode, e.g. `"7 mins"`.
    pub walking_time: Option<String>,
    /// Named rail lines ridden on this route.
    #[serde(default)]
    pub rail_lines: BTreeSet<RailLine>,
}

impl DirectionsResult {
    /// Returns `true` if this route rides the given rail line.
    #[must_use]
    pub fn uses(&self, line: RailLine) -> bool {
        self.rail_lines.contains(&line)
    }

    /// Returns `true` if this is the unavailable/default record.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self == &Self::default()
    }

    /// Step instructions joined by `", "` (the `COMMUTE_STEPS` column).
    #[must_use]
    pub fn joined_steps(&self) -> Option<String> {
        self.steps.as_ref().map(|steps| steps.join(", "))
    }
}

/// One place in a proximity listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlace {
    /// Place name (empty if the provider omitted it).
    pub name: String,
    /// Great-circle distance from the listing in miles.
    pub distance_miles: f64,
}

impl NearbyPlace {
    /// Distance formatted for display, e.g. `"0.42 mi"`.
    #[must_use]
    pub fn formatted_distance(&self) -> String {
        format!("{:.2} mi", self.distance_miles)
    }
}

/// Nearby places of one category around a listing.
///
/// The [`Default`] value is the single empty representation used both
/// when nothing was found and when the lookup failed: `closest_name` is
/// `None`, the count is zero and the list is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProximityResult {
    /// Name of the closest place.
    pub closest_name: Option<String>,
    /// Distance to the closest place in miles.
    pub closest_distance_miles: Option<f64>,
    /// Walking duration text to the closest place.
    pub closest_walk_duration: Option<String>,
    /// Places within half a mile.
    pub count_within_half_mile: usize,
    /// Every place found, closest first.
    pub nearby_places: Vec<NearbyPlace>,
}

impl ProximityResult {
    /// Returns `true` if no place was found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.closest_name.is_none() && self.nearby_places.is_empty()
    }

    /// Display list of `name (distance)` entries, closest first.
    #[must_use]
    pub fn formatted_places(&self) -> String {
        self.nearby_places
            .iter()
            .map(|p| format!("{} ({})", p.name, p.formatted_distance()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A listing to enrich, as read from the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing identifier.
    pub id: String,
    /// Street address, used as the commute origin when present.
    pub address: Option<String>,
    /// Listing location.
    pub coordinate: Coordinate,
    /// Input columns passed through untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Listing {
    /// Origin string for directions requests: the address if known,
    /// otherwise `lat,lng`.
    #[must_use]
    pub fn origin(&self) -> String {
        self.address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map_or_else(|| self.coordinate.to_string(), str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crime_scores_add_and_get() {
        let mut scores = CrimeScores::default();
        scores.add(CrimeCategory::Gun, 0.5);
        scores.add(CrimeCategory::Gun, 0.25);
        scores.add(CrimeCategory::Other, 1.0);
        assert!((scores.get(CrimeCategory::Gun) - 0.75).abs() < f64::EPSILON);
        assert!((scores.total() - 1.75).abs() < f64::EPSILON);
        assert!(scores.get(CrimeCategory::Drug).abs() < f64::EPSILON);
    }

    #[test]
    fn crime_scores_serialize_as_score_columns() {
        let value = serde_json::to_value(CrimeScores::default()).unwrap();
        for category in CrimeCategory::all() {
            assert!(value.get(category.column()).is_some(), "{category:?}");
        }
    }

    #[test]
    fn default_directions_is_unavailable() {
        let result = DirectionsResult::default();
        assert!(result.is_unavailable());
        assert!(result.joined_steps().is_none());
        for line in RailLine::all() {
            assert!(!result.uses(*line));
        }
    }

    #[test]
    fn rail_line_columns() {
        assert_eq!(RailLine::Brown.column(), "USES_BROWN_LINE");
        assert_eq!(RailLine::Purple.column(), "USES_PURPLE_LINE");
    }

    #[test]
    fn travel_mode_parses_lowercase() {
        assert_eq!("driving".parse::<TravelMode>().unwrap(), TravelMode::Driving);
        assert_eq!(TravelMode::Transit.as_ref(), "transit");
    }

    #[test]
    fn listing_origin_prefers_address() {
        let mut listing = Listing {
            id: "1".to_string(),
            address: Some("100 N State St, Chicago, IL".to_string()),
            coordinate: Coordinate::new(41.8827, -87.6278),
            extra: BTreeMap::new(),
        };
        assert_eq!(listing.origin(), "100 N State St, Chicago, IL");
        listing.address = Some("  ".to_string());
        assert_eq!(listing.origin(), "41.882700,-87.627800");
    }

    #[test]
    fn nearby_place_formats_two_decimals() {
        let place = NearbyPlace {
            name: "Library".to_string(),
            distance_miles: 0.4567,
        };
        assert_eq!(place.formatted_distance(), "0.46 mi");
    }
}
