//! The flat, column-per-feature record emitted for each listing.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::{
    AffordableSummary, CrimeCategory, CrimeScores, DirectionsResult, Listing, ProximityResult,
    RailLine,
};

/// A single cell of an enriched record.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// Feature unavailable.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Count.
    Int(i64),
    /// Score or distance.
    Float(f64),
    /// Free text.
    Text(String),
}

impl FeatureValue {
    fn text(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }

    fn count(value: Option<usize>) -> Self {
        value.map_or(Self::Null, |n| Self::Int(i64::try_from(n).unwrap_or(i64::MAX)))
    }

    fn float(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Float)
    }

    /// Returns `true` for [`FeatureValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl std::fmt::Display for FeatureValue {
    /// Renders the cell as CSV text; `Null` becomes an empty cell.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for FeatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// All features computed for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedListing {
    /// The listing as read from input.
    pub listing: Listing,
    /// Crime scores from the static incident dataset.
    pub crime: CrimeScores,
    /// Affordable-housing summary from the static dataset.
    pub affordable: AffordableSummary,
    /// Commute per configured destination, keyed by destination name.
    pub commutes: Vec<(String, DirectionsResult)>,
    /// Proximity per configured place category, keyed by category name.
    pub proximity: Vec<(String, ProximityResult)>,
}

impl EnrichedListing {
    /// Flattens the record into ordered `(column, value)` pairs.
    ///
    /// Pass-through input columns come first, then crime scores,
    /// affordable housing, one commute block per destination and one
    /// proximity block per category. Destination and category names are
    /// upper-cased into column prefixes (`WORK_COMMUTE_TIME`,
    /// `GROCERY_CLOSEST_NAME`, ...).
    #[must_use]
    pub fn columns(&self) -> Vec<(String, FeatureValue)> {
        let mut cols: Vec<(String, FeatureValue)> = Vec::new();

        cols.push(("ID".to_string(), FeatureValue::Text(self.listing.id.clone())));
        cols.push((
            "ADDRESS".to_string(),
            FeatureValue::text(self.listing.address.clone()),
        ));
        cols.push((
            "LATITUDE".to_string(),
            FeatureValue::Float(self.listing.coordinate.latitude),
        ));
        cols.push((
            "LONGITUDE".to_string(),
            FeatureValue::Float(self.listing.coordinate.longitude),
        ));
        for (key, value) in &self.listing.extra {
            cols.push((key.clone(), FeatureValue::Text(value.clone())));
        }

        for category in CrimeCategory::all() {
            cols.push((category.column(), FeatureValue::Float(self.crime.get(*category))));
        }

        cols.push((
            "NUM_AFFORDABLE_HOMES".to_string(),
            FeatureValue::count(Some(self.affordable.count)),
        ));
        cols.push((
            "AFFORDABLE_DESC".to_string(),
            FeatureValue::Text(self.affordable.joined_descriptions()),
        ));

        for (name, commute) in &self.commutes {
            let prefix = column_prefix(name);
            cols.push((
                format!("{prefix}_COMMUTE_TIME"),
                FeatureValue::text(commute.commute_time.clone()),
            ));
            cols.push((
                format!("{prefix}_COMMUTE_STEPS"),
                FeatureValue::text(commute.joined_steps()),
            ));
            cols.push((
                format!("{prefix}_COMMUTE_NUM_STEPS"),
                FeatureValue::count(commute.num_steps),
            ));
            cols.push((
                format!("{prefix}_WALKING_TIME"),
                FeatureValue::text(commute.walking_time.clone()),
            ));
            for line in RailLine::all() {
                cols.push((
                    format!("{prefix}_{}", line.column()),
                    FeatureValue::Bool(commute.uses(*line)),
                ));
            }
        }

        for (name, places) in &self.proximity {
            let prefix = column_prefix(name);
            cols.push((
                format!("{prefix}_CLOSEST_NAME"),
                FeatureValue::text(places.closest_name.clone()),
            ));
            cols.push((
                format!("{prefix}_CLOSEST_DISTANCE_MILES"),
                FeatureValue::float(places.closest_distance_miles),
            ));
            cols.push((
                format!("{prefix}_CLOSEST_WALK_DURATION"),
                FeatureValue::text(places.closest_walk_duration.clone()),
            ));
            cols.push((
                format!("{prefix}_COUNT_WITHIN_HALF_MILE"),
                FeatureValue::count(Some(places.count_within_half_mile)),
            ));
            cols.push((
                format!("{prefix}_NEARBY_PLACES"),
                FeatureValue::Text(places.formatted_places()),
            ));
        }

        cols
    }

    /// The flattened record as an ordered map, for JSON output.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, FeatureValue> {
        self.columns().into_iter().collect()
    }
}

/// Upper-cases a destination/category name and replaces anything that
/// is not alphanumeric with `_`.
fn column_prefix(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
