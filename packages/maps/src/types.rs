//! Request and response shapes for the maps provider.
//!
//! Response structs mirror the provider's JSON closely and default every
//! field, so a partially populated record deserializes instead of
//! failing the whole response.

use chrono::{DateTime, Utc};
use listing_enrich_models::{Coordinate, TravelMode};
use serde::{Deserialize, Serialize};

/// When a directions request departs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartureTime {
    /// Depart immediately (live schedules and traffic).
    Now,
    /// Depart at a fixed instant.
    At(DateTime<Utc>),
}

impl DepartureTime {
    /// Value of the `departure_time` query parameter.
    #[must_use]
    pub fn query_value(&self) -> String {
        match self {
            Self::Now => "now".to_string(),
            Self::At(at) => at.timestamp().to_string(),
        }
    }
}

/// A directions query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionsRequest {
    /// Origin address or `lat,lng`.
    pub origin: String,
    /// Destination address or `lat,lng`.
    pub destination: String,
    /// Travel mode.
    pub mode: TravelMode,
    /// Departure time, if any.
    pub departure_time: Option<DepartureTime>,
}

impl DirectionsRequest {
    /// Builds a request, applying the mode's default departure: transit
    /// departs "now" unless told otherwise, driving sends none.
    #[must_use]
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        mode: TravelMode,
        departure_time: Option<DepartureTime>,
    ) -> Self {
        let departure_time = departure_time.or(match mode {
            TravelMode::Transit => Some(DepartureTime::Now),
            TravelMode::Driving | TravelMode::Walking => None,
        });

        Self {
            origin: origin.into(),
            destination: destination.into(),
            mode,
            departure_time,
        }
    }

    /// Canonical cache key identifying this query.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let departure = self
            .departure_time
            .map_or_else(|| "-".to_string(), |d| d.query_value());
        format!(
            "directions|{}|{}|{}|{departure}",
            self.origin.trim(),
            self.destination.trim(),
            self.mode.as_ref(),
        )
    }
}

/// What to search for in a nearby-places query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceQuery {
    /// A provider place type such as `supermarket` or `park`.
    Type(String),
    /// Free-text keyword, used for named chains and institutions.
    Keyword(String),
    /// Continuation of a previous query.
    PageToken(String),
}

/// A nearby-places query.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacesRequest {
    /// Search centre.
    pub location: Coordinate,
    /// Search radius in metres.
    pub radius_meters: u32,
    /// Type, keyword, or page token.
    pub query: PlaceQuery,
}

/// A duration or distance as `{ "text": "5 mins", "value": 300 }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    /// Human-readable text.
    #[serde(default)]
    pub text: String,
    /// Machine value (seconds or metres).
    #[serde(default)]
    pub value: i64,
}

/// A directions route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Legs between waypoints; one leg without waypoints.
    #[serde(default)]
    pub legs: Vec<Leg>,
}

/// One leg of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// Total leg duration.
    #[serde(default)]
    pub duration: Option<TextValue>,
    /// Steps in travel order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One step of a leg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// `WALKING`, `TRANSIT`, `DRIVING`, ...
    #[serde(default)]
    pub travel_mode: String,
    /// Step duration.
    #[serde(default)]
    pub duration: Option<TextValue>,
    /// Instruction with HTML markup.
    #[serde(default)]
    pub html_instructions: Option<String>,
    /// Present on transit steps.
    #[serde(default)]
    pub transit_details: Option<TransitDetails>,
}

/// Transit details of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitDetails {
    /// Line ridden.
    #[serde(default)]
    pub line: Option<TransitLine>,
    /// Direction of travel shown on the vehicle.
    #[serde(default)]
    pub headsign: Option<String>,
}

/// A transit line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitLine {
    /// Full name, e.g. `"Red Line"`.
    #[serde(default)]
    pub name: Option<String>,
    /// Short name, e.g. `"Brn"` or `"22"`.
    #[serde(default)]
    pub short_name: Option<String>,
    /// Vehicle operating the line.
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
}

/// A transit vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// `BUS`, `SUBWAY`, `HEAVY_RAIL`, `TRAM`, ...
    #[serde(default, rename = "type")]
    pub vehicle_type: Option<String>,
}

/// One page of nearby-places results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacesPage {
    /// Places on this page.
    #[serde(default)]
    pub results: Vec<Place>,
    /// Token for the next page, if more results exist.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A place result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Location.
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl Place {
    /// The place's coordinate, if the provider supplied a complete one.
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        let location = self.geometry.as_ref()?.location.as_ref()?;
        let coordinate = Coordinate::new(location.lat?, location.lng?);
        coordinate.is_finite().then_some(coordinate)
    }
}

/// Place geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Point location.
    #[serde(default)]
    pub location: Option<LatLng>,
}

/// A provider lat/lng pair (either part may be missing).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude.
    #[serde(default)]
    pub lat: Option<f64>,
    /// Longitude.
    #[serde(default)]
    pub lng: Option<f64>,
}

/// Distance-matrix response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    /// One row per origin.
    #[serde(default)]
    pub rows: Vec<MatrixRow>,
}

impl DistanceMatrix {
    /// Duration text for the first origin/destination pair, if that
    /// element's status is `OK`.
    #[must_use]
    pub fn first_duration_text(&self) -> Option<String> {
        let element = self.rows.first()?.elements.first()?;
        if element.status != "OK" {
            return None;
        }
        element.duration.as_ref().map(|d| d.text.clone())
    }
}

/// One origin's row of a distance matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    /// One element per destination.
    #[serde(default)]
    pub elements: Vec<MatrixElement>,
}

/// One origin/destination pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixElement {
    /// `OK`, `NOT_FOUND`, `ZERO_RESULTS`, ...
    #[serde(default)]
    pub status: String,
    /// Travel duration.
    #[serde(default)]
    pub duration: Option<TextValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transit_defaults_to_now() {
        let req = DirectionsRequest::new("a", "b", TravelMode::Transit, None);
        assert_eq!(req.departure_time, Some(DepartureTime::Now));
        assert_eq!(req.cache_key(), "directions|a|b|transit|now");
    }

    #[test]
    fn driving_has_no_departure() {
        let req = DirectionsRequest::new("a", "b", TravelMode::Driving, None);
        assert_eq!(req.departure_time, None);
        assert_eq!(req.cache_key(), "directions|a|b|driving|-");
    }

    #[test]
    fn explicit_departure_is_kept() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let req =
            DirectionsRequest::new("a", "b", TravelMode::Driving, Some(DepartureTime::At(at)));
        assert_eq!(req.cache_key(), "directions|a|b|driving|1700000000");
    }

    #[test]
    fn place_without_coordinates() {
        let place: Place = serde_json::from_value(serde_json::json!({
            "name": "Nowhere",
            "geometry": { "location": { "lat": 41.9 } }
        }))
        .unwrap();
        assert!(place.coordinate().is_none());

        let place: Place = serde_json::from_value(serde_json::json!({ "name": "Bare" })).unwrap();
        assert!(place.coordinate().is_none());
    }

    #[test]
    fn matrix_duration_requires_ok_status() {
        let matrix: DistanceMatrix = serde_json::from_value(serde_json::json!({
            "rows": [{ "elements": [{
                "status": "OK",
                "duration": { "text": "6 mins", "value": 360 }
            }] }]
        }))
        .unwrap();
        assert_eq!(matrix.first_duration_text().as_deref(), Some("6 mins"));

        let matrix: DistanceMatrix = serde_json::from_value(serde_json::json!({
            "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }] }]
        }))
        .unwrap();
        assert!(matrix.first_duration_text().is_none());
    }
}
