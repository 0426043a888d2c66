//! Commute features from provider directions.
//!
//! Takes the first route's first leg and derives the total duration, one
//! readable instruction per step, the walking time of transit trips and
//! the named rail lines ridden.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use listing_enrich_models::{DirectionsResult, RailLine, TravelMode};
use regex::Regex;

use crate::retry::ResilientCaller;
use crate::types::{DepartureTime, DirectionsRequest, Leg, Route, Step, TransitLine};
use crate::{MapsClient, MapsError};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").unwrap_or_else(|_| unreachable!()));

/// Resolves commute features between two places.
pub struct CommuteResolver {
    client: Arc<dyn MapsClient>,
    caller: ResilientCaller,
}

impl CommuteResolver {
    /// Creates a resolver over `client`, retrying through `caller`.
    #[must_use]
    pub fn new(client: Arc<dyn MapsClient>, caller: ResilientCaller) -> Self {
        Self { client, caller }
    }

    /// Resolves the commute, degrading to [`DirectionsResult::default`]
    /// (every field unavailable) when the provider fails.
    pub async fn resolve(
        &self,
        origin: &str,
        destination: &str,
        mode: TravelMode,
        departure_time: Option<DepartureTime>,
    ) -> DirectionsResult {
        let request = DirectionsRequest::new(origin, destination, mode, departure_time);
        self.try_resolve(&request).await.unwrap_or_default()
    }

    /// Resolves the commute for a prepared request.
    ///
    /// Returns `None` if the provider call failed (as opposed to
    /// `Some(default)` when it succeeded but found no route), so callers
    /// can avoid caching degraded answers.
    pub async fn try_resolve(&self, request: &DirectionsRequest) -> Option<DirectionsResult> {
        let label = format!("directions {} -> {}", request.origin, request.destination);
        self.caller
            .try_call(&label, move || self.fetch(request))
            .await
    }

    async fn fetch(&self, request: &DirectionsRequest) -> Result<DirectionsResult, MapsError> {
        let routes = self.client.directions(request).await?;
        Ok(summarize_routes(&routes, request.mode))
    }
}

/// Builds commute features from the provider's routes.
///
/// No route, or a route without legs, yields the all-unavailable default.
#[must_use]
pub fn summarize_routes(routes: &[Route], mode: TravelMode) -> DirectionsResult {
    let Some(leg) = routes.first().and_then(|r| r.legs.first()) else {
        return DirectionsResult::default();
    };
    summarize_leg(leg, mode)
}

fn summarize_leg(leg: &Leg, mode: TravelMode) -> DirectionsResult {
    let mut rail_lines = BTreeSet::new();
    let mut steps = Vec::with_capacity(leg.steps.len());

    for step in &leg.steps {
        match transit_line(step) {
            Some((line, headsign)) => {
                steps.push(transit_instruction(line, headsign));
                rail_lines.extend(detect_rail_lines(line));
            }
            None => steps.push(strip_html(step.html_instructions.as_deref().unwrap_or(""))),
        }
    }

    let walking_time = if mode == TravelMode::Transit {
        walking_minutes(&leg.steps).map(|m| format!("{m} mins"))
    } else {
        None
    };

    DirectionsResult {
        commute_time: leg.duration.as_ref().map(|d| d.text.clone()),
        num_steps: Some(steps.len()),
        steps: Some(steps),
        walking_time,
        rail_lines,
    }
}

/// The line and headsign of a transit step, if it is one.
fn transit_line(step: &Step) -> Option<(&TransitLine, Option<&str>)> {
    static EMPTY_LINE: TransitLine = TransitLine {
        name: None,
        short_name: None,
        vehicle: None,
    };

    if step.travel_mode != "TRANSIT" {
        return None;
    }
    let details = step.transit_details.as_ref()?;
    let line = details.line.as_ref().unwrap_or(&EMPTY_LINE);
    Some((line, details.headsign.as_deref().filter(|h| !h.is_empty())))
}

/// Removes HTML tags from a provider instruction.
#[must_use]
pub fn strip_html(html: &str) -> String {
    HTML_TAG.replace_all(html, "").into_owned()
}

/// Synthesizes `Take bus 22 towards Howard`, `Take the Red Line towards
/// 95th/Dan Ryan`, or `Take the transit` when the line is unnamed.
fn transit_instruction(line: &TransitLine, headsign: Option<&str>) -> String {
    let name = line.name.as_deref().unwrap_or("");
    let short_name = line.short_name.as_deref().unwrap_or("");
    let vehicle = line
        .vehicle
        .as_ref()
        .and_then(|v| v.vehicle_type.as_deref())
        .unwrap_or("");

    let mut instruction = String::from("Take ");
    if vehicle == "BUS" && !short_name.is_empty() {
        instruction.push_str("bus ");
        instruction.push_str(short_name);
    } else if !name.is_empty() {
        instruction.push_str("the ");
        instruction.push_str(name);
    } else {
        instruction.push_str("the transit");
    }

    if let Some(headsign) = headsign {
        instruction.push_str(" towards ");
        instruction.push_str(headsign);
    }

    instruction
}

/// Rail lines named by one transit line, matched case-insensitively on
/// its name (and short code, for lines that have one).
fn detect_rail_lines(line: &TransitLine) -> impl Iterator<Item = RailLine> {
    let name = line.name.as_deref().unwrap_or("").to_lowercase();
    let short_name = line.short_name.as_deref().unwrap_or("").to_lowercase();

    RailLine::all().iter().copied().filter(move |rail| {
        name.contains(rail.name_keyword())
            || rail
                .short_code()
                .is_some_and(|code| short_name.contains(code))
    })
}

/// Total walking time in whole minutes (ties to even), or `None` if no
/// walking.
fn walking_minutes(steps: &[Step]) -> Option<i64> {
    let seconds: i64 = steps
        .iter()
        .filter(|s| s.travel_mode == "WALKING")
        .filter_map(|s| s.duration.as_ref())
        .map(|d| d.value)
        .sum();

    if seconds <= 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let minutes = (seconds as f64 / 60.0).round_ties_even() as i64;
    Some(minutes)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ApiStatus;
    use crate::retry::{RetryPolicy, Sleeper};
    use crate::types::{DistanceMatrix, PlacesPage, PlacesRequest};

    fn routes(json: serde_json::Value) -> Vec<Route> {
        serde_json::from_value(json).unwrap()
    }

    fn red_line_route() -> Vec<Route> {
        routes(serde_json::json!([{
            "legs": [{
                "duration": { "text": "28 mins", "value": 1680 },
                "steps": [
                    {
                        "travel_mode": "WALKING",
                        "duration": { "text": "4 mins", "value": 250 },
                        "html_instructions": "Walk to <b>Belmont</b>"
                    },
                    {
                        "travel_mode": "TRANSIT",
                        "duration": { "text": "18 mins", "value": 1080 },
                        "html_instructions": "Subway towards 95th/Dan Ryan",
                        "transit_details": {
                            "headsign": "95th/Dan Ryan",
                            "line": {
                                "name": "Red Line",
                                "short_name": "Red",
                                "vehicle": { "type": "SUBWAY" }
                            }
                        }
                    },
                    {
                        "travel_mode": "WALKING",
                        "duration": { "text": "5 mins", "value": 290 },
                        "html_instructions": "Walk to <div style=\"x\">destination</div>"
                    }
                ]
            }]
        }]))
    }

    #[test]
    fn red_line_route_sets_only_red() {
        let result = summarize_routes(&red_line_route(), TravelMode::Transit);
        assert!(result.uses(RailLine::Red));
        for line in RailLine::all().iter().filter(|l| **l != RailLine::Red) {
            assert!(!result.uses(*line), "{line:?} should be false");
        }
    }

    #[test]
    fn summarizes_transit_leg() {
        let result = summarize_routes(&red_line_route(), TravelMode::Transit);
        assert_eq!(result.commute_time.as_deref(), Some("28 mins"));
        assert_eq!(result.num_steps, Some(3));
        assert_eq!(
            result.steps.unwrap(),
            vec![
                "Walk to Belmont".to_string(),
                "Take the Red Line towards 95th/Dan Ryan".to_string(),
                "Walk to destination".to_string(),
            ]
        );
        // 540 seconds
        assert_eq!(result.walking_time.as_deref(), Some("9 mins"));
    }

    #[test]
    fn driving_has_no_walking_time() {
        let result = summarize_routes(&red_line_route(), TravelMode::Driving);
        assert_eq!(result.walking_time, None);
        assert_eq!(result.num_steps, Some(3));
    }

    #[test]
    fn no_routes_is_default() {
        let result = summarize_routes(&[], TravelMode::Transit);
        assert_eq!(result, DirectionsResult::default());

        let result = summarize_routes(&[Route::default()], TravelMode::Transit);
        assert!(result.is_unavailable());
    }

    #[test]
    fn bus_uses_short_name() {
        let line = TransitLine {
            name: Some("Clark".to_string()),
            short_name: Some("22".to_string()),
            vehicle: Some(crate::types::Vehicle {
                vehicle_type: Some("BUS".to_string()),
            }),
        };
        assert_eq!(transit_instruction(&line, Some("Howard")), "Take bus 22 towards Howard");
    }

    #[test]
    fn unnamed_line_falls_back() {
        assert_eq!(
            transit_instruction(&TransitLine::default(), None),
            "Take the transit"
        );
    }

    #[test]
    fn other_vehicle_uses_line_name() {
        let line = TransitLine {
            name: Some("Metra UP-N".to_string()),
            short_name: None,
            vehicle: Some(crate::types::Vehicle {
                vehicle_type: Some("COMMUTER_TRAIN".to_string()),
            }),
        };
        assert_eq!(transit_instruction(&line, None), "Take the Metra UP-N");
    }

    #[test]
    fn brown_line_matches_short_code() {
        let line = TransitLine {
            name: Some("Ravenswood".to_string()),
            short_name: Some("Brn".to_string()),
            vehicle: None,
        };
        assert_eq!(detect_rail_lines(&line).collect::<Vec<_>>(), vec![RailLine::Brown]);
    }

    #[test]
    fn walking_rounds_ties_to_even() {
        let step = |secs| Step {
            travel_mode: "WALKING".to_string(),
            duration: Some(crate::types::TextValue {
                text: String::new(),
                value: secs,
            }),
            ..Step::default()
        };
        assert_eq!(walking_minutes(&[step(150)]), Some(2));
        assert_eq!(walking_minutes(&[step(210)]), Some(4));
        assert_eq!(walking_minutes(&[step(20)]), Some(0));
        assert_eq!(walking_minutes(&[]), None);
    }

    struct FakeClient {
        responses: Mutex<Vec<Result<Vec<Route>, MapsError>>>,
    }

    #[async_trait]
    impl MapsClient for FakeClient {
        async fn directions(&self, _request: &DirectionsRequest) -> Result<Vec<Route>, MapsError> {
            self.responses.lock().unwrap().remove(0)
        }

        async fn places_nearby(&self, _request: &PlacesRequest) -> Result<PlacesPage, MapsError> {
            unimplemented!()
        }

        async fn distance_matrix(
            &self,
            _origins: &[String],
            _destinations: &[String],
            _mode: TravelMode,
        ) -> Result<DistanceMatrix, MapsError> {
            unimplemented!()
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn resolver(responses: Vec<Result<Vec<Route>, MapsError>>) -> CommuteResolver {
        CommuteResolver::new(
            Arc::new(FakeClient {
                responses: Mutex::new(responses),
            }),
            ResilientCaller::with_sleeper(RetryPolicy::default(), Arc::new(NoSleep)),
        )
    }

    #[tokio::test]
    async fn resolves_after_quota_error() {
        let resolver = resolver(vec![
            Err(MapsError::Api {
                status: ApiStatus::OverQueryLimit,
                message: String::new(),
            }),
            Ok(red_line_route()),
        ]);
        let result = resolver.resolve("home", "work", TravelMode::Transit, None).await;
        assert!(result.uses(RailLine::Red));
    }

    #[tokio::test]
    async fn fatal_error_degrades_to_default() {
        let resolver = resolver(vec![Err(MapsError::Unexpected {
            message: "connection reset".to_string(),
        })]);
        let request = DirectionsRequest::new("home", "work", TravelMode::Transit, None);
        assert!(resolver.try_resolve(&request).await.is_none());

        let resolver = resolver_with_default_error();
        let result = resolver.resolve("home", "work", TravelMode::Driving, None).await;
        assert!(result.is_unavailable());
    }

    fn resolver_with_default_error() -> CommuteResolver {
        resolver(vec![Err(MapsError::Api {
            status: ApiStatus::InvalidRequest,
            message: String::new(),
        })])
    }

    #[tokio::test]
    async fn zero_routes_is_a_successful_default() {
        let resolver = resolver(vec![Ok(Vec::new())]);
        let request = DirectionsRequest::new("home", "work", TravelMode::Transit, None);
        assert_eq!(
            resolver.try_resolve(&request).await,
            Some(DirectionsResult::default())
        );
    }
}
