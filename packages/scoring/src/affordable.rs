//! Affordable-housing counts near a listing.

use std::collections::BTreeSet;

use listing_enrich_geo::distances_miles;
use listing_enrich_models::{AffordableSummary, Coordinate};

use crate::dataset::AffordableDataset;

/// Developments farther than this are not counted.
pub const AFFORDABLE_CUTOFF_MILES: f64 = 0.5;

/// Counts developments strictly inside [`AFFORDABLE_CUTOFF_MILES`] and
/// collects their distinct non-blank descriptions in first-seen order.
/// No decay is applied.
#[must_use]
pub fn summarize_affordable(origin: Coordinate, dataset: &AffordableDataset) -> AffordableSummary {
    if dataset.is_empty() {
        return AffordableSummary::default();
    }

    let distances = distances_miles(origin, dataset.coordinates());

    let mut count = 0;
    let mut seen = BTreeSet::new();
    let mut descriptions = Vec::new();

    for (distance, description) in distances.into_iter().zip(dataset.descriptions()) {
        if distance >= AFFORDABLE_CUTOFF_MILES || distance.is_nan() {
            continue;
        }
        count += 1;
        if !description.is_empty() && seen.insert(description.as_str()) {
            descriptions.push(description.clone());
        }
    }

    AffordableSummary {
        count,
        descriptions,
    }
}
