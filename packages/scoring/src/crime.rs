//! Crime classification and decay-weighted scoring.
//!
//! Each incident lands in exactly one [`CrimeCategory`]. The rules are
//! checked in a fixed order (gun, drug, murder, theft, human) and the
//! first match wins, so a weapons-related description on an assault
//! still counts once, as a gun incident.

use listing_enrich_geo::distances_miles;
use listing_enrich_models::{Coordinate, CrimeCategory, CrimeScores};

use crate::dataset::CrimeDataset;

/// Incidents farther than this contribute nothing.
pub const CRIME_CUTOFF_MILES: f64 = 2.0;

const GUN_TYPES: &[&str] = &["WEAPONS VIOLATION", "CONCEALED CARRY LICENSE VIOLATION"];

/// Matched anywhere in the upper-cased description.
const GUN_KEYWORDS: &[&str] = &[
    "HANDGUN",
    "ARMOR",
    "GUN",
    "FIREARM",
    "AMMO",
    "AMMUNITION",
    "RIFLE",
];

const DRUG_TYPES: &[&str] = &["NARCOTICS", "OTHER NARCOTIC VIOLATION"];

const MURDER_TYPES: &[&str] = &["HOMICIDE"];

const THEFT_TYPES: &[&str] = &[
    "BURGLARY",
    "CRIM SEXUAL ASSAULT",
    "ASSAULT",
    "BATTERY",
    "ROBBERY",
    "MOTOR VEHICLE THEFT",
    "THEFT",
];

const HUMAN_TYPES: &[&str] = &[
    "OFFENSE INVOLVING CHILDREN",
    "SEX OFFENSE",
    "OBSCENITY",
    "KIDNAPPING",
    "PROSTITUTION",
    "HUMAN TRAFFICKING",
    "PUBLIC INDECENCY",
    "STALKING",
];

/// Classifies an incident by its primary type and description.
///
/// Type matches are exact after trimming and upper-casing; the gun
/// keyword match is a case-insensitive substring test on the
/// description.
#[must_use]
pub fn classify(primary_type: &str, description: &str) -> CrimeCategory {
    let primary_type = primary_type.trim().to_uppercase();
    let description = description.to_uppercase();

    if is_any(&primary_type, GUN_TYPES) || contains_any(&description, GUN_KEYWORDS) {
        return CrimeCategory::Gun;
    }
    if is_any(&primary_type, DRUG_TYPES) {
        return CrimeCategory::Drug;
    }
    if is_any(&primary_type, MURDER_TYPES) {
        return CrimeCategory::Murder;
    }
    if is_any(&primary_type, THEFT_TYPES) {
        return CrimeCategory::Theft;
    }
    if is_any(&primary_type, HUMAN_TYPES) {
        return CrimeCategory::Human;
    }

    CrimeCategory::Other
}

fn is_any(value: &str, candidates: &[&str]) -> bool {
    candidates.contains(&value)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Decay weight of an incident `distance_miles` away: 1 at the listing,
/// falling smoothly towards 0.
#[must_use]
pub fn decay_weight(distance_miles: f64) -> f64 {
    (-distance_miles).exp()
}

/// Sums decay weights per category over incidents strictly inside
/// [`CRIME_CUTOFF_MILES`].
///
/// An empty dataset (or one with nothing in range) yields all-zero
/// scores.
#[must_use]
pub fn score_crime(origin: Coordinate, dataset: &CrimeDataset) -> CrimeScores {
    let mut scores = CrimeScores::default();
    if dataset.is_empty() {
        return scores;
    }

    let distances = distances_miles(origin, dataset.coordinates());

    for (distance, category) in distances.into_iter().zip(dataset.categories()) {
        // NaN distances fail the comparison and are dropped.
        if distance < CRIME_CUTOFF_MILES {
            scores.add(*category, decay_weight(distance));
        }
    }

    scores
}
