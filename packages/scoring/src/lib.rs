#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geospatial scoring of listings against static datasets.
//!
//! Crime incidents within 2 miles contribute `exp(-distance)` to the score
//! of their category. Affordable-housing developments within half a mile
//! are counted. Neither makes any external call. The datasets belong to
//! whoever loaded them; the scorer only holds shared read-only handles.

pub mod affordable;
pub mod crime;
pub mod dataset;

use std::path::Path;
use std::sync::Arc;

use listing_enrich_models::{AffordableSummary, Coordinate, CrimeScores};

pub use dataset::{AffordableDataset, CrimeDataset, DatasetError};

/// Scores listings against loaded datasets.
///
/// Cloning is cheap: clones share the same datasets.
#[derive(Debug, Clone, Default)]
pub struct GeoScorer {
    crime: Arc<CrimeDataset>,
    affordable: Arc<AffordableDataset>,
}

impl GeoScorer {
    /// Creates a scorer over already-loaded datasets.
    #[must_use]
    pub const fn new(crime: Arc<CrimeDataset>, affordable: Arc<AffordableDataset>) -> Self {
        Self { crime, affordable }
    }

    /// Loads whichever dataset files are given. A missing path leaves that
    /// dataset empty, so its scores come out as zero.
    ///
    /// # Errors
    ///
    /// * If a given file cannot be read or lacks required columns
    pub fn load(
        crime_csv: Option<&Path>,
        affordable_csv: Option<&Path>,
    ) -> Result<Self, DatasetError> {
        let crime = match crime_csv {
            Some(path) => CrimeDataset::from_path(path)?,
            None => {
                log::warn!("No crime dataset configured; crime scores will be zero");
                CrimeDataset::default()
            }
        };

        let affordable = match affordable_csv {
            Some(path) => AffordableDataset::from_path(path)?,
            None => {
                log::warn!(
                    "No affordable-housing dataset configured; affordable counts will be zero"
                );
                AffordableDataset::default()
            }
        };

        Ok(Self::new(Arc::new(crime), Arc::new(affordable)))
    }

    /// Crime scores around `origin`.
    #[must_use]
    pub fn crime_scores(&self, origin: Coordinate) -> CrimeScores {
        crime::score_crime(origin, &self.crime)
    }

    /// Affordable-housing summary around `origin`.
    #[must_use]
    pub fn affordable(&self, origin: Coordinate) -> AffordableSummary {
        affordable::summarize_affordable(origin, &self.affordable)
    }

    /// The loaded crime dataset.
    #[must_use]
    pub fn crime_dataset(&self) -> &CrimeDataset {
        &self.crime
    }

    /// The loaded affordable-housing dataset.
    #[must_use]
    pub fn affordable_dataset(&self) -> &AffordableDataset {
        &self.affordable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_from_csv() {
        let crime = CrimeDataset::from_reader(
            "Primary Type,Description,Latitude,Longitude\n\
             WEAPONS VIOLATION,RECKLESS FIREARM DISCHARGE,41.88,-87.63\n"
                .as_bytes(),
        )
        .unwrap();
        let affordable = AffordableDataset::from_reader(
            "DESCRIPTION,LATITUDE,LONGITUDE\nSupportive,41.88,-87.63\n".as_bytes(),
        )
        .unwrap();
        let scorer = GeoScorer::new(Arc::new(crime), Arc::new(affordable));

        let origin = Coordinate::new(41.88, -87.63);
        assert!((scorer.crime_scores(origin).gun_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(scorer.affordable(origin).count, 1);
    }

    #[test]
    fn scorer_borrows_loaded_datasets() {
        let mut crime = CrimeDataset::default();
        crime.push(Coordinate::new(41.88, -87.63), "THEFT", "RETAIL");
        let crime = Arc::new(crime);
        let affordable = Arc::new(AffordableDataset::default());

        let scorer = GeoScorer::new(Arc::clone(&crime), Arc::clone(&affordable));
        let copy = scorer.clone();

        assert!(std::ptr::eq(scorer.crime_dataset(), &*crime));
        assert!(std::ptr::eq(copy.crime_dataset(), &*crime));
        assert!(std::ptr::eq(copy.affordable_dataset(), &*affordable));
        assert_eq!(Arc::strong_count(&crime), 3);
        assert!(copy.crime_scores(Coordinate::new(41.88, -87.63)).theft_score > 0.0);
    }

    #[test]
    fn no_datasets_scores_zero() {
        let scorer = GeoScorer::load(None, None).unwrap();
        let origin = Coordinate::new(41.88, -87.63);
        assert_eq!(scorer.crime_scores(origin), CrimeScores::default());
        assert_eq!(scorer.affordable(origin), AffordableSummary::default());
    }
}
