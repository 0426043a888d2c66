//! Static geospatial datasets loaded from CSV.
//!
//! Records are stored column-wise (parallel coordinate columns plus one
//! label column) so scoring a listing is a single batch distance pass.
//! Rows with a missing or non-numeric coordinate are skipped and counted.

use std::io::Read;
use std::path::Path;

use listing_enrich_geo::CoordinateColumns;
use listing_enrich_models::{Coordinate, CrimeCategory};

use crate::crime::classify;

/// Errors from loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// The CSV could not be opened or parsed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Source file (or `<reader>`).
        path: String,
        /// Underlying error.
        source: csv::Error,
    },

    /// A required column is missing from the header row.
    #[error("{path}: missing required column '{column}'")]
    MissingColumn {
        /// Source file (or `<reader>`).
        path: String,
        /// Expected column name.
        column: &'static str,
    },
}

/// Crime incidents, each pre-classified into one [`CrimeCategory`].
#[derive(Debug, Clone, Default)]
pub struct CrimeDataset {
    coordinates: CoordinateColumns,
    categories: Vec<CrimeCategory>,
}

impl CrimeDataset {
    /// Column holding the incident type.
    pub const TYPE_COLUMN: &'static str = "Primary Type";
    /// Column holding the free-text description.
    pub const DESCRIPTION_COLUMN: &'static str = "Description";

    /// Adds one incident, classifying it immediately.
    pub fn push(&mut self, coordinate: Coordinate, primary_type: &str, description: &str) {
        self.coordinates.push(coordinate);
        self.categories.push(classify(primary_type, description));
    }

    /// Loads incidents from a CSV file.
    ///
    /// # Errors
    ///
    /// * If the file cannot be read or parsed
    /// * If a required column is missing
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let label = path.display().to_string();
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|source| DatasetError::Csv {
                path: label.clone(),
                source,
            })?;
        Self::from_csv(reader, &label)
    }

    /// Loads incidents from any CSV source.
    ///
    /// # Errors
    ///
    /// * If the CSV cannot be parsed
    /// * If a required column is missing
    pub fn from_reader(reader: impl Read) -> Result<Self, DatasetError> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        Self::from_csv(reader, "<reader>")
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>, label: &str) -> Result<Self, DatasetError> {
        let columns = Columns::resolve(
            &mut reader,
            label,
            &[Self::TYPE_COLUMN, Self::DESCRIPTION_COLUMN, "Latitude", "Longitude"],
        )?;

        let mut dataset = Self::default();
        let skipped = columns.for_each_row(reader, label, |coordinate, fields| {
            dataset.push(coordinate, fields[0], fields[1]);
        })?;

        log::info!(
            "Loaded {} crime incidents from {label} ({skipped} rows skipped)",
            dataset.len()
        );
        Ok(dataset)
    }

    /// Number of incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns `true` if there are no incidents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Incident locations.
    #[must_use]
    pub const fn coordinates(&self) -> &CoordinateColumns {
        &self.coordinates
    }

    /// Incident categories, parallel to [`Self::coordinates`].
    #[must_use]
    pub fn categories(&self) -> &[CrimeCategory] {
        &self.categories
    }
}

/// Affordable-housing developments.
#[derive(Debug, Clone, Default)]
pub struct AffordableDataset {
    coordinates: CoordinateColumns,
    descriptions: Vec<String>,
}

impl AffordableDataset {
    /// Column holding the development description.
    pub const DESCRIPTION_COLUMN: &'static str = "DESCRIPTION";

    /// Adds one development.
    pub fn push(&mut self, coordinate: Coordinate, description: impl Into<String>) {
        self.coordinates.push(coordinate);
        self.descriptions.push(description.into());
    }

    /// Loads developments from a CSV file.
    ///
    /// # Errors
    ///
    /// * If the file cannot be read or parsed
    /// * If a required column is missing
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let label = path.display().to_string();
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|source| DatasetError::Csv {
                path: label.clone(),
                source,
            })?;
        Self::from_csv(reader, &label)
    }

    /// Loads developments from any CSV source.
    ///
    /// # Errors
    ///
    /// * If the CSV cannot be parsed
    /// * If a required column is missing
    pub fn from_reader(reader: impl Read) -> Result<Self, DatasetError> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        Self::from_csv(reader, "<reader>")
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>, label: &str) -> Result<Self, DatasetError> {
        let columns = Columns::resolve(
            &mut reader,
            label,
            &[Self::DESCRIPTION_COLUMN, "LATITUDE", "LONGITUDE"],
        )?;

        let mut dataset = Self::default();
        let skipped = columns.for_each_row(reader, label, |coordinate, fields| {
            dataset.push(coordinate, fields[0]);
        })?;

        log::info!(
            "Loaded {} affordable-housing developments from {label} ({skipped} rows skipped)",
            dataset.len()
        );
        Ok(dataset)
    }

    /// Number of developments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    /// Returns `true` if there are no developments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    /// Development locations.
    #[must_use]
    pub const fn coordinates(&self) -> &CoordinateColumns {
        &self.coordinates
    }

    /// Development descriptions, parallel to [`Self::coordinates`].
    #[must_use]
    pub fn descriptions(&self) -> &[String] {
        &self.descriptions
    }
}

/// Header positions of the label columns followed by latitude and
/// longitude (always the last two requested names).
struct Columns {
    indices: Vec<usize>,
}

impl Columns {
    /// Finds each name in the header row, ignoring case and surrounding
    /// whitespace.
    fn resolve<R: Read>(
        reader: &mut csv::Reader<R>,
        label: &str,
        names: &[&'static str],
    ) -> Result<Self, DatasetError> {
        let headers = reader.headers().map_err(|source| DatasetError::Csv {
            path: label.to_string(),
            source,
        })?;

        let indices = names
            .iter()
            .map(|&name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name))
                    .ok_or_else(|| DatasetError::MissingColumn {
                        path: label.to_string(),
                        column: name,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { indices })
    }

    /// Calls `on_row` with the coordinate and label fields of every row
    /// that has a usable coordinate. Returns the number of skipped rows.
    fn for_each_row<R: Read>(
        &self,
        mut reader: csv::Reader<R>,
        label: &str,
        mut on_row: impl FnMut(Coordinate, &[&str]),
    ) -> Result<usize, DatasetError> {
        let (label_indices, coordinate_indices) = self.indices.split_at(self.indices.len() - 2);
        let mut skipped = 0usize;

        for result in reader.records() {
            let record = result.map_err(|source| DatasetError::Csv {
                path: label.to_string(),
                source,
            })?;

            let Some(coordinate) = parse_coordinate(
                record.get(coordinate_indices[0]),
                record.get(coordinate_indices[1]),
            ) else {
                skipped += 1;
                continue;
            };

            let fields: Vec<&str> = label_indices
                .iter()
                .map(|&i| record.get(i).unwrap_or("").trim())
                .collect();
            on_row(coordinate, &fields);
        }

        if skipped > 0 {
            log::warn!("{label}: skipped {skipped} rows without a usable coordinate");
        }

        Ok(skipped)
    }
}

fn parse_coordinate(latitude: Option<&str>, longitude: Option<&str>) -> Option<Coordinate> {
    let latitude = latitude?.trim().parse::<f64>().ok()?;
    let longitude = longitude?.trim().parse::<f64>().ok()?;
    let coordinate = Coordinate::new(latitude, longitude);
    coordinate.is_finite().then_some(coordinate)
}
