#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Great-circle (haversine) distances in miles.
//!
//! Scoring a listing means measuring its distance to every row of a
//! static dataset, thousands of times per run. Datasets therefore keep
//! their coordinates column-wise in [`CoordinateColumns`] and
//! [`distances_miles`] walks the two columns in one tight loop, with the
//! reference point's trigonometry hoisted out.

use listing_enrich_models::Coordinate;

/// Earth radius in miles (6373 km at 0.62137 mi/km).
pub const EARTH_RADIUS_MILES: f64 = 6373.0 * 0.62137;

/// Parallel latitude/longitude columns in degrees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateColumns {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
}

impl CoordinateColumns {
    /// Creates empty columns with room for `capacity` points.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            latitudes: Vec::with_capacity(capacity),
            longitudes: Vec::with_capacity(capacity),
        }
    }

    /// Appends a point.
    pub fn push(&mut self, coordinate: Coordinate) {
        self.latitudes.push(coordinate.latitude);
        self.longitudes.push(coordinate.longitude);
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latitudes.len()
    }

    /// Returns `true` if there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latitudes.is_empty()
    }

    /// Returns the point at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Coordinate> {
        Some(Coordinate::new(
            *self.latitudes.get(index)?,
            *self.longitudes.get(index)?,
        ))
    }

    /// Latitude column.
    #[must_use]
    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    /// Longitude column.
    #[must_use]
    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }
}

impl FromIterator<Coordinate> for CoordinateColumns {
    fn from_iter<I: IntoIterator<Item = Coordinate>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut columns = Self::with_capacity(iter.size_hint().0);
        for coordinate in iter {
            columns.push(coordinate);
        }
        columns
    }
}

/// Distance in miles between two points.
#[must_use]
pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    haversine(lat1, a.longitude.to_radians(), lat1.cos(), b)
}

/// Distances in miles from `origin` to every point in `columns`, in
/// column order.
///
/// `NaN` coordinates yield `NaN` distances; filtering them is the
/// caller's job.
#[must_use]
pub fn distances_miles(origin: Coordinate, columns: &CoordinateColumns) -> Vec<f64> {
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();
    let cos_lat1 = lat1.cos();

    columns
        .latitudes
        .iter()
        .zip(&columns.longitudes)
        .map(|(&lat, &lon)| haversine(lat1, lon1, cos_lat1, Coordinate::new(lat, lon)))
        .collect()
}

#[inline]
fn haversine(lat1: f64, lon1: f64, cos_lat1: f64, b: Coordinate) -> f64 {
    let lat2 = b.latitude.to_radians();
    let lon2 = b.longitude.to_radians();

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + cos_lat1 * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}
