//! Reading listings and writing enriched records.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use listing_enrich_cache::paths;
use listing_enrich_models::{Coordinate, EnrichedListing, Listing};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::PipelineError;

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// One header row, one row per listing.
    #[default]
    Csv,
    /// One JSON object per line.
    Jsonl,
}

const ID_COLUMN: &str = "ID";
const ADDRESS_COLUMN: &str = "ADDRESS";
const LATITUDE_COLUMN: &str = "LATITUDE";
const LONGITUDE_COLUMN: &str = "LONGITUDE";

/// Reads listings from a CSV file.
///
/// # Errors
///
/// * If the file cannot be opened or parsed
/// * If the `LATITUDE` or `LONGITUDE` column is missing
pub fn read_listings(path: &Path) -> Result<Vec<Listing>, PipelineError> {
    let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let listings = read_csv(reader)?;
    log::info!("Read {} listings from {}", listings.len(), path.display());
    Ok(listings)
}

/// Reads listings from any CSV source.
///
/// `ID`, `ADDRESS`, `LATITUDE` and `LONGITUDE` are matched ignoring case;
/// every other column is carried through to the output unchanged. A
/// missing `ID` column numbers listings by row. Rows without a usable
/// coordinate are skipped.
///
/// # Errors
///
/// * If the CSV cannot be parsed
/// * If the `LATITUDE` or `LONGITUDE` column is missing
pub fn read_listings_from(reader: impl Read) -> Result<Vec<Listing>, PipelineError> {
    read_csv(csv::ReaderBuilder::new().flexible(true).from_reader(reader))
}

fn read_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<Listing>, PipelineError> {
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let id = find(ID_COLUMN);
    let address = find(ADDRESS_COLUMN);
    let latitude = find(LATITUDE_COLUMN).ok_or(PipelineError::MissingColumn {
        column: LATITUDE_COLUMN,
    })?;
    let longitude = find(LONGITUDE_COLUMN).ok_or(PipelineError::MissingColumn {
        column: LONGITUDE_COLUMN,
    })?;
    let known = [id, address, Some(latitude), Some(longitude)];

    let mut listings = Vec::new();
    let mut skipped = 0usize;

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let coordinate = Coordinate::new(
            field(latitude).parse().unwrap_or(f64::NAN),
            field(longitude).parse().unwrap_or(f64::NAN),
        );
        if !coordinate.is_finite() {
            skipped += 1;
            continue;
        }

        let extra: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !known.contains(&Some(*i)))
            .map(|(i, h)| (h.clone(), field(i).to_owned()))
            .collect();

        listings.push(Listing {
            id: id.map_or_else(|| (row + 1).to_string(), |i| field(i).to_owned()),
            address: address.map(field).filter(|a| !a.is_empty()).map(str::to_owned),
            coordinate,
            extra,
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} listings without a usable coordinate");
    }

    Ok(listings)
}

/// Writes enriched records to `path`, creating the parent directory.
///
/// # Errors
///
/// * If the file cannot be created or written
pub fn write_output(
    path: &Path,
    format: OutputFormat,
    records: &[EnrichedListing],
) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        paths::ensure_dir(parent)?;
    }

    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    match format {
        OutputFormat::Csv => write_csv(file, records)?,
        OutputFormat::Jsonl => write_jsonl(file, records)?,
    }

    log::info!(
        "Wrote {} enriched listings to {} ({format})",
        records.len(),
        path.display()
    );
    Ok(())
}

/// Writes records as CSV. The header comes from the first record; every
/// record of one run has the same columns.
///
/// # Errors
///
/// * If writing fails
pub fn write_csv(writer: impl Write, records: &[EnrichedListing]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(writer);

    let Some(first) = records.first() else {
        writer.flush()?;
        return Ok(());
    };

    let header: Vec<String> = first.columns().into_iter().map(|(name, _)| name).collect();
    writer.write_record(&header)?;

    for record in records {
        let mut cells = record.to_map();
        writer.write_record(
            header
                .iter()
                .map(|name| cells.remove(name).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes records as JSON lines, with `null` for unavailable features.
///
/// # Errors
///
/// * If serialization or writing fails
pub fn write_jsonl(
    mut writer: impl Write,
    records: &[EnrichedListing],
) -> Result<(), PipelineError> {
    for record in records {
        serde_json::to_writer(&mut writer, &record.to_map())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
