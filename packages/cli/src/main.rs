#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Listing enrichment CLI.
//!
//! ```text
//! listing_enrich enrich --listings listings.csv [--output out.csv] [--format csv|jsonl]
//! listing_enrich score --lat 41.88 --lon -87.63
//! listing_enrich cache get <key>
//! listing_enrich cache purge
//! ```
//!
//! Every subcommand reads `enrich.toml` (or `--config`); a missing file
//! means all defaults. The maps API key is read from the environment
//! variable named in the config (`GOOGLE_MAPS_API_KEY` by default).

mod progress;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use listing_enrich_cache::{TtlCache, paths};
use listing_enrich_models::Coordinate;
use listing_enrich_pipeline::Enricher;
use listing_enrich_pipeline::config::{ConfigError, DEFAULT_CONFIG_FILE, EnrichConfig};
use listing_enrich_pipeline::io::{self, OutputFormat};
use listing_enrich_scoring::GeoScorer;

use crate::progress::IndicatifProgress;

#[derive(Parser)]
#[command(
    name = "listing_enrich",
    about = "Enrich real-estate listings with crime, housing, commute and nearby-place features"
)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a listings CSV
    Enrich {
        /// Listings CSV with ID, ADDRESS, LATITUDE and LONGITUDE columns
        #[arg(long)]
        listings: PathBuf,
        /// Output file (default: data/output/enriched.<format>)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Output format: csv or jsonl
        #[arg(long, default_value = "csv", value_parser = parse_format)]
        format: OutputFormat,
        /// Listings enriched at once (overrides the config)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print crime and affordable-housing scores for one location
    Score {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Inspect or maintain the API result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print the cached JSON for a key
    Get {
        /// Cache key, e.g. `directions|origin|destination|transit|now`
        key: String,
    },
    /// Delete expired entries
    Purge,
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    value
        .parse()
        .map_err(|_| format!("unknown format '{value}' (expected csv or jsonl)"))
}

/// Loads the config, falling back to defaults if the file does not exist.
fn load_config(path: &Path) -> Result<EnrichConfig, ConfigError> {
    if path.exists() {
        EnrichConfig::load(path)
    } else {
        log::warn!("{} not found, using default configuration", path.display());
        Ok(EnrichConfig::default())
    }
}

fn open_cache(config: &EnrichConfig) -> Result<TtlCache, listing_enrich_cache::CacheError> {
    TtlCache::open(&config.cache.path, &config.cache.table, config.cache.ttl())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Enrich {
            listings,
            output,
            format,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }

            let output = output
                .unwrap_or_else(|| paths::output_dir().join(format!("enriched.{format}")));

            let enricher = Enricher::from_config(&config)?;
            let listings = io::read_listings(&listings)?;

            let bar = IndicatifProgress::listings_bar(&multi, "Enriching listings");
            let records = enricher.enrich_all(listings, &bar).await;

            io::write_output(&output, format, &records)?;
            println!("Wrote {} listings to {}", records.len(), output.display());
        }
        Commands::Score { lat, lon } => {
            let origin = Coordinate::new(lat, lon);
            if !origin.is_finite() {
                return Err(format!("invalid coordinate {lat},{lon}").into());
            }

            let scorer = GeoScorer::load(
                config.datasets.crime_csv.as_deref(),
                config.datasets.affordable_csv.as_deref(),
            )?;

            let report = serde_json::json!({
                "coordinate": origin.to_string(),
                "crime": scorer.crime_scores(origin),
                "affordable": scorer.affordable(origin),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Cache { command } => {
            let cache = open_cache(&config)?;

            match command {
                CacheCommands::Get { key } => {
                    let Some(value) = cache.get_raw(&key)? else {
                        eprintln!("No live cache entry for {key}");
                        std::process::exit(1);
                    };
                    println!("{value}");
                }
                CacheCommands::Purge => {
                    let purged = cache.purge_expired()?;
                    println!("Purged {purged} expired entries ({} remaining)", cache.len()?);
                }
            }
        }
    }

    Ok(())
}
