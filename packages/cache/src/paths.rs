//! Default locations under the data directory.
//!
//! The data directory is `$LISTING_ENRICH_DATA_DIR` when set and
//! non-empty, otherwise `data/` relative to the working directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LISTING_ENRICH_DATA_DIR";

/// The data directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map_or_else(|| PathBuf::from("data"), PathBuf::from)
}

/// Default API result cache file, `<data>/cache/cache.duckdb`.
#[must_use]
pub fn cache_db_path() -> PathBuf {
    data_dir().join("cache").join("cache.duckdb")
}

/// Default directory for enriched output tables, `<data>/output`.
#[must_use]
pub fn output_dir() -> PathBuf {
    data_dir().join("output")
}

/// Creates `path` and any missing parents. An empty path is a no-op.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    log::debug!("Creating directory {}", path.display());
    std::fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_file_lives_under_data_dir() {
        let path = cache_db_path();
        assert!(path.starts_with(data_dir()));
        assert!(path.ends_with(Path::new("cache").join("cache.duckdb")));
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = std::env::temp_dir().join("listing_enrich_paths_test/a/b");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        ensure_dir(Path::new("")).unwrap();
    }
}
