//! Run configuration: file locations, environment overrides, tracked years.

use std::path::{Path, PathBuf};

use chrono::Datelike;

use crate::profile::{ProfileError, SiteProfile};

/// Environment variable naming a site profile JSON file.
pub const PROFILE_ENV: &str = "PARCEL_ENRICH_PROFILE";

/// Number of valuation years tracked when none are given.
pub const DEFAULT_YEAR_SPAN: i32 = 5;

/// Default input column holding the street address.
pub const DEFAULT_ADDRESS_COLUMN: &str = "Street Address";

/// Default input column holding the jurisdiction (county) name.
pub const DEFAULT_JURISDICTION_COLUMN: &str = "County";

/// `<output>.<suffix>` next to the output file.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".");
    name.push(suffix);
    output.with_file_name(name)
}

/// Checkpoint location: explicit path, or `<output>.checkpoint`.
pub fn checkpoint_path(output: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling(output, "checkpoint"))
}

/// Run log location: explicit path, or `<output>.runlog.jsonl`.
pub fn runlog_path(output: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling(output, "runlog.jsonl"))
}

/// Load the site profile from an explicit path, then `PARCEL_ENRICH_PROFILE`,
/// falling back to the built-in default.
pub fn load_profile(explicit: Option<&Path>) -> Result<SiteProfile, ProfileError> {
    let from_env = std::env::var_os(PROFILE_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading site profile");
            SiteProfile::from_file(&path)
        }
        None => Ok(SiteProfile::default()),
    }
}

/// The `span` years ending at `current`, ascending.
pub fn years_ending(current: i32, span: i32) -> Vec<i32> {
    ((current - span + 1)..=current).collect()
}

/// Default tracked years: the five ending at the current calendar year.
pub fn default_years() -> Vec<i32> {
    years_ending(chrono::Local::now().year(), DEFAULT_YEAR_SPAN)
}

/// Sort and deduplicate a year list.
pub fn normalize_years(mut years: Vec<i32>) -> Vec<i32> {
    years.sort_unstable();
    years.dedup();
    years
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_paths() {
        let out = Path::new("/data/enriched.csv");
        assert_eq!(
            checkpoint_path(out, None),
            PathBuf::from("/data/enriched.csv.checkpoint")
        );
        assert_eq!(
            runlog_path(out, None),
            PathBuf::from("/data/enriched.csv.runlog.jsonl")
        );
        assert_eq!(
            checkpoint_path(out, Some(Path::new("/tmp/cp"))),
            PathBuf::from("/tmp/cp")
        );
    }

    #[test]
    fn test_years() {
        assert_eq!(years_ending(2026, 5), vec![2022, 2023, 2024, 2025, 2026]);
        assert_eq!(default_years().len(), 5);
        assert_eq!(normalize_years(vec![2024, 2021, 2024]), vec![2021, 2024]);
    }

    #[test]
    fn test_explicit_profile_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"home_url":"https://county.test/"}"#).unwrap();
        let profile = load_profile(Some(&path)).unwrap();
        assert_eq!(profile.home_url, "https://county.test/");
    }
}
