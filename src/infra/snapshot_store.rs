use crate::calendar::snapshot::CalendarSnapshot;
use crate::common::error::{Result, ScraperError};
use crate::common::types::{ListingKey, ListingRecord};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A prior run's output, minus any entries that could not be trusted
#[derive(Debug, Clone, Default)]
pub struct PriorSnapshot {
    pub snapshot: CalendarSnapshot,
    /// Keys whose records were malformed and will be treated as new
    pub rejected: Vec<ListingKey>,
}

/// Load a previous run's output for merging.
///
/// The file must be a JSON object. Each entry that does not deserialize
/// into a listing record, or whose `link` differs from its key, is logged
/// and left out so the merge treats that listing as new.
pub fn load_prior(path: &Path) -> Result<PriorSnapshot> {
    let bytes = fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let entries = match value {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(ScraperError::Config(format!(
                "prior output '{}' must be a JSON object, found {}",
                path.display(),
                json_kind(&other)
            )))
        }
    };

    let mut prior = PriorSnapshot::default();
    for (key, entry) in entries {
        match serde_json::from_value::<ListingRecord>(entry) {
            Ok(record) if record.link == key => {
                let mut record = record;
                record.normalize_showtimes();
                prior.snapshot.insert(record);
            }
            Ok(record) => {
                warn!(listing = %key, link = %record.link, "Prior entry key does not match its link, treating as new");
                prior.rejected.push(key);
            }
            Err(e) => {
                warn!(listing = %key, error = %e, "Prior entry is malformed, treating as new");
                prior.rejected.push(key);
            }
        }
    }

    info!(
        file = %path.display(),
        listing_count = prior.snapshot.len(),
        rejected = prior.rejected.len(),
        "Loaded prior output"
    );
    Ok(prior)
}

/// Read a snapshot written by an earlier stage. Any malformed entry is an error.
pub fn read_snapshot(path: &Path) -> Result<CalendarSnapshot> {
    let bytes = fs::read(path)?;
    let snapshot: CalendarSnapshot = serde_json::from_slice(&bytes)?;
    debug!(file = %path.display(), listing_count = snapshot.len(), "Read snapshot");
    Ok(snapshot)
}

/// Write pretty JSON (non-ASCII kept as-is) in one atomic step
pub fn write_snapshot(path: &Path, snapshot: &CalendarSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    write_atomic(path, &bytes)
}

/// Write to a hidden sibling file, then rename it over `path`.
/// Parent directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| ScraperError::Config(format!("output path '{}' has no file name", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// `output/data.<unix seconds>.json` under `dir`
pub fn timestamped_output(dir: &Path, unix_secs: i64) -> PathBuf {
    dir.join(format!("data.{}.json", unix_secs))
}

/// Replace a trailing `.json` with `suffix`, or append `suffix` when absent.
/// `data.1.json` + `.llm.json` -> `data.1.llm.json`
pub fn derived_path(input: &Path, suffix: &str) -> PathBuf {
    let text = input.to_string_lossy();
    match text.strip_suffix(".json") {
        Some(stem) => PathBuf::from(format!("{}{}", stem, suffix)),
        None => PathBuf::from(format!("{}{}", text, suffix)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
