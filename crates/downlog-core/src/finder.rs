//! File finder: walks a log root and selects regular files by name substring
//! and modification day.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone};
use tracing::debug;
use walkdir::WalkDir;

use crate::archive::MatchedEntry;
use crate::error::{FetchError, FetchResult};

/// Half-open local-time window `[start, end)` covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    start: SystemTime,
    end: SystemTime,
}

impl DayWindow {
    /// Window from local midnight of `date` to local midnight of the next day.
    pub fn for_date(date: NaiveDate) -> FetchResult<Self> {
        let next = date.succ_opt().ok_or_else(|| {
            FetchError::InvalidTimestamp(format!("{date} has no following day"))
        })?;
        Ok(Self {
            start: local_midnight(date).into(),
            end: local_midnight(next).into(),
        })
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> SystemTime {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> SystemTime {
        self.end
    }

    /// Whether `time` falls inside the window.
    pub fn contains(&self, time: SystemTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// Local midnight. Zones that skip midnight for DST start the day at 01:00.
fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Find regular files under `root` whose base name contains `predicate` and
/// whose modification time falls on `date` (local time).
///
/// Symlinks are not followed, so every returned path lies inside `root`.
/// An empty `predicate` matches every name.
///
/// # Errors
///
/// - [`FetchError::SearchFailed`] if any part of the tree cannot be read;
///   no partial result is returned.
/// - [`FetchError::NotFound`] if nothing matched.
pub fn find(root: &Path, predicate: &str, date: NaiveDate) -> FetchResult<Vec<PathBuf>> {
    let window = DayWindow::for_date(date)?;
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| walk_failure(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().contains(predicate) {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| walk_failure(root, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| FetchError::search(entry.path(), e))?;
        if window.contains(modified) {
            debug!(path = %entry.path().display(), "matched log file");
            found.push(entry.into_path());
        }
    }

    if found.is_empty() {
        return Err(FetchError::NotFound(format!(
            "no files containing {predicate:?} modified on {date} under {}",
            root.display()
        )));
    }
    Ok(found)
}

/// [`find`], wrapping each match as a file entry for the archive builder.
pub fn find_entries(root: &Path, predicate: &str, date: NaiveDate) -> FetchResult<Vec<MatchedEntry>> {
    find(root, predicate, date).map(|paths| paths.into_iter().map(MatchedEntry::file).collect())
}

/// Whether `dir` holds at least one regular file at any depth.
pub fn contains_files(dir: &Path) -> FetchResult<bool> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| walk_failure(dir, e))?;
        if entry.file_type().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Convert a walk error into a search failure, keeping the failing path.
pub(crate) fn walk_failure(root: &Path, err: walkdir::Error) -> FetchError {
    let path = err.path().unwrap_or(root).to_path_buf();
    FetchError::SearchFailed {
        path,
        source: io::Error::from(err),
    }
}
