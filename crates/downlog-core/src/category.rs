//! Log categories: which root, predicate and selection kind each endpoint uses.
//!
//! The table is assembled once at startup and then only read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive::{ArchiveBuilder, MatchedEntry};
use crate::error::{FetchError, FetchResult};
use crate::finder::{contains_files, find_entries};
use crate::sandbox::resolve_id_dir;
use crate::selector::{SelectionKey, SelectionKind};

/// Tomcat `catalina` logs.
pub const CATALINA: &str = "catalina";
/// Universe backend logs.
pub const UNIVERSE: &str = "universe";
/// Every file under the Tomcat log directory.
pub const ALL_TOMCAT: &str = "alltomcat";
/// Scanner run directories, selected by scan id.
pub const SCANNERS: &str = "scaners";

/// Default root of [`CATALINA`].
pub const DEFAULT_CATALINA_ROOT: &str = "/app/edm/tomcat-9/logs/catalina";
/// Default root of [`UNIVERSE`].
pub const DEFAULT_UNIVERSE_ROOT: &str = "closed/universe_backend";
/// Default root of [`ALL_TOMCAT`].
pub const DEFAULT_TOMCAT_ROOT: &str = "/app/edm/tomcat-9/logs";
/// Default root of [`SCANNERS`].
pub const DEFAULT_SCAN_ROOT: &str = "/app/edm/scan/logs";

/// How file members of a category are named in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPolicy {
    /// Base name only.
    Flat,
    /// Relative to the category root.
    Relative,
}

/// One log category served by one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogCategory {
    name: String,
    root: PathBuf,
    predicate: String,
    kind: SelectionKind,
    layout: LayoutPolicy,
}

impl LogCategory {
    /// A date-keyed category matching base names that contain `predicate`.
    pub fn by_date(name: impl Into<String>, root: impl Into<PathBuf>, predicate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            predicate: predicate.into(),
            kind: SelectionKind::ByDate,
            layout: LayoutPolicy::Flat,
        }
    }

    /// An id-keyed category; the run directory is `root/<prefix><id>`.
    pub fn by_id(name: impl Into<String>, root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            predicate: prefix.into(),
            kind: SelectionKind::ById,
            layout: LayoutPolicy::Relative,
        }
    }

    /// Set the member layout.
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutPolicy) -> Self {
        self.layout = layout;
        self
    }

    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root directory searched by this category.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name substring (by date) or directory prefix (by id).
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// How requests select logs.
    pub fn kind(&self) -> SelectionKind {
        self.kind
    }

    /// How file members are named.
    pub fn layout(&self) -> LayoutPolicy {
        self.layout
    }

    /// Locate the entries selected by `key`.
    pub fn resolve(&self, key: &SelectionKey) -> FetchResult<Vec<MatchedEntry>> {
        match key {
            SelectionKey::Date(date) if self.kind == SelectionKind::ByDate => {
                find_entries(&self.root, &self.predicate, *date)
            }
            SelectionKey::Id(id) if self.kind == SelectionKind::ById => {
                let dir = resolve_id_dir(&self.root, &self.predicate, id)?;
                if !contains_files(&dir)? {
                    return Err(FetchError::NotFound(format!(
                        "scan directory {} holds no files",
                        dir.display()
                    )));
                }
                Ok(vec![MatchedEntry::directory(dir)])
            }
            _ => Err(FetchError::invalid_selector(format!(
                "category {} is selected {}, got a {} key",
                self.name,
                self.kind,
                key.kind()
            ))),
        }
    }

    /// Archive builder configured with this category's layout.
    pub fn archive_builder(&self) -> ArchiveBuilder {
        match self.layout {
            LayoutPolicy::Flat => ArchiveBuilder::flat(),
            LayoutPolicy::Relative => ArchiveBuilder::relative_to(&self.root),
        }
    }
}

/// Immutable lookup table of categories by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTable {
    categories: BTreeMap<String, LogCategory>,
}

impl CategoryTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The four categories of a standard Tomcat/EDM host, at their default roots.
    pub fn standard() -> Self {
        Self::new()
            .with_category(LogCategory::by_date(CATALINA, DEFAULT_CATALINA_ROOT, "catalina"))
            .with_category(LogCategory::by_date(UNIVERSE, DEFAULT_UNIVERSE_ROOT, ""))
            .with_category(
                LogCategory::by_date(ALL_TOMCAT, DEFAULT_TOMCAT_ROOT, "")
                    .with_layout(LayoutPolicy::Relative),
            )
            .with_category(LogCategory::by_id(SCANNERS, DEFAULT_SCAN_ROOT, ""))
    }

    /// Add or replace a category.
    #[must_use]
    pub fn with_category(mut self, category: LogCategory) -> Self {
        self.categories.insert(category.name.clone(), category);
        self
    }

    /// Point an existing category at another root; unknown names are ignored.
    #[must_use]
    pub fn with_root(mut self, name: &str, root: impl Into<PathBuf>) -> Self {
        if let Some(category) = self.categories.get_mut(name) {
            category.root = root.into();
        }
        self
    }

    /// Look up a category by endpoint name.
    pub fn get(&self, name: &str) -> Option<&LogCategory> {
        self.categories.get(name)
    }

    /// Categories in name order.
    pub fn iter(&self) -> impl Iterator<Item = &LogCategory> {
        self.categories.values()
    }

    /// Endpoint names in order.
    pub fn names(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
