//! Selector validation: turns a request method and JSON body into a
//! canonical [`SelectionKey`].
//!
//! Date-keyed categories accept `{"timestamp": "<RFC3339>"}` and reduce it to
//! the calendar date in the timestamp's own offset. Id-keyed categories
//! accept `{"scanid": "<id>"}`; the id is only checked for non-emptiness here
//! and is confined to the category root later by [`crate::sandbox`].

use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, FetchResult};

/// Maximum accepted request body: 1 MiB.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// The only method accepted by fetch endpoints.
pub const ALLOWED_METHOD: &str = "POST";

/// Date format of canonical date keys.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// How a log category is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Selected by the calendar date of a timestamp.
    ByDate,
    /// Selected by an opaque run identifier.
    ById,
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByDate => write!(f, "by-date"),
            Self::ById => write!(f, "by-id"),
        }
    }
}

/// A validated selection key.
///
/// Once constructed a key is never re-validated: dates are real calendar
/// dates and ids are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectionKey {
    /// Calendar date derived from an RFC3339 timestamp.
    Date(NaiveDate),
    /// Non-empty scan run identifier.
    Id(String),
}

impl SelectionKey {
    /// The selection kind this key belongs to.
    pub fn kind(&self) -> SelectionKind {
        match self {
            Self::Date(_) => SelectionKind::ByDate,
            Self::Id(_) => SelectionKind::ById,
        }
    }

    /// The date, for date keys.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Id(_) => None,
        }
    }

    /// The identifier, for id keys.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Date(_) => None,
            Self::Id(id) => Some(id),
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format(DATE_KEY_FORMAT)),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// Body of date-keyed requests.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DateSelection {
    #[serde(default)]
    timestamp: String,
}

/// Body of id-keyed requests.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdSelection {
    #[serde(default, alias = "scanId")]
    scanid: String,
}

/// Validate a complete request and produce its canonical key.
pub fn validate(method: &str, body: &[u8], kind: SelectionKind) -> FetchResult<SelectionKey> {
    check_method(method)?;
    if body.len() > MAX_BODY_BYTES {
        return Err(FetchError::PayloadTooLarge {
            limit: MAX_BODY_BYTES,
        });
    }
    parse_selection(body, kind)
}

/// Reject anything but POST.
pub fn check_method(method: &str) -> FetchResult<()> {
    if method == ALLOWED_METHOD {
        Ok(())
    } else {
        Err(FetchError::MethodNotAllowed(method.to_string()))
    }
}

/// Parse a JSON body into a key of the given kind.
pub fn parse_selection(body: &[u8], kind: SelectionKind) -> FetchResult<SelectionKey> {
    match kind {
        SelectionKind::ByDate => {
            let selection: DateSelection = parse_single_object(body)?;
            parse_timestamp(&selection.timestamp).map(SelectionKey::Date)
        }
        SelectionKind::ById => {
            let selection: IdSelection = parse_single_object(body)?;
            if selection.scanid.is_empty() {
                return Err(FetchError::invalid_selector("scanid must be a non-empty string"));
            }
            Ok(SelectionKey::Id(selection.scanid))
        }
    }
}

/// Reduce an RFC3339 timestamp to its calendar date in the timestamp's offset.
pub fn parse_timestamp(timestamp: &str) -> FetchResult<NaiveDate> {
    if timestamp.is_empty() {
        return Err(FetchError::InvalidTimestamp("timestamp is empty".to_string()));
    }
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.date_naive())
        .map_err(|e| FetchError::InvalidTimestamp(format!("{timestamp:?}: {e}")))
}

/// Decode exactly one JSON object; trailing content other than whitespace is
/// an error.
fn parse_single_object<T: DeserializeOwned>(body: &[u8]) -> FetchResult<T> {
    let first = body.iter().find(|b| !b.is_ascii_whitespace());
    if first != Some(&b'{') {
        return Err(FetchError::invalid_json("body must be a single JSON object"));
    }

    let mut de = serde_json::Deserializer::from_slice(body);
    let value = T::deserialize(&mut de)
        .map_err(|e| FetchError::invalid_json(format!("invalid JSON body: {e}")))?;
    de.end()
        .map_err(|_| FetchError::invalid_json("unexpected extra JSON content"))?;
    Ok(value)
}
