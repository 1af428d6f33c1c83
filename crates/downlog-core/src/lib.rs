//! # downlog-core
//!
//! File selection and archive streaming for the downlog log-retrieval
//! service. Nothing in this crate knows about HTTP.
//!
//! ## Pipeline
//!
//! ```text
//! request body ──► selector ──► SelectionKey
//!                                   │
//!                 category ◄────────┘
//!                    │  by date: finder (name substring + local day window)
//!                    │  by id:   sandbox (confined run directory)
//!                    ▼
//!             Vec<MatchedEntry> ──► archive ──► zip bytes on any io::Write
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use downlog_core::{selector, CategoryTable};
//!
//! let table = CategoryTable::standard();
//! let category = table.get("catalina").unwrap();
//! let key = selector::validate(
//!     "POST",
//!     br#"{"timestamp":"2026-01-23T11:07:00+03:00"}"#,
//!     category.kind(),
//! )?;
//! let entries = category.resolve(&key)?;
//! let mut out = std::fs::File::create("catalina-2026-01-23.zip").unwrap();
//! category.archive_builder().build(&entries, &mut out)?;
//! # Ok::<(), downlog_core::FetchError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod category;
pub mod error;
pub mod finder;
pub mod sandbox;
pub mod selector;

pub use archive::{ArchiveBuilder, ArchiveSummary, EntryKind, MatchedEntry, MemberLayout, estimate_size};
pub use category::{CategoryTable, LayoutPolicy, LogCategory};
pub use error::{FetchError, FetchResult};
pub use finder::{DayWindow, find, find_entries};
pub use selector::{MAX_BODY_BYTES, SelectionKey, SelectionKind};
