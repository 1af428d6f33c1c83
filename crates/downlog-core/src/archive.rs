//! Archive builder: streams matched files and directories into a zip archive.
//!
//! The archive is written straight to any [`Write`] sink through
//! [`ZipWriter::new_stream`], so nothing is buffered beyond the current
//! member. Each source file is opened, copied and closed before the next one
//! is touched.
//!
//! Member naming:
//! - file entries follow the builder's [`MemberLayout`];
//! - directory entries keep their structure relative to the directory's
//!   parent, so the directory's own name becomes the top-level folder.
//!
//! Whatever happens while appending members, the central directory is
//! written exactly once before [`ArchiveBuilder::build`] returns.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{FetchError, FetchResult};
use crate::finder::walk_failure;

/// Members at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Label used for failures while writing the archive footer.
const FOOTER_LABEL: &str = "<central directory>";

/// Kind of a matched filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A single regular file.
    File,
    /// A directory archived recursively.
    Directory,
}

/// A filesystem entry selected for archiving.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchedEntry {
    path: PathBuf,
    kind: EntryKind,
}

impl MatchedEntry {
    /// A regular file entry.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    /// A directory entry.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    /// Path of the entry.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind of the entry.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }
}

/// How file entries are named inside the archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MemberLayout {
    /// Base name only; two files with the same name cannot share an archive.
    #[default]
    Flat,
    /// Path relative to the given base, with `/` separators. Files outside
    /// the base fall back to their base name.
    RelativeTo(PathBuf),
}

/// Counters reported after a successful build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Members written.
    pub members: usize,
    /// Uncompressed bytes copied from source files.
    pub bytes: u64,
}

/// Streams [`MatchedEntry`] lists into zip archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    layout: MemberLayout,
}

impl ArchiveBuilder {
    /// Create a builder with the given file naming layout.
    pub fn new(layout: MemberLayout) -> Self {
        Self { layout }
    }

    /// Builder that names files by base name.
    pub fn flat() -> Self {
        Self::new(MemberLayout::Flat)
    }

    /// Builder that names files relative to `base`.
    pub fn relative_to(base: impl Into<PathBuf>) -> Self {
        Self::new(MemberLayout::RelativeTo(base.into()))
    }

    /// The file naming layout.
    pub fn layout(&self) -> &MemberLayout {
        &self.layout
    }

    /// Write `entries`, in order, as a zip archive to `output`.
    ///
    /// Stops at the first failure. The central directory is written on every
    /// path, so a reader can always open what was produced; after a failure
    /// the archive simply lacks the remaining members.
    ///
    /// The output is not flushed; callers that buffer must flush or discard.
    pub fn build<W: Write>(&self, entries: &[MatchedEntry], output: W) -> FetchResult<ArchiveSummary> {
        let output_state = RefCell::new(OutputState::default());
        let mut zip = ZipWriter::new_stream(FusedOutput {
            inner: output,
            state: &output_state,
        });
        let mut session = Session::default();

        let appended = entries
            .iter()
            .try_for_each(|entry| self.append_entry(&mut zip, entry, &mut session));

        output_state.borrow_mut().closing = true;
        let finished = zip
            .finish()
            .map(drop)
            .map_err(|e| FetchError::archive(FOOTER_LABEL, zip_io(e)));
        let output_failure = output_state.into_inner().failure;

        if let Err(err) = &appended {
            warn!(
                members = session.summary.members,
                error = %err,
                "archive aborted, closing with members written so far"
            );
        }
        appended?;
        finished?;
        if let Some(source) = output_failure {
            return Err(FetchError::archive(FOOTER_LABEL, source));
        }
        Ok(session.summary)
    }

    fn append_entry<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        entry: &MatchedEntry,
        session: &mut Session,
    ) -> FetchResult<()> {
        match entry.kind() {
            EntryKind::File => {
                let name = self.file_member_name(entry.path());
                append_file(zip, entry.path(), name, session)
            }
            EntryKind::Directory => append_directory(zip, entry.path(), session),
        }
    }

    fn file_member_name(&self, path: &Path) -> String {
        match &self.layout {
            MemberLayout::Flat => base_name(path),
            MemberLayout::RelativeTo(base) => match path.strip_prefix(base) {
                Ok(relative) if !relative.as_os_str().is_empty() => member_name(relative),
                _ => base_name(path),
            },
        }
    }
}

/// Per-build bookkeeping.
#[derive(Debug, Default)]
struct Session {
    names: HashSet<String>,
    summary: ArchiveSummary,
}

/// Failure latch shared between [`ArchiveBuilder::build`] and its output.
#[derive(Debug, Default)]
struct OutputState {
    failure: Option<io::Error>,
    closing: bool,
}

/// Output wrapper that stops touching the sink after its first failure.
///
/// While members are appended, writes after a failure are refused. While the
/// footer is written they are dropped, so the zip writer finishes once and
/// has nothing left to retry when it is dropped.
struct FusedOutput<'a, W> {
    inner: W,
    state: &'a RefCell<OutputState>,
}

impl<W> FusedOutput<'_, W> {
    fn after_failure(&self, len: usize) -> io::Result<usize> {
        let state = self.state.borrow();
        match &state.failure {
            Some(_) if state.closing => Ok(len),
            Some(failure) => Err(io::Error::new(failure.kind(), failure.to_string())),
            None => Ok(len),
        }
    }

    fn record(&self, err: io::Error) {
        self.state.borrow_mut().failure = Some(err);
    }
}

impl<W: Write> Write for FusedOutput<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.borrow().failure.is_some() {
            return self.after_failure(buf.len());
        }
        match self.inner.write(buf) {
            Err(e) if e.kind() != io::ErrorKind::Interrupted => {
                self.record(e);
                self.after_failure(buf.len())
            }
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.state.borrow().failure.is_some() {
            return self.after_failure(0).map(drop);
        }
        self.inner.flush().or_else(|e| {
            self.record(e);
            self.after_failure(0).map(drop)
        })
    }
}

fn append_directory<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    session: &mut Session,
) -> FetchResult<()> {
    let base = dir.parent().unwrap_or(dir);

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| archive_walk_failure(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(base).unwrap_or(entry.path());
        append_file(zip, entry.path(), member_name(relative), session)?;
    }
    Ok(())
}

fn append_file<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: String,
    session: &mut Session,
) -> FetchResult<()> {
    if session.names.contains(&name) {
        return Err(FetchError::archive(
            path,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("duplicate archive member {name:?}"),
            ),
        ));
    }

    let mut file = File::open(path).map_err(|e| FetchError::archive(path, e))?;
    let metadata = file.metadata().map_err(|e| FetchError::archive(path, e))?;

    zip.start_file(name.as_str(), member_options(&metadata))
        .map_err(|e| FetchError::archive(path, zip_io(e)))?;
    let copied = io::copy(&mut file, zip).map_err(|e| FetchError::archive(path, e))?;

    debug!(member = %name, bytes = copied, "added archive member");
    session.summary.members += 1;
    session.summary.bytes += copied;
    session.names.insert(name);
    Ok(())
}

/// Deflate, source mtime and permission bits.
fn member_options(metadata: &Metadata) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(metadata.len() >= ZIP64_THRESHOLD);

    if let Some(modified) = metadata.modified().ok().and_then(zip_timestamp) {
        options = options.last_modified_time(modified);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
    }

    options
}

/// Zip timestamps are local wall-clock time, 1980 or later.
fn zip_timestamp(modified: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = modified.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

fn base_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || member_name(path),
        |name| name.to_string_lossy().replace('\\', "/"),
    )
}

/// Join normal components with `/`, whatever the host separator.
fn member_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().replace('\\', "/")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn zip_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::other(other),
    }
}

fn archive_walk_failure(dir: &Path, err: walkdir::Error) -> FetchError {
    match walk_failure(dir, err) {
        FetchError::SearchFailed { path, source } => FetchError::ArchiveFailed { path, source },
        other => other,
    }
}

/// Total size in bytes of the files `entries` would archive.
///
/// Directories are walked without following links, like the builder does.
pub fn estimate_size(entries: &[MatchedEntry]) -> FetchResult<u64> {
    let mut total = 0u64;
    for entry in entries {
        match entry.kind() {
            EntryKind::File => {
                let metadata = fs::metadata(entry.path())
                    .map_err(|e| FetchError::search(entry.path(), e))?;
                total = total.saturating_add(metadata.len());
            }
            EntryKind::Directory => {
                for item in WalkDir::new(entry.path()).follow_links(false) {
                    let item = item.map_err(|e| walk_failure(entry.path(), e))?;
                    if item.file_type().is_file() {
                        let metadata = item.metadata().map_err(|e| walk_failure(entry.path(), e))?;
                        total = total.saturating_add(metadata.len());
                    }
                }
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn write(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    /// Xorshift bytes; deflate cannot shrink them.
    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 32) as u8
            })
            .collect()
    }

    fn open(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    fn member_names(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn read_member(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
        let mut member = archive.by_name(name).unwrap();
        let mut contents = Vec::new();
        member.read_to_end(&mut contents).unwrap();
        contents
    }

    #[test]
    fn test_directory_keeps_structure_under_its_own_name() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        write(&root.join("a.txt"), b"alpha");
        write(&root.join("sub/b.txt"), b"bravo\nbravo\n");

        let mut out = Vec::new();
        let summary = ArchiveBuilder::flat()
            .build(&[MatchedEntry::directory(&root)], &mut out)
            .unwrap();
        assert_eq!(summary.members, 2);
        assert_eq!(summary.bytes, 5 + 12);

        let mut archive = open(out);
        let mut names = member_names(&mut archive);
        names.sort();
        assert_eq!(names, vec!["root/a.txt", "root/sub/b.txt"]);
        assert_eq!(read_member(&mut archive, "root/a.txt"), b"alpha");
        assert_eq!(read_member(&mut archive, "root/sub/b.txt"), b"bravo\nbravo\n");
    }

    #[test]
    fn test_flat_layout_uses_base_names() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("logs/catalina.out");
        let second = tmp.path().join("logs/old/catalina.2024.log");
        write(&first, b"first");
        write(&second, b"second");

        let mut out = Vec::new();
        ArchiveBuilder::flat()
            .build(&[MatchedEntry::file(&first), MatchedEntry::file(&second)], &mut out)
            .unwrap();

        let mut archive = open(out);
        assert_eq!(member_names(&mut archive), vec!["catalina.out", "catalina.2024.log"]);
        assert_eq!(read_member(&mut archive, "catalina.2024.log"), b"second");
    }

    #[test]
    fn test_relative_layout_keeps_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("logs");
        let nested = base.join("catalina/catalina.out");
        let top = base.join("localhost.log");
        write(&nested, b"n");
        write(&top, b"t");

        let mut out = Vec::new();
        ArchiveBuilder::relative_to(&base)
            .build(&[MatchedEntry::file(&nested), MatchedEntry::file(&top)], &mut out)
            .unwrap();

        let mut archive = open(out);
        assert_eq!(member_names(&mut archive), vec!["catalina/catalina.out", "localhost.log"]);
    }

    #[test]
    fn test_duplicate_flat_names_fail() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("a/catalina.out");
        let second = tmp.path().join("b/catalina.out");
        write(&first, b"1");
        write(&second, b"2");

        let mut out = Vec::new();
        let err = ArchiveBuilder::flat()
            .build(&[MatchedEntry::file(&first), MatchedEntry::file(&second)], &mut out)
            .unwrap_err();
        assert!(matches!(&err, FetchError::ArchiveFailed { path, .. } if path == &second));

        let mut archive = open(out);
        assert_eq!(member_names(&mut archive), vec!["catalina.out"]);
    }

    #[test]
    fn test_failure_midway_leaves_a_readable_archive() {
        let tmp = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (1..=5).map(|i| tmp.path().join(format!("f{i}.log"))).collect();
        for (i, path) in paths.iter().enumerate() {
            write(path, format!("file {i}").as_bytes());
        }
        // Third file disappears between search and archive.
        fs::remove_file(&paths[2]).unwrap();

        let entries: Vec<MatchedEntry> = paths.iter().map(MatchedEntry::file).collect();
        let mut out = Vec::new();
        let err = ArchiveBuilder::flat().build(&entries, &mut out).unwrap_err();
        assert!(matches!(&err, FetchError::ArchiveFailed { path, .. } if path == &paths[2]));

        let mut archive = open(out);
        assert_eq!(member_names(&mut archive), vec!["f1.log", "f2.log"]);
        assert_eq!(read_member(&mut archive, "f2.log"), b"file 1");
    }

    #[test]
    fn test_empty_entry_list_is_an_empty_archive() {
        let mut out = Vec::new();
        let summary = ArchiveBuilder::flat().build(&[], &mut out).unwrap();
        assert_eq!(summary, ArchiveSummary::default());
        assert_eq!(open(out).len(), 0);
    }

    /// Sink that accepts a fixed number of bytes, then fails like a closed socket.
    struct ClosingSink {
        remaining: usize,
        refused: usize,
    }

    impl ClosingSink {
        fn new(remaining: usize) -> Self {
            Self {
                remaining,
                refused: 0,
            }
        }
    }

    impl Write for ClosingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                self.refused += 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_output_failure_is_archive_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.log");
        write(&path, &vec![b'x'; 256 * 1024]);

        let err = ArchiveBuilder::flat()
            .build(&[MatchedEntry::file(&path)], ClosingSink::new(16))
            .unwrap_err();
        assert!(matches!(err, FetchError::ArchiveFailed { .. }));
    }

    #[test]
    fn test_closed_output_is_written_to_only_once_after_failing() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("a.log");
        let second = tmp.path().join("b.log");
        // Incompressible, so the encoder writes through while copying.
        write(&first, &noise(256 * 1024, 7));
        write(&second, b"b");

        let mut sink = ClosingSink::new(64);
        let err = ArchiveBuilder::flat()
            .build(&[MatchedEntry::file(&first), MatchedEntry::file(&second)], &mut sink)
            .unwrap_err();

        assert!(matches!(&err, FetchError::ArchiveFailed { path, source }
            if path == &first && source.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(sink.refused, 1);
    }

    #[test]
    fn test_footer_failure_is_reported() {
        let mut sink = ClosingSink::new(0);
        let err = ArchiveBuilder::flat().build(&[], &mut sink).unwrap_err();

        assert!(matches!(&err, FetchError::ArchiveFailed { path, .. }
            if path == Path::new(FOOTER_LABEL)));
        assert_eq!(sink.refused, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_bits_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.log");
        write(&path, b"x");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let mut out = Vec::new();
        ArchiveBuilder::flat()
            .build(&[MatchedEntry::file(&path)], &mut out)
            .unwrap();

        let mut archive = open(out);
        let member = archive.by_name("run.log").unwrap();
        assert_eq!(member.unix_mode().map(|m| m & 0o777), Some(0o640));
    }

    #[test]
    fn test_member_names_use_forward_slashes() {
        assert_eq!(member_name(Path::new("root/sub/b.txt")), "root/sub/b.txt");
        assert_eq!(member_name(Path::new("./root/a.txt")), "root/a.txt");
        assert_eq!(base_name(Path::new("/var/log/app.log")), "app.log");
    }

    #[test]
    fn test_estimate_counts_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("one.log");
        let dir = tmp.path().join("run");
        write(&file, &[0; 10]);
        write(&dir.join("a"), &[0; 20]);
        write(&dir.join("deep/b"), &[0; 30]);

        let size = estimate_size(&[MatchedEntry::file(&file), MatchedEntry::directory(&dir)]).unwrap();
        assert_eq!(size, 60);
    }

    #[test]
    fn test_estimate_fails_for_missing_entries() {
        let tmp = TempDir::new().unwrap();
        let err = estimate_size(&[MatchedEntry::file(tmp.path().join("gone"))]).unwrap_err();
        assert!(matches!(err, FetchError::SearchFailed { .. }));
    }
}
