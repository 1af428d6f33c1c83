//! Confinement of caller-supplied identifiers to a category root.
//!
//! A scan id names a directory directly below the scanner log root. It is
//! accepted only as a single plain path component, and the resulting path is
//! canonicalized and checked against the canonical root so that symlinks
//! cannot point the archive elsewhere.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{FetchError, FetchResult};

/// Maximum accepted identifier length in bytes.
pub const MAX_ID_LENGTH: usize = 255;

/// Check that `id` is usable as one directory-name component.
pub fn validate_id(id: &str) -> FetchResult<()> {
    if id.is_empty() {
        return Err(FetchError::invalid_selector("scanid must be a non-empty string"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(FetchError::invalid_selector(format!(
            "scanid exceeds {MAX_ID_LENGTH} bytes"
        )));
    }
    if let Some(bad) = id.chars().find(|c| !is_id_char(*c)) {
        return Err(FetchError::invalid_selector(format!(
            "scanid may only contain ASCII letters, digits, '.', '_' and '-', found {bad:?}"
        )));
    }

    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(FetchError::invalid_selector(format!(
            "scanid {id:?} is not a plain directory name"
        ))),
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Resolve `root/<prefix><id>` to a canonical directory inside `root`.
///
/// # Errors
///
/// - [`FetchError::InvalidRequest`] if the id is not a plain name or the
///   resolved path escapes `root`.
/// - [`FetchError::NotFound`] if no such directory exists.
/// - [`FetchError::SearchFailed`] if `root` itself cannot be resolved.
pub fn resolve_id_dir(root: &Path, prefix: &str, id: &str) -> FetchResult<PathBuf> {
    validate_id(id)?;
    let name = format!("{prefix}{id}");
    validate_id(&name)?;

    let canonical_root = root
        .canonicalize()
        .map_err(|e| FetchError::search(root, e))?;
    let candidate = root.join(&name);

    let resolved = match candidate.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FetchError::NotFound(format!(
                "no scan directory {name:?} under {}",
                root.display()
            )));
        }
        Err(e) => return Err(FetchError::search(&candidate, e)),
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(FetchError::invalid_selector(format!(
            "scanid {id:?} resolves outside the scan log root"
        )));
    }
    if !resolved.is_dir() {
        return Err(FetchError::NotFound(format!(
            "{name:?} under {} is not a directory",
            root.display()
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("scan-0001")]
    #[test_case("20260123_run.7")]
    #[test_case("..hidden" ; "leading dots in a name")]
    fn test_plain_names_are_accepted(id: &str) {
        assert!(validate_id(id).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("." ; "current dir")]
    #[test_case(".." ; "parent dir")]
    #[test_case("../etc" ; "traversal")]
    #[test_case("a/b" ; "nested")]
    #[test_case("/etc/passwd" ; "absolute")]
    #[test_case("a\\b" ; "backslash")]
    #[test_case("a\0b" ; "nul byte")]
    #[test_case("a\"b" ; "double quote")]
    #[test_case("run 7" ; "space")]
    #[test_case("run;7" ; "semicolon")]
    #[test_case("r\u{e9}sum\u{e9}" ; "non ascii")]
    fn test_unsafe_ids_are_rejected(id: &str) {
        let err = validate_id(id).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn test_overlong_id_is_rejected() {
        let id = "a".repeat(MAX_ID_LENGTH + 1);
        assert!(validate_id(&id).is_err());
    }

    #[test]
    fn test_resolves_existing_directory() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("scan_42")).unwrap();

        let resolved = resolve_id_dir(root.path(), "scan_", "42").unwrap();
        assert_eq!(resolved, root.path().canonicalize().unwrap().join("scan_42"));
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let root = TempDir::new().unwrap();
        let err = resolve_id_dir(root.path(), "", "nope").unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[test]
    fn test_plain_file_is_not_found() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("run1"), b"x").unwrap();
        let err = resolve_id_dir(root.path(), "", "run1").unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[test]
    fn test_traversal_never_reaches_the_filesystem() {
        let root = TempDir::new().unwrap();
        let err = resolve_id_dir(root.path(), "", "..").unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn test_missing_root_is_search_failure() {
        let root = TempDir::new().unwrap();
        let err = resolve_id_dir(&root.path().join("missing"), "", "run1").unwrap_err();
        assert!(matches!(err, FetchError::SearchFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("evil")).unwrap();

        let err = resolve_id_dir(root.path(), "", "evil").unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_root_is_allowed() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();

        let resolved = resolve_id_dir(root.path(), "", "alias").unwrap();
        assert!(resolved.ends_with("real"));
    }
}
