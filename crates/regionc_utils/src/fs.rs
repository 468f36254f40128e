//! Small filesystem helpers for the line-oriented artifact files.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Permission bits for files other processes may rewrite (histogram, lists).
pub const SHARED_RW: u32 = 0o666;
/// Permission bits for build outputs other users only need to read.
pub const SHARED_RO: u32 = 0o644;

/// How [`read_lines`] treats blank and `#` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFilter {
    Raw,
    SkipBlankAndComments,
}

/// Reads a file into trimmed lines.
pub fn read_lines(path: &Path, filter: LineFilter) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| match filter {
            LineFilter::Raw => true,
            LineFilter::SkipBlankAndComments => !line.is_empty() && !line.starts_with('#'),
        })
        .map(str::to_owned)
        .collect())
}

/// Like [`read_lines`] but a missing file yields `None`.
pub fn read_lines_if_exists(path: &Path, filter: LineFilter) -> io::Result<Option<Vec<String>>> {
    match read_lines(path, filter) {
        Ok(lines) => Ok(Some(lines)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
pub fn relax_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn relax_permissions(path: &Path, _mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

/// Writes `contents` through a temp file in the same directory and renames
/// it into place, then applies `mode`.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;
    relax_permissions(path, mode)
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_lines_skips_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list");
        fs::write(&path, "# header\n\n  a()  \nb()\n#c()\n").unwrap();

        let lines = read_lines(&path, LineFilter::SkipBlankAndComments).unwrap();
        assert_eq!(lines, vec!["a()".to_string(), "b()".to_string()]);
        assert_eq!(read_lines(&path, LineFilter::Raw).unwrap().len(), 5);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let lines = read_lines_if_exists(&dir.path().join("nope"), LineFilter::Raw).unwrap();
        assert!(lines.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        write_atomic(&path, b"hello\n", SHARED_RW).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SHARED_RW);
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.o");
        fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }
}
