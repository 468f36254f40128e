use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use regionc_utils::fs::{LineFilter, SHARED_RW, read_lines_if_exists, relax_permissions};
use tracing::{debug, info, warn};

use crate::error::ProfileError;

/// The ordered hot-method set; the first entry is the region entrypoint.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    methods: Vec<String>,
    lookup: AHashSet<String>,
}

impl ProfileStore {
    /// Loads the profile, keeping at most `max_methods` unique entries.
    pub fn load(path: &Path, max_methods: usize) -> Result<Self, ProfileError> {
        let lines = read_lines_if_exists(path, LineFilter::SkipBlankAndComments)
            .map_err(ProfileError::io(path))?
            .ok_or_else(|| ProfileError::Missing {
                path: path.to_path_buf(),
            })?;

        let mut store = Self {
            path: path.to_path_buf(),
            methods: Vec::with_capacity(lines.len().min(max_methods)),
            lookup: AHashSet::with_capacity(lines.len().min(max_methods)),
        };

        let mut skipped = 0_usize;
        for line in lines {
            if store.lookup.contains(&line) {
                debug!(method = %line, "duplicate profile entry");
                continue;
            }
            if store.methods.len() >= max_methods {
                skipped += 1;
                continue;
            }
            store.lookup.insert(line.clone());
            store.methods.push(line);
        }

        if skipped > 0 {
            warn!(
                limit = max_methods,
                skipped, "profile exceeds the hot-method limit, extra entries ignored"
            );
        }

        if store.methods.is_empty() {
            return Err(ProfileError::Empty {
                path: path.to_path_buf(),
            });
        }

        info!(
            path = %path.display(),
            methods = store.methods.len(),
            "loaded hot-method profile"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First profile entry; a loaded profile is never empty.
    pub fn entrypoint(&self) -> &str {
        self.methods.first().map_or("", String::as_str)
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn is_hot(&self, method: &str) -> bool {
        self.lookup.contains(method)
    }

    /// Appends methods not yet in the profile to the file on disk.
    ///
    /// Returns `true` when at least one method was added.
    pub fn append<S: AsRef<str>>(&mut self, new_methods: &[S]) -> Result<bool, ProfileError> {
        let additions: Vec<String> = new_methods
            .iter()
            .map(|m| m.as_ref().trim())
            .filter(|m| !m.is_empty() && !self.lookup.contains(*m))
            .map(str::to_owned)
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        if additions.is_empty() {
            return Ok(false);
        }

        let mut sorted = additions;
        sorted.sort();

        let needs_newline = std::fs::read(&self.path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(ProfileError::io(&self.path))?;
        let mut text = String::new();
        if needs_newline {
            text.push('\n');
        }
        for method in &sorted {
            text.push_str(method);
            text.push('\n');
        }
        file.write_all(text.as_bytes())
            .map_err(ProfileError::io(&self.path))?;
        relax_permissions(&self.path, SHARED_RW).map_err(ProfileError::io(&self.path))?;

        info!(added = sorted.len(), "appended methods to profile");
        for method in sorted {
            self.lookup.insert(method.clone());
            self.methods.push(method);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_profile(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("profile");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_orders_and_skips_comments() {
        let dir = TempDir::new().unwrap();
        let path = write_profile(&dir, "# hot\n\nvoid a.B.run()\nint a.C.size()\n");

        let store = ProfileStore::load(&path, 500).unwrap();
        assert_eq!(store.entrypoint(), "void a.B.run()");
        assert!(store.is_hot("int a.C.size()"));
        assert!(!store.is_hot("int a.C.size"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_missing_and_empty_are_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = ProfileStore::load(&dir.path().join("profile"), 500).unwrap_err();
        assert!(matches!(missing, ProfileError::Missing { .. }));
        assert!(missing.is_fatal_input());

        let path = write_profile(&dir, "# nothing here\n\n");
        let empty = ProfileStore::load(&path, 500).unwrap_err();
        assert!(matches!(empty, ProfileError::Empty { .. }));
    }

    #[test]
    fn test_cap_limits_entries() {
        let dir = TempDir::new().unwrap();
        let contents: String = (0..10).map(|i| format!("m{i}()\n")).collect();
        let path = write_profile(&dir, &contents);

        let store = ProfileStore::load(&path, 3).unwrap();
        assert_eq!(store.methods(), ["m0()", "m1()", "m2()"]);
    }

    #[test]
    fn test_append_grows_file() {
        let dir = TempDir::new().unwrap();
        let path = write_profile(&dir, "void a.B.run()");
        let mut store = ProfileStore::load(&path, 500).unwrap();

        assert!(store.append(&["z()", "void a.B.run()", "y()", "z()"]).unwrap());
        assert!(!store.append(&["y()"]).unwrap());

        let reloaded = ProfileStore::load(&path, 500).unwrap();
        assert_eq!(reloaded.methods(), ["void a.B.run()", "y()", "z()"]);
    }
}
