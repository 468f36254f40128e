use std::path::Path;

use regionc_utils::fs::{LineFilter, read_lines_if_exists};
use tracing::debug;

use crate::error::ProfileError;

const WILDCARD: char = '*';

/// How a debug-profile entry selects methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Exact(String),
    /// Entry written with a trailing `*`; matches any method containing the
    /// remaining text.
    Contains(String),
}

impl MethodMatcher {
    pub fn parse(entry: &str) -> Self {
        match entry.strip_suffix(WILDCARD) {
            Some(stem) => MethodMatcher::Contains(stem.to_owned()),
            None => MethodMatcher::Exact(entry.to_owned()),
        }
    }

    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodMatcher::Exact(entry) => entry == method,
            MethodMatcher::Contains(stem) => method.contains(stem.as_str()),
        }
    }
}

/// Methods selected for extra debugging output in generated code.
#[derive(Debug, Clone, Default)]
pub struct DebugProfile {
    entries: Vec<String>,
    matchers: Vec<MethodMatcher>,
}

impl DebugProfile {
    /// A missing file yields an empty profile.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let entries = read_lines_if_exists(path, LineFilter::SkipBlankAndComments)
            .map_err(ProfileError::io(path))?
            .unwrap_or_default();
        debug!(entries = entries.len(), "loaded debug profile");
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        let matchers = entries.iter().map(|e| MethodMatcher::parse(e)).collect();
        Self { entries, matchers }
    }

    pub fn is_in_debug_profile(&self, method: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(method))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_wildcard() {
        let profile = DebugProfile::from_entries(["void a.B.run()", "a.C.*"]);

        assert!(profile.is_in_debug_profile("void a.B.run()"));
        assert!(!profile.is_in_debug_profile("void a.B.run(int)"));
        assert!(profile.is_in_debug_profile("int a.C.size()"));
        assert!(!profile.is_in_debug_profile("int a.D.size()"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let profile = DebugProfile::load(&dir.path().join("profile.dbg_methods")).unwrap();
        assert!(profile.is_empty());
        assert!(!profile.is_in_debug_profile("anything"));
    }
}
