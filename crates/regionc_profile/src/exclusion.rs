use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use regionc_utils::fs::{LineFilter, SHARED_RW, read_lines_if_exists, write_atomic};
use tracing::{debug, info};

use crate::error::ProfileError;

/// Blocklist entries carrying this tag are matched as a full regex.
pub const REGEX_TAG: &str = "regex:";

#[derive(Debug, Clone)]
pub enum ExclusionRule {
    Exact(String),
    Regex(Regex),
}

impl ExclusionRule {
    pub fn parse(entry: &str) -> Result<Self, ProfileError> {
        match entry.strip_prefix(REGEX_TAG) {
            Some(pattern) => {
                // anchor so the whole method must match, not a substring
                let anchored = format!("^(?:{pattern})$");
                Regex::new(&anchored)
                    .map(ExclusionRule::Regex)
                    .map_err(|source| ProfileError::InvalidRule {
                        rule: entry.to_owned(),
                        source,
                    })
            }
            None => Ok(ExclusionRule::Exact(entry.to_owned())),
        }
    }

    pub fn matches(&self, method: &str) -> bool {
        match self {
            ExclusionRule::Exact(entry) => entry == method,
            ExclusionRule::Regex(regex) => regex.is_match(method),
        }
    }
}

/// Methods that must not be compiled: the user blocklist plus every method
/// that failed on an earlier run.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    rules: Vec<ExclusionRule>,
    failed: BTreeSet<String>,
    failed_path: Option<PathBuf>,
    dirty: bool,
}

impl ExclusionPolicy {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Loads both lists; either file may be absent.
    pub fn load(blocklist: &Path, failed_list: &Path) -> Result<Self, ProfileError> {
        let entries = read_lines_if_exists(blocklist, LineFilter::SkipBlankAndComments)
            .map_err(ProfileError::io(blocklist))?
            .unwrap_or_default();
        let rules = entries
            .iter()
            .map(|entry| ExclusionRule::parse(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let failed: BTreeSet<String> =
            read_lines_if_exists(failed_list, LineFilter::SkipBlankAndComments)
                .map_err(ProfileError::io(failed_list))?
                .unwrap_or_default()
                .into_iter()
                .collect();

        debug!(
            rules = rules.len(),
            failed = failed.len(),
            "loaded exclusion policy"
        );

        Ok(Self {
            rules,
            failed,
            failed_path: Some(failed_list.to_path_buf()),
            dirty: false,
        })
    }

    pub fn is_blocklisted(&self, method: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(method))
    }

    pub fn has_failed_before(&self, method: &str) -> bool {
        self.failed.contains(method)
    }

    pub fn is_excluded(&self, method: &str) -> bool {
        self.has_failed_before(method) || self.is_blocklisted(method)
    }

    /// Remembers a compilation failure; returns `true` if it is new.
    pub fn record_failure(&mut self, method: &str) -> bool {
        let inserted = self.failed.insert(method.to_owned());
        self.dirty |= inserted;
        inserted
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(String::as_str)
    }

    /// Writes the failed list back if it changed since loading.
    pub fn persist_failures(&mut self) -> Result<(), ProfileError> {
        let Some(path) = self.failed_path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let mut contents = String::new();
        for method in &self.failed {
            contents.push_str(method);
            contents.push('\n');
        }
        write_atomic(path, contents.as_bytes(), SHARED_RW).map_err(ProfileError::io(path))?;
        info!(
            path = %path.display(),
            failed = self.failed.len(),
            "updated failed-method list"
        );
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_exact_entry_is_literal() {
        let rule = ExclusionRule::parse("a.b.C.m()").unwrap();
        assert!(rule.matches("a.b.C.m()"));
        assert!(!rule.matches("a.b.C.m()x"));
        assert!(!rule.matches("xa.b.C.m()"));
    }

    #[test]
    fn test_regex_entry_is_full_match() {
        let rule = ExclusionRule::parse(r"regex:a\.b\..*").unwrap();
        assert!(rule.matches("a.b.C.m()"));
        assert!(!rule.matches("void a.b.C.m()"));

        let partial = ExclusionRule::parse(r"regex:C\.m").unwrap();
        assert!(!partial.matches("a.b.C.m()"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let err = ExclusionRule::parse("regex:(unclosed").unwrap_err();
        assert!(matches!(err, ProfileError::InvalidRule { .. }));
    }

    #[test]
    fn test_failures_persist_across_loads() {
        let dir = TempDir::new().unwrap();
        let blocklist = dir.path().join("methods.blocklist");
        let failed = dir.path().join("methods.comp.failed");
        fs::write(&blocklist, "# rules\nregex:.*\\.<clinit>\\(\\)\nvoid a.B.skip()\n").unwrap();

        let mut policy = ExclusionPolicy::load(&blocklist, &failed).unwrap();
        assert!(policy.is_blocklisted("void a.B.skip()"));
        assert!(policy.is_blocklisted("void a.B.<clinit>()"));
        assert!(!policy.is_excluded("void a.B.broken()"));

        assert!(policy.record_failure("void a.B.broken()"));
        assert!(!policy.record_failure("void a.B.broken()"));
        policy.persist_failures().unwrap();

        let reloaded = ExclusionPolicy::load(&blocklist, &failed).unwrap();
        assert!(reloaded.is_excluded("void a.B.broken()"));
        assert!(reloaded.has_failed_before("void a.B.broken()"));
        assert!(!reloaded.is_blocklisted("void a.B.broken()"));
    }
}
