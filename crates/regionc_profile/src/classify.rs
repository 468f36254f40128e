use ahash::AHashSet;
use serde::Serialize;

use crate::exclusion::ExclusionPolicy;
use crate::store::ProfileStore;

/// Where each method that was not compiled this run ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColdClassification {
    pub constructors: Vec<String>,
    pub already_in_profile_but_failed: Vec<String>,
    pub blocklisted_or_failed: Vec<String>,
    pub needs_manual_addition: Vec<String>,
}

impl ColdClassification {
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
            && self.already_in_profile_but_failed.is_empty()
            && self.blocklisted_or_failed.is_empty()
            && self.needs_manual_addition.is_empty()
    }
}

fn is_constructor(method: &str) -> bool {
    method.contains(".<init>(") || method.contains(".<clinit>(")
}

/// Partitions cold methods by name shape, profile membership, exclusion
/// policy and whether the histogram already proposed them.
///
/// Methods the histogram added are left out: the next run picks them up
/// without manual action.
pub fn classify_cold_methods<'a, I>(
    cold: I,
    profile: &ProfileStore,
    policy: &ExclusionPolicy,
    histogram_additions: &AHashSet<String>,
) -> ColdClassification
where
    I: IntoIterator<Item = &'a str>,
{
    let mut result = ColdClassification::default();
    let mut cold: Vec<&str> = cold.into_iter().collect();
    cold.sort_unstable();
    cold.dedup();

    for method in cold {
        let bucket = if is_constructor(method) {
            &mut result.constructors
        } else if profile.is_hot(method) {
            &mut result.already_in_profile_but_failed
        } else if policy.is_excluded(method) {
            &mut result.blocklisted_or_failed
        } else if !histogram_additions.contains(method) {
            &mut result.needs_manual_addition
        } else {
            continue;
        };
        bucket.push(method.to_owned());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::ExclusionRule;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cold_buckets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile");
        fs::write(&path, "void a.B.run()\nvoid a.B.hot()\n").unwrap();
        let profile = ProfileStore::load(&path, 500).unwrap();

        let blocked = ExclusionRule::parse("void a.B.blocked()").unwrap();
        let mut policy = ExclusionPolicy::new(vec![blocked]);
        policy.record_failure("void a.B.failed()");

        let additions: AHashSet<String> =
            ["void a.B.suggested()".to_string()].into_iter().collect();

        let cold = [
            "void a.B.<init>()",
            "void a.B.hot()",
            "void a.B.blocked()",
            "void a.B.failed()",
            "void a.B.suggested()",
            "void a.B.fresh()",
            "void a.B.fresh()",
        ];
        let result = classify_cold_methods(cold, &profile, &policy, &additions);

        assert_eq!(result.constructors, ["void a.B.<init>()"]);
        assert_eq!(result.already_in_profile_but_failed, ["void a.B.hot()"]);
        assert_eq!(
            result.blocklisted_or_failed,
            ["void a.B.blocked()", "void a.B.failed()"]
        );
        assert_eq!(result.needs_manual_addition, ["void a.B.fresh()"]);
    }
}
