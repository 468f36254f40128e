use std::collections::BTreeSet;

use ahash::AHashSet;
use regionc_method::MethodIdentity;
use regionc_profile::ColdClassification;
use regionc_utils::Profiler;

/// Everything one run learns about the methods it touched.
#[derive(Debug, Default)]
pub struct BuildSession {
    pub compiled: BTreeSet<MethodIdentity>,
    pub cant_compile: BTreeSet<String>,
    pub not_found: BTreeSet<String>,
    pub cold: BTreeSet<String>,
    pub skipped: BTreeSet<String>,
    pub histogram_additions: AHashSet<String>,
    pub debug_methods: BTreeSet<String>,
    pub classification: ColdClassification,
    pub warnings: Vec<String>,
    /// Framework-to-app histogram records left out of speculation
    pub histogram_dropped: usize,
    pub recompile_reasons: Vec<String>,
    pub profiler: Profiler,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_compiled(&self, signature: &str) -> bool {
        self.compiled.iter().any(|m| m.signature() == signature)
    }

    pub fn compiled_signatures(&self) -> impl Iterator<Item = &str> {
        self.compiled.iter().map(MethodIdentity::signature)
    }

    pub fn requires_recompilation(&self) -> bool {
        !self.recompile_reasons.is_empty()
    }

    pub fn request_recompilation(&mut self, reason: impl Into<String>) {
        self.recompile_reasons.push(reason.into());
    }
}
