use core::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::Path;

use ahash::AHashMap;
use regionc_config::{FrameworkLocations, HistogramConfig};
use regionc_utils::fs::{LineFilter, read_lines_if_exists};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::HistogramError;
use crate::record::{InvokeKey, InvokeRecord};

/// One call site: the calling method and the pc of its invoke instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_index: u32,
    pub pc: u32,
}

/// Which records a load keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistogramFilter {
    /// Keep only records whose caller lives in this module location
    pub caller_location: Option<String>,
    /// Keep only one call site and derive its speculation set
    pub site: Option<CallSite>,
}

impl HistogramFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_location(location: impl Into<String>) -> Self {
        Self {
            caller_location: Some(location.into()),
            site: None,
        }
    }

    pub fn for_site(location: Option<String>, site: CallSite) -> Self {
        Self {
            caller_location: location,
            site: Some(site),
        }
    }
}

/// Loaded, filtered view of the invoke histogram.
#[derive(Debug, Clone)]
pub struct InvokeHistogram {
    records: Vec<InvokeRecord>,
    speculations: Vec<InvokeRecord>,
    site: Option<CallSite>,
    cross_boundary_dropped: usize,
    megamorphic_threshold: usize,
}

impl InvokeHistogram {
    /// Reads the histogram file; a missing file is an empty histogram.
    pub fn load(
        path: &Path,
        filter: &HistogramFilter,
        config: &HistogramConfig,
    ) -> Result<Self, HistogramError> {
        let lines = read_lines_if_exists(path, LineFilter::Raw)
            .map_err(HistogramError::io(path))?
            .unwrap_or_default();

        let mut records = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let record =
                InvokeRecord::parse_line(line).map_err(|reason| HistogramError::Corrupt {
                    line_number: idx + 1,
                    line: line.clone(),
                    reason,
                })?;
            records.push(record);
        }

        let histogram = Self::from_records(records, filter, config);
        debug!(
            path = %path.display(),
            records = histogram.records.len(),
            speculations = histogram.speculations.len(),
            "loaded invoke histogram"
        );
        Ok(histogram)
    }

    pub fn from_records<I>(records: I, filter: &HistogramFilter, config: &HistogramConfig) -> Self
    where
        I: IntoIterator<Item = InvokeRecord>,
    {
        let mut merged: AHashMap<InvokeKey, u32> = AHashMap::new();
        let mut cross_boundary_dropped = 0;

        for record in records {
            if !Self::passes(&record.key, filter) {
                trace!(record = %record.key, "histogram record filtered");
                continue;
            }
            if is_cross_boundary(&record.key, &config.framework) {
                warn!(record = %record.key, "ignoring framework-to-app call in histogram");
                cross_boundary_dropped += 1;
                continue;
            }
            let count = merged.entry(record.key).or_insert(0);
            *count = count.saturating_add(record.count);
        }

        let mut records: Vec<InvokeRecord> = merged
            .into_iter()
            .map(|(key, count)| InvokeRecord::new(key, count))
            .collect();
        records.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let mut histogram = Self {
            records,
            speculations: Vec::new(),
            site: filter.site,
            cross_boundary_dropped,
            megamorphic_threshold: config.megamorphic_threshold,
        };
        histogram.generate_speculation_map();
        histogram
    }

    fn passes(key: &InvokeKey, filter: &HistogramFilter) -> bool {
        let location_ok = filter
            .caller_location
            .as_ref()
            .is_none_or(|location| key.caller_location == *location);
        location_ok
            && filter
                .site
                .is_none_or(|site| key.caller_index == site.caller_index)
    }

    /// Rebuilds the ranked candidate list: descending count, ties broken by
    /// the key order. Calling it again yields the same list.
    pub fn generate_speculation_map(&mut self) {
        let site = self.site;
        let mut speculations: Vec<InvokeRecord> = self
            .records
            .iter()
            .filter(|record| site.is_none_or(|site| record.key.pc == site.pc))
            .cloned()
            .collect();
        speculations.sort_by(|a, b| (Reverse(a.count), &a.key).cmp(&(Reverse(b.count), &b.key)));

        if speculations.is_empty() {
            debug!(?site, "no speculation candidates");
        } else {
            info!(?site, candidates = speculations.len(), "loaded speculations");
        }
        self.speculations = speculations;
    }

    pub fn has_speculation(&self) -> bool {
        if self.site.is_none() {
            return !self.records.is_empty();
        }
        if self.is_megamorphic() {
            warn!(
                caller = self.site.map(|s| s.caller_index),
                pc = self.site.map(|s| s.pc),
                candidates = self.speculations.len(),
                "megamorphic call site, too many speculation candidates"
            );
        }
        !self.speculations.is_empty()
    }

    pub fn is_megamorphic(&self) -> bool {
        self.site.is_some() && self.speculations.len() > self.megamorphic_threshold
    }

    pub fn speculations(&self) -> &[InvokeRecord] {
        &self.speculations
    }

    pub fn records(&self) -> &[InvokeRecord] {
        &self.records
    }

    pub fn site(&self) -> Option<CallSite> {
        self.site
    }

    pub fn cross_boundary_dropped(&self) -> usize {
        self.cross_boundary_dropped
    }

    /// Splits the records of one caller into a per-site view for every pc
    /// it invoked from, in pc order.
    pub fn call_sites(&self, caller_index: u32) -> Vec<InvokeHistogram> {
        let records: Vec<InvokeRecord> = self
            .records
            .iter()
            .filter(|record| record.key.caller_index == caller_index)
            .cloned()
            .collect();
        let pcs: BTreeSet<u32> = records.iter().map(|record| record.key.pc).collect();

        pcs.into_iter()
            .map(|pc| {
                let mut histogram = Self {
                    records: records.clone(),
                    speculations: Vec::new(),
                    site: Some(CallSite { caller_index, pc }),
                    cross_boundary_dropped: 0,
                    megamorphic_threshold: self.megamorphic_threshold,
                };
                histogram.generate_speculation_map();
                histogram
            })
            .collect()
    }
}

/// Framework code calling into app code must never be speculated on.
pub fn is_cross_boundary(key: &InvokeKey, framework: &FrameworkLocations) -> bool {
    framework.is_framework(&key.caller_location) && !framework.is_framework(&key.callee_location)
}
