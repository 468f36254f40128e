use std::path::Path;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regionc_utils::fs::{LineFilter, SHARED_RW, read_lines_if_exists, write_atomic};
use tracing::{debug, info, warn};

use crate::error::HistogramError;
use crate::record::{InvokeKey, InvokeRecord};

static GLOBAL_INVOKE_RECORDER: Lazy<InvokeRecorder> = Lazy::new(InvokeRecorder::new);

/// Process-wide aggregation of call-site observations.
///
/// Instrumented code on any thread calls [`InvokeRecorder::add_observation`];
/// the map is behind a mutex so concurrent increments are never lost.
#[derive(Default)]
pub struct InvokeRecorder {
    entries: Mutex<AHashMap<InvokeKey, u32>>,
}

impl InvokeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static InvokeRecorder {
        &GLOBAL_INVOKE_RECORDER
    }

    pub fn add_observation(&self, key: InvokeKey) {
        self.add_observations(key, 1);
    }

    /// Adds `times` to the key's counter, saturating at `u32::MAX`.
    pub fn add_observations(&self, key: InvokeKey, times: u32) {
        let mut entries = self.entries.lock();
        let count = entries.entry(key).or_insert(0);
        match count.checked_add(times) {
            Some(sum) => *count = sum,
            None => {
                if *count != u32::MAX {
                    warn!("invoke counter saturated at u32::MAX");
                }
                *count = u32::MAX;
            }
        }
    }

    pub fn count(&self, key: &InvokeKey) -> u32 {
        self.entries.lock().get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Merges the in-memory counts into the file at `path` and clears them.
    ///
    /// Existing rows are read first and summed with pending counts, so
    /// repeated flushes never duplicate or overwrite rows. Returns the number
    /// of rows written.
    pub fn persist(&self, path: &Path) -> Result<usize, HistogramError> {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            debug!("no invoke observations to persist");
            return Ok(0);
        }

        let mut merged: AHashMap<InvokeKey, u32> = AHashMap::new();
        let existing = read_lines_if_exists(path, LineFilter::Raw)
            .map_err(HistogramError::io(path))?
            .unwrap_or_default();
        for (idx, line) in existing.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let record =
                InvokeRecord::parse_line(line).map_err(|reason| HistogramError::Corrupt {
                    line_number: idx + 1,
                    line: line.clone(),
                    reason,
                })?;
            let count = merged.entry(record.key).or_insert(0);
            *count = count.saturating_add(record.count);
        }
        let previous_rows = merged.len();

        for (key, pending) in entries.iter() {
            let count = merged.entry(key.clone()).or_insert(0);
            *count = count.saturating_add(*pending);
        }

        let mut records: Vec<InvokeRecord> = merged
            .into_iter()
            .map(|(key, count)| InvokeRecord::new(key, count))
            .collect();
        records.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let mut contents = String::new();
        for record in &records {
            contents.push_str(&record.to_line());
            contents.push('\n');
        }
        write_atomic(path, contents.as_bytes(), SHARED_RW).map_err(HistogramError::io(path))?;

        info!(
            path = %path.display(),
            pending = entries.len(),
            previous_rows,
            rows = records.len(),
            "persisted invoke histogram"
        );
        entries.clear();
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::key;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_persist_sums_across_sessions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoke.hist");

        let first = InvokeRecorder::new();
        first.add_observations(key(1, 2, 3), 4);
        first.add_observation(key(1, 2, 5));
        assert_eq!(first.persist(&path).unwrap(), 2);
        assert!(first.is_empty());

        let second = InvokeRecorder::new();
        second.add_observations(key(1, 2, 3), 6);
        second.add_observation(key(9, 9, 9));
        assert_eq!(second.persist(&path).unwrap(), 3);

        let rows: Vec<InvokeRecord> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| InvokeRecord::parse_line(line).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        let merged = rows.iter().find(|r| r.key == key(1, 2, 3)).unwrap();
        assert_eq!(merged.count, 10);
    }

    #[test]
    fn test_persist_nothing_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoke.hist");
        assert_eq!(InvokeRecorder::new().persist(&path).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_aborts_on_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoke.hist");
        fs::write(&path, "garbage\n").unwrap();

        let recorder = InvokeRecorder::new();
        recorder.add_observation(key(1, 2, 3));
        assert!(matches!(
            recorder.persist(&path),
            Err(HistogramError::Corrupt { line_number: 1, .. })
        ));
        assert_eq!(recorder.count(&key(1, 2, 3)), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "garbage\n");
    }

    #[test]
    fn test_separator_in_location_survives_repeated_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoke.hist");
        let mut odd = key(1, 2, 3);
        odd.callee_location = "/data/app/a,b/base.apk".to_string();

        for _ in 0..2 {
            let recorder = InvokeRecorder::new();
            recorder.add_observations(odd.clone(), 3);
            assert_eq!(recorder.persist(&path).unwrap(), 1);
        }

        let contents = fs::read_to_string(&path).unwrap();
        let record = InvokeRecord::parse_line(contents.trim_end()).unwrap();
        assert_eq!(record.key, odd);
        assert_eq!(record.count, 6);
    }

    #[test]
    fn test_counter_saturates() {
        let recorder = InvokeRecorder::new();
        recorder.add_observations(key(1, 1, 1), u32::MAX - 1);
        recorder.add_observations(key(1, 1, 1), 5);
        recorder.add_observation(key(1, 1, 1));
        assert_eq!(recorder.count(&key(1, 1, 1)), u32::MAX);
    }

    #[test]
    fn test_concurrent_observations_are_not_lost() {
        let recorder = Arc::new(InvokeRecorder::new());
        let threads = 8;
        let per_thread = 2_000;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        recorder.add_observation(key(1, 2, 3));
                        recorder.add_observation(key(t, 0, i % 4));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(recorder.count(&key(1, 2, 3)), threads * per_thread);
        assert_eq!(recorder.count(&key(0, 0, 0)), per_thread / 4);
        assert_eq!(recorder.len(), 1 + threads as usize * 4);
    }
}
