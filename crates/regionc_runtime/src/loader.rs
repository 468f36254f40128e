use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::path::PathBuf;

use ahash::AHashMap;
use libloading::Library;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use regionc_config::WorkspaceLayout;
use regionc_method::MetadataEntry;
use regionc_utils::fs::{LineFilter, read_lines_if_exists};
use tracing::{debug, info, warn};

use crate::entry::{LIVE_ENTRY_SYMBOL, NativeEntryPoint, RawEntryPoint};
use crate::error::LoaderError;

static GLOBAL_LOADER: OnceCell<RuntimeLoader> = OnceCell::new();

struct LoadedRegion {
    // keeps `entry` valid
    _library: Library,
    entry: NativeEntryPoint,
}

/// Native regions available to this process, keyed by method index.
pub struct RuntimeLoader {
    layout: WorkspaceLayout,
    enabled: AtomicBool,
    regions: RwLock<AHashMap<u32, LoadedRegion>>,
    metadata: RwLock<Vec<MetadataEntry>>,
    load_attempts: AtomicUsize,
}

impl RuntimeLoader {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self {
            layout,
            enabled: AtomicBool::new(true),
            regions: RwLock::new(AHashMap::new()),
            metadata: RwLock::new(Vec::new()),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Installs the process-wide loader; later calls return the first one.
    pub fn install(layout: WorkspaceLayout) -> &'static Self {
        GLOBAL_LOADER.get_or_init(|| Self::new(layout))
    }

    pub fn global() -> Option<&'static Self> {
        GLOBAL_LOADER.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Reads the metadata file and loads every region it lists.
    ///
    /// Without a metadata file native execution is turned off for the rest
    /// of the process. Returns how many regions were loaded.
    pub fn load_metadata(&self) -> Result<usize, LoaderError> {
        let path = self.layout.metadata();
        let lines = read_lines_if_exists(&path, LineFilter::SkipBlankAndComments).map_err(
            |source| LoaderError::Io {
                path: path.clone(),
                source,
            },
        )?;
        let Some(lines) = lines else {
            warn!(path = %path.display(), "no region metadata, native execution disabled");
            self.enabled.store(false, Ordering::Release);
            return Ok(0);
        };

        let entries = lines
            .iter()
            .map(|line| line.parse::<MetadataEntry>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| LoaderError::Corrupt {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), regions = entries.len(), "read region metadata");

        let mut loaded = 0;
        for entry in &entries {
            if self.load_region(&entry.stripped, entry.method_index)? {
                loaded += 1;
            }
        }
        *self.metadata.write() = entries;
        Ok(loaded)
    }

    /// Loads `hf.so` of one region and resolves its entrypoint.
    ///
    /// A region without a module on disk is skipped with a warning.
    pub fn load_region(&self, stripped: &str, method_index: u32) -> Result<bool, LoaderError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let path = self.module_path(stripped);
        if !path.is_file() {
            warn!(path = %path.display(), method_index, "native module not found");
            return Ok(false);
        }

        self.load_attempts.fetch_add(1, Ordering::Relaxed);
        // SAFETY: modules are produced by our own toolchain pipeline and have
        // no initializers with preconditions
        let library = unsafe { Library::new(&path) }.map_err(|source| LoaderError::Library {
            path: path.clone(),
            source,
        })?;
        // SAFETY: the symbol is emitted with the `RawEntryPoint` signature
        let raw = unsafe { library.get::<RawEntryPoint>(LIVE_ENTRY_SYMBOL.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|source| LoaderError::Symbol {
                path: path.clone(),
                symbol: LIVE_ENTRY_SYMBOL.to_string(),
                source,
            })?;

        debug!(path = %path.display(), method_index, "loaded native region");
        self.regions.write().insert(
            method_index,
            LoadedRegion {
                _library: library,
                entry: NativeEntryPoint::new(raw),
            },
        );
        Ok(true)
    }

    pub fn has_native_code(&self, method_index: u32) -> bool {
        self.is_enabled() && self.regions.read().contains_key(&method_index)
    }

    pub fn entry_point(&self, method_index: u32) -> Option<NativeEntryPoint> {
        if !self.is_enabled() {
            return None;
        }
        self.regions.read().get(&method_index).map(|region| region.entry)
    }

    /// Drops the module of one region. Entry points handed out earlier must
    /// not be called afterwards.
    pub fn unload(&self, method_index: u32) -> bool {
        let removed = self.regions.write().remove(&method_index).is_some();
        if removed {
            debug!(method_index, "unloaded native region");
        }
        removed
    }

    pub fn metadata(&self) -> Vec<MetadataEntry> {
        self.metadata.read().clone()
    }

    pub fn loaded_regions(&self) -> usize {
        self.regions.read().len()
    }

    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::Relaxed)
    }

    fn module_path(&self, stripped: &str) -> PathBuf {
        // stripped names pass through the layout unchanged
        self.layout.native_module(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_metadata_disables_loader() {
        let dir = TempDir::new().unwrap();
        let loader = RuntimeLoader::new(WorkspaceLayout::new(dir.path()));

        assert_eq!(loader.load_metadata().unwrap(), 0);
        assert!(!loader.is_enabled());
        assert!(!loader.has_native_code(7));
        assert!(loader.entry_point(7).is_none());

        // later requests are ignored once disabled
        fs::create_dir_all(dir.path().join("r@@/src")).unwrap();
        fs::write(dir.path().join("r@@/src/hf.so"), b"not elf").unwrap();
        assert!(!loader.load_region("r@@", 7).unwrap());
        assert_eq!(loader.load_attempts(), 0);
    }

    #[test]
    fn test_region_without_module_is_skipped() {
        let dir = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        fs::write(layout.metadata(), "void#a.B.run@@ 10\n").unwrap();
        let loader = RuntimeLoader::new(layout);

        assert_eq!(loader.load_metadata().unwrap(), 0);
        assert!(loader.is_enabled());
        assert_eq!(loader.metadata(), [MetadataEntry::new("void#a.B.run@@", 10)]);
        assert!(!loader.has_native_code(10));
        assert_eq!(loader.load_attempts(), 0);
    }

    #[test]
    fn test_corrupt_metadata_is_an_error() {
        let dir = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        fs::write(layout.metadata(), "void#a.B.run@@ ten\n").unwrap();
        let loader = RuntimeLoader::new(layout);

        assert!(matches!(loader.load_metadata(), Err(LoaderError::Corrupt { .. })));
    }

    #[test]
    fn test_invalid_module_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let module = layout.native_module("r@@");
        fs::create_dir_all(module.parent().unwrap()).unwrap();
        fs::write(&module, b"not a shared object").unwrap();
        let loader = RuntimeLoader::new(layout);

        let err = loader.load_region("r@@", 3).unwrap_err();
        assert!(matches!(err, LoaderError::Library { .. }));
        assert_eq!(loader.load_attempts(), 1);
        assert!(!loader.unload(3));
    }
}
