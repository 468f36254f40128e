pub mod layout;
pub mod target;
pub mod toolchain;

pub use crate::layout::{BitcodeUnit, WorkspaceLayout};
pub use crate::target::{ArchFamily, TargetTriple};
pub use crate::toolchain::{OptBaseline, ToolchainConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Module locations whose code belongs to the privileged platform image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkLocations {
    pub prefixes: Vec<String>,
}

impl Default for FrameworkLocations {
    fn default() -> Self {
        Self {
            prefixes: vec!["/system/framework/".to_string(), "/apex/".to_string()],
        }
    }
}

impl FrameworkLocations {
    pub fn is_framework(&self, location: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| location.starts_with(prefix.as_str()))
    }
}

/// Profile handling options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Append methods needing manual addition to the profile after a run
    pub auto_grow: bool,

    /// Profile entries beyond this count are ignored
    pub max_hot_methods: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            auto_grow: false,
            max_hot_methods: 500,
        }
    }
}

impl ProfileConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REGIONC_AUTO_GROW_PROFILE") {
            config.auto_grow = val.parse().unwrap_or(false);
        }

        if let Ok(val) = std::env::var("REGIONC_MAX_HOT_METHODS") {
            config.max_hot_methods = val.parse().unwrap_or(500);
        }

        config
    }
}

/// Invoke histogram options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// More distinct candidates than this at one site is reported as megamorphic
    pub megamorphic_threshold: usize,
    pub framework: FrameworkLocations,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            megamorphic_threshold: 10,
            framework: FrameworkLocations::default(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the profile, histogram, metadata and per-method artifacts
    pub work_root: PathBuf,
    pub toolchain: ToolchainConfig,
    pub profile: ProfileConfig,
    pub histogram: HistogramConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_root: PathBuf::from("."),
            toolchain: ToolchainConfig::default(),
            profile: ProfileConfig::default(),
            histogram: HistogramConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            toolchain: ToolchainConfig::from_env(),
            profile: ProfileConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("REGIONC_WORK_ROOT") {
            config.work_root = PathBuf::from(val);
        }

        config
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.work_root)
    }

    /// Load configuration from TOML file
    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(_path: &Path) -> anyhow::Result<Self> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }

    /// Save configuration to TOML file
    #[cfg(feature = "toml-config")]
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Save configuration to TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn save_to_file(&self, _path: &Path) -> anyhow::Result<()> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }
}
