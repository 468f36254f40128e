use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::target::TargetTriple;

/// Optimization baseline shared by the optimize and compile stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptBaseline {
    None,
    Less,
    Default,
    Aggressive,
}

impl OptBaseline {
    pub fn flag(self) -> &'static str {
        match self {
            OptBaseline::None => "-O0",
            OptBaseline::Less => "-O1",
            OptBaseline::Default => "-O2",
            OptBaseline::Aggressive => "-O3",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OptBaseline::None => "none",
            OptBaseline::Less => "less",
            OptBaseline::Default => "default",
            OptBaseline::Aggressive => "aggressive",
        }
    }
}

impl Display for OptBaseline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptBaseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('-').to_ascii_lowercase().as_str() {
            "0" | "o0" | "none" => Ok(OptBaseline::None),
            "1" | "o1" | "less" => Ok(OptBaseline::Less),
            "2" | "o2" | "default" => Ok(OptBaseline::Default),
            "3" | "o3" | "aggressive" => Ok(OptBaseline::Aggressive),
            other => Err(format!("unknown optimization baseline `{other}`")),
        }
    }
}

/// External toolchain settings and the execution limits applied to every
/// tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub llvm_link: String,
    pub opt: String,
    pub llc: String,
    pub clang: String,

    /// Directory holding the managed runtime's shared library
    pub runtime_lib_dir: Option<PathBuf>,
    /// Library name passed as `-l<name>` when producing the module
    pub runtime_lib: String,

    pub baseline: OptBaseline,
    pub extra_opt_flags: Vec<String>,
    pub extra_llc_flags: Vec<String>,
    pub extra_link_flags: Vec<String>,

    /// Run `opt -dce` between link and optimize
    pub dead_code_elimination: bool,

    pub target: TargetTriple,

    pub timeout_secs: u64,
    pub long_timeout_secs: u64,
    /// Linked method count above which the long timeout is used
    pub long_tier_methods: usize,
    /// Link duration above which the long timeout is used
    pub long_tier_link_secs: u64,
    pub max_output_bytes: usize,
    pub slow_call_secs: u64,

    /// Print tool output even when the call succeeds
    pub verbose: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            llvm_link: "llvm-link".to_string(),
            opt: "opt".to_string(),
            llc: "llc".to_string(),
            clang: "clang".to_string(),
            runtime_lib_dir: None,
            runtime_lib: "art".to_string(),
            baseline: OptBaseline::Aggressive,
            extra_opt_flags: Vec::new(),
            extra_llc_flags: Vec::new(),
            extra_link_flags: Vec::new(),
            dead_code_elimination: true,
            target: TargetTriple::default(),
            timeout_secs: 60,
            long_timeout_secs: 120,
            long_tier_methods: 30,
            long_tier_link_secs: 10,
            max_output_bytes: 5000,
            slow_call_secs: 5,
            verbose: false,
        }
    }
}

impl ToolchainConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REGIONC_BASELINE") {
            config.baseline = val.parse().unwrap_or(OptBaseline::Aggressive);
        }

        if let Ok(val) = std::env::var("REGIONC_DCE") {
            config.dead_code_elimination = val.parse().unwrap_or(true);
        }

        if let Ok(val) = std::env::var("REGIONC_TARGET") {
            config.target = val.parse().unwrap_or_default();
        }

        if let Ok(val) = std::env::var("REGIONC_TOOL_TIMEOUT_SECS") {
            config.timeout_secs = val.parse().unwrap_or(60);
        }

        if let Ok(val) = std::env::var("REGIONC_TOOL_LONG_TIMEOUT_SECS") {
            config.long_timeout_secs = val.parse().unwrap_or(120);
        }

        if let Ok(val) = std::env::var("REGIONC_MAX_TOOL_OUTPUT") {
            config.max_output_bytes = val.parse().unwrap_or(5000);
        }

        if let Ok(val) = std::env::var("REGIONC_RUNTIME_LIB_DIR") {
            config.runtime_lib_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("REGIONC_TOOL_VERBOSE") {
            config.verbose = val.parse().unwrap_or(false);
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn long_timeout(&self) -> Duration {
        Duration::from_secs(self.long_timeout_secs)
    }

    pub fn slow_call_threshold(&self) -> Duration {
        Duration::from_secs(self.slow_call_secs)
    }

    /// Picks the timeout tier for everything after the link stage.
    pub fn timeout_for_region(&self, linked_methods: usize, link_time: Duration) -> Duration {
        if linked_methods > self.long_tier_methods
            || link_time > Duration::from_secs(self.long_tier_link_secs)
        {
            self.long_timeout()
        } else {
            self.timeout()
        }
    }
}
