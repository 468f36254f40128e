//! On-disk naming of every file the pipeline reads or writes.

use core::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use regionc_method::strip_signature;
use serde::{Deserialize, Serialize};

/// Which translation unit of a method an artifact belongs to.
///
/// `Outer` is the unit holding the method's exported entry, `Inner` the
/// body that other regions link against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitcodeUnit {
    Outer,
    Inner,
}

impl BitcodeUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            BitcodeUnit::Outer => "outer",
            BitcodeUnit::Inner => "inner",
        }
    }
}

impl Display for BitcodeUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

const BASE: &str = "hf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<stripped>/src`, accepting raw or stripped signatures.
    pub fn method_dir(&self, signature: &str) -> PathBuf {
        self.root.join(strip_signature(signature)).join("src")
    }

    pub fn bitcode(&self, signature: &str, unit: BitcodeUnit) -> PathBuf {
        self.bitcode_with_postfix(signature, unit, None)
    }

    pub fn bitcode_with_postfix(
        &self,
        signature: &str,
        unit: BitcodeUnit,
        postfix: Option<&str>,
    ) -> PathBuf {
        let name = match postfix {
            Some(postfix) => format!("{BASE}.{postfix}.{}.bc", unit.suffix()),
            None => format!("{BASE}.{}.bc", unit.suffix()),
        };
        self.method_dir(signature).join(name)
    }

    pub fn dependencies(&self, signature: &str) -> PathBuf {
        self.method_dir(signature).join("deps.lnk")
    }

    pub fn linked(&self, signature: &str) -> PathBuf {
        self.method_dir(signature).join(format!("{BASE}.lnk.bc"))
    }

    pub fn dead_code_eliminated(&self, signature: &str) -> PathBuf {
        self.method_dir(signature).join(format!("{BASE}.lnk.dce.bc"))
    }

    pub fn optimized(&self, signature: &str) -> PathBuf {
        self.method_dir(signature).join(format!("{BASE}.lnk.opt.bc"))
    }

    pub fn object(&self, signature: &str) -> PathBuf {
        self.method_dir(signature).join(format!("{BASE}.o"))
    }

    pub fn native_module(&self, signature: &str) -> PathBuf {
        self.method_dir(signature).join(format!("{BASE}.so"))
    }

    pub fn profile(&self) -> PathBuf {
        self.root.join("profile")
    }

    pub fn debug_profile(&self) -> PathBuf {
        self.root.join("profile.dbg_methods")
    }

    pub fn histogram(&self) -> PathBuf {
        self.root.join("invoke.hist")
    }

    pub fn metadata(&self) -> PathBuf {
        self.root.join("oat.aux")
    }

    pub fn blocklist(&self) -> PathBuf {
        self.root.join("methods.blocklist")
    }

    pub fn failed_list(&self) -> PathBuf {
        self.root.join("methods.comp.failed")
    }

    pub fn report(&self) -> PathBuf {
        self.root.join("compilation.report")
    }
}
