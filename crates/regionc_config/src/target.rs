//! Target description used to pick the native compile flags.

use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Architecture families with runtime-specific register reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchFamily {
    Aarch64,
    Arm,
    X86_64,
    X86,
    Other,
}

/// Target architecture/OS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTriple {
    /// Architecture (e.g., aarch64, armv7, x86_64)
    pub arch: String,
    /// Vendor (e.g., unknown, pc)
    pub vendor: String,
    /// Operating system (e.g., linux)
    pub os: String,
    /// ABI/environment (e.g., android, gnu, eabi)
    pub env: Option<String>,
}

const KNOWN_OS: &[&str] = &["linux", "android", "darwin", "none", "freebsd"];

impl TargetTriple {
    pub fn new(
        arch: impl Into<String>,
        vendor: impl Into<String>,
        os: impl Into<String>,
        env: Option<impl Into<String>>,
    ) -> Self {
        Self {
            arch: arch.into(),
            vendor: vendor.into(),
            os: os.into(),
            env: env.map(Into::into),
        }
    }

    /// Parse a target triple string (e.g., "aarch64-linux-android").
    ///
    /// A vendor-less triple whose second component is a known OS is read as
    /// `arch-os-env`.
    pub fn parse(triple: &str) -> Result<Self, String> {
        let parts: Vec<&str> = triple.split('-').filter(|p| !p.is_empty()).collect();
        let Some((&first, rest)) = parts.split_first() else {
            return Err(format!("Invalid target triple format: {triple}"));
        };
        if rest.len() < 2 {
            return Err(format!("Invalid target triple format: {triple}"));
        }

        // Normalize arm64 to aarch64 for LLVM compatibility
        let arch = if first == "arm64" { "aarch64" } else { first };

        let (vendor, os, env_parts) = if KNOWN_OS.contains(&rest[0]) {
            ("unknown", rest[0], &rest[1..])
        } else {
            (rest[0], rest[1], &rest[2..])
        };

        let env = if env_parts.is_empty() {
            None
        } else {
            Some(env_parts.join("-"))
        };

        Ok(Self::new(arch, vendor, os, env))
    }

    pub fn android_arm64() -> Self {
        Self::new("aarch64", "unknown", "linux", Some("android"))
    }

    pub fn android_arm() -> Self {
        Self::new("armv7", "unknown", "linux", Some("androideabi"))
    }

    pub fn family(&self) -> ArchFamily {
        match self.arch.as_str() {
            "aarch64" => ArchFamily::Aarch64,
            "x86_64" => ArchFamily::X86_64,
            "i386" | "i686" | "x86" => ArchFamily::X86,
            arch if arch.starts_with("arm") || arch.starts_with("thumb") => ArchFamily::Arm,
            _ => ArchFamily::Other,
        }
    }

    /// Convert to LLVM target triple string
    pub fn to_llvm_triple(&self) -> String {
        let mut triple = format!("{}-{}-{}", self.arch, self.vendor, self.os);
        if let Some(env) = &self.env {
            triple.push('-');
            triple.push_str(env);
        }
        triple
    }

    /// Flags that keep generated code off the registers the managed runtime
    /// owns: the thread register and the GC marking register.
    pub fn register_reservation_flags(&self) -> Vec<String> {
        match self.family() {
            ArchFamily::Aarch64 => vec![
                "-mattr=+reserve-x19,+reserve-x20".to_string(),
                "-enable-implicit-null-checks".to_string(),
            ],
            ArchFamily::Arm => vec!["-arm-reserve-r9".to_string()],
            ArchFamily::X86_64 | ArchFamily::X86 | ArchFamily::Other => Vec::new(),
        }
    }

    /// Full set of target flags handed to the native compile stage.
    pub fn compile_flags(&self) -> Vec<String> {
        let mut flags = vec![format!("-mtriple={}", self.to_llvm_triple())];
        flags.extend(self.register_reservation_flags());
        flags
    }

    /// Everything the runtime loads is a shared object, so PIC is required
    /// for all ELF targets.
    pub fn needs_pic(&self) -> bool {
        self.os != "none"
    }
}

impl FromStr for TargetTriple {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for TargetTriple {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_llvm_triple())
    }
}

impl Default for TargetTriple {
    fn default() -> Self {
        Self::android_arm64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_triple() {
        let triple = TargetTriple::parse("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(triple.arch, "x86_64");
        assert_eq!(triple.vendor, "unknown");
        assert_eq!(triple.os, "linux");
        assert_eq!(triple.env, Some("gnu".to_string()));
    }

    #[test]
    fn test_parse_vendorless_android() {
        let triple = TargetTriple::parse("arm64-linux-android").unwrap();
        assert_eq!(triple, TargetTriple::android_arm64());
        assert_eq!(triple.to_llvm_triple(), "aarch64-unknown-linux-android");
    }

    #[test]
    fn test_register_reservations() {
        let flags = TargetTriple::android_arm64().compile_flags();
        assert_eq!(flags[0], "-mtriple=aarch64-unknown-linux-android");
        assert!(flags.iter().any(|f| f.contains("+reserve-x19")));
        assert_eq!(
            TargetTriple::android_arm().register_reservation_flags(),
            vec!["-arm-reserve-r9".to_string()]
        );
        assert!(
            TargetTriple::parse("x86_64-linux-android")
                .unwrap()
                .register_reservation_flags()
                .is_empty()
        );
    }

    #[test]
    fn test_rejects_short_triple() {
        assert!(TargetTriple::parse("aarch64").is_err());
        assert!(TargetTriple::parse("aarch64-linux").is_err());
    }
}
