use core::cmp::Ordering;
use core::fmt::{self, Display, Formatter};
use core::hash::{Hash, Hasher};
use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of the bytecode module (dex file) that owns a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl Display for ModuleId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key of one bytecode method: owning module plus method index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId {
    pub module: ModuleId,
    pub index: u32,
}

impl MethodId {
    #[inline]
    pub const fn new(module: u32, index: u32) -> Self {
        Self {
            module: ModuleId(module),
            index,
        }
    }
}

impl Display for MethodId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.index)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityParseError {
    #[error("expected `module:index:signature`, got `{0}`")]
    Shape(String),
    #[error("invalid number `{value}` in method identity")]
    Number { value: String },
}

/// A method id paired with its human readable signature.
///
/// Equality, ordering and hashing only look at the id; the signature is
/// carried along for display and for artifact naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodIdentity {
    pub id: MethodId,
    pub signature: Arc<str>,
}

impl MethodIdentity {
    pub fn new(id: MethodId, signature: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            signature: signature.into(),
        }
    }

    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Form used in dependency sidecar files: `module:index:signature`.
    pub fn canonical(&self) -> String {
        format!("{}:{}:{}", self.id.module, self.id.index, self.signature)
    }
}

impl PartialEq for MethodIdentity {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MethodIdentity {}

impl Hash for MethodIdentity {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for MethodIdentity {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MethodIdentity {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Display for MethodIdentity {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature)
    }
}

impl FromStr for MethodIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(module), Some(index), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(IdentityParseError::Shape(s.to_owned()));
        };
        if signature.is_empty() {
            return Err(IdentityParseError::Shape(s.to_owned()));
        }
        let parse = |value: &str| {
            value.trim().parse::<u32>().map_err(|_| IdentityParseError::Number {
                value: value.to_owned(),
            })
        };
        Ok(Self::new(
            MethodId::new(parse(module)?, parse(index)?),
            signature,
        ))
    }
}
