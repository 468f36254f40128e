//! Method identities shared by every stage of the hot-region compiler.

pub mod catalog;
pub mod identity;
pub mod metadata;
pub mod signature;

pub use crate::catalog::MethodCatalog;
pub use crate::identity::{IdentityParseError, MethodId, MethodIdentity, ModuleId};
pub use crate::metadata::{MetadataEntry, MetadataParseError};
pub use crate::signature::strip_signature;
