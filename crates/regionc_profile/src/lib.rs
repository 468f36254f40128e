//! Hot-method profile, debug profile and the exclusion policy.

pub mod classify;
pub mod debug;
pub mod error;
pub mod exclusion;
pub mod store;

pub use crate::classify::{ColdClassification, classify_cold_methods};
pub use crate::debug::{DebugProfile, MethodMatcher};
pub use crate::error::ProfileError;
pub use crate::exclusion::{ExclusionPolicy, ExclusionRule};
pub use crate::store::ProfileStore;
