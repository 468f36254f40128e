pub mod dependencies;
pub mod error;
pub mod linker;

pub use crate::dependencies::DependencySet;
pub use crate::error::LinkError;
pub use crate::linker::{DependencyLinker, LinkInputs};
