use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("hot-method profile {} does not exist", .path.display())]
    Missing { path: PathBuf },
    #[error("hot-method profile {} has no methods", .path.display())]
    Empty { path: PathBuf },
    #[error("invalid blocklist regex `{rule}`")]
    InvalidRule {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProfileError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| ProfileError::Io { path, source }
    }

    /// Missing or empty profiles leave nothing to compile.
    pub fn is_fatal_input(&self) -> bool {
        matches!(self, ProfileError::Missing { .. } | ProfileError::Empty { .. })
    }
}
