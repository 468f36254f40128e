use std::io;
use std::path::PathBuf;

use regionc_histogram::HistogramError;
use regionc_link::LinkError;
use regionc_profile::ProfileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DriverError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| DriverError::Io { path, source }
    }
}
