use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("corrupt histogram line {line_number} `{line}`: {reason}")]
    Corrupt {
        line_number: usize,
        line: String,
        reason: String,
    },
    #[error("failed to access histogram {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HistogramError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| HistogramError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
