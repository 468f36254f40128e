use std::io;
use std::path::PathBuf;

use regionc_method::MetadataParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt metadata in {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: MetadataParseError,
    },
    #[error("failed to load native module {path}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("native module {path} does not export `{symbol}`")]
    Symbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
}
