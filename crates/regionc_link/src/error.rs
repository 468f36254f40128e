use std::io;
use std::path::PathBuf;

use regionc_method::IdentityParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to access dependency file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bad entry `{line}` in dependency file {}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: String,
        #[source]
        source: IdentityParseError,
    },
}
