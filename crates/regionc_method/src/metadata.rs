use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One line of the metadata file: `<stripped signature> <method index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub stripped: String,
    pub method_index: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataParseError {
    #[error("metadata line `{0}` is not `<stripped> <index>`")]
    Shape(String),
    #[error("metadata line `{line}` has an invalid method index")]
    Index { line: String },
}

impl MetadataEntry {
    pub fn new(stripped: impl Into<String>, method_index: u32) -> Self {
        Self {
            stripped: stripped.into(),
            method_index,
        }
    }
}

impl Display for MetadataEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stripped, self.method_index)
    }
}

impl FromStr for MetadataEntry {
    type Err = MetadataParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        // stripped names never contain spaces, so the last field is the index
        let line = line.trim();
        let Some((stripped, index)) = line.rsplit_once(' ') else {
            return Err(MetadataParseError::Shape(line.to_owned()));
        };
        let stripped = stripped.trim();
        if stripped.is_empty() {
            return Err(MetadataParseError::Shape(line.to_owned()));
        }
        let method_index = index.parse().map_err(|_| MetadataParseError::Index {
            line: line.to_owned(),
        })?;
        Ok(Self::new(stripped, method_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let entry: MetadataEntry = "void#a.b.C.m@@ 42".parse().unwrap();
        assert_eq!(entry, MetadataEntry::new("void#a.b.C.m@@", 42));
        assert_eq!(entry.to_string(), "void#a.b.C.m@@ 42");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "nospace".parse::<MetadataEntry>(),
            Err(MetadataParseError::Shape(_))
        ));
        assert!(matches!(
            "name abc".parse::<MetadataEntry>(),
            Err(MetadataParseError::Index { .. })
        ));
    }
}
