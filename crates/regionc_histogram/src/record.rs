use core::cmp::Ordering;
use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::kind::InvokeKind;

pub(crate) const SEPARATOR: char = ',';
const FIELDS: usize = 9;

/// Identity of one observed call edge; everything but the count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvokeKey {
    /// Caller method index; 0 marks a static call recorded without a caller
    pub caller_index: u32,
    pub caller_location: String,
    /// Module file that holds the resolved callee
    pub callee_file: String,
    pub callee_location: String,
    pub pc: u32,
    pub callee_class: u32,
    pub callee_index: u32,
    pub kind: InvokeKind,
}

impl InvokeKey {
    pub fn is_static_call(&self) -> bool {
        self.caller_index == 0
    }

    fn sort_tuple(&self) -> (u32, &str, &str, u32, u32, InvokeKind, u32, &str) {
        (
            self.caller_index,
            &self.callee_file,
            &self.callee_location,
            self.callee_class,
            self.callee_index,
            self.kind,
            self.pc,
            &self.caller_location,
        )
    }
}

// Tie-break order for speculation ranking; caller_location comes last so
// the order stays total over every field of the key.
impl Ord for InvokeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_tuple().cmp(&other.sort_tuple())
    }
}

impl PartialOrd for InvokeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for InvokeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.caller_index,
            escape_field(&self.caller_location),
            escape_field(&self.callee_file),
            escape_field(&self.callee_location),
            self.pc,
            self.callee_class,
            self.callee_index,
            self.kind.as_raw(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvokeRecord {
    pub key: InvokeKey,
    pub count: u32,
}

impl InvokeRecord {
    pub fn new(key: InvokeKey, count: u32) -> Self {
        Self { key, count }
    }

    /// One persisted line, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{}{SEPARATOR}{}", self.key, self.count)
    }

    /// Parses one persisted line. Any field-count mismatch is an error.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        if fields.len() != FIELDS {
            return Err(format!(
                "expected {} separators, found {}",
                FIELDS - 1,
                fields.len() - 1
            ));
        }

        let number = |index: usize, name: &str| -> Result<u32, String> {
            fields[index]
                .trim()
                .parse::<u32>()
                .map_err(|err| format!("{name} `{}`: {err}", fields[index]))
        };

        let raw_kind = number(7, "invoke kind")?;
        let kind = InvokeKind::from_raw(raw_kind)
            .ok_or_else(|| format!("unknown invoke kind {raw_kind}"))?;

        Ok(Self {
            key: InvokeKey {
                caller_index: number(0, "caller index")?,
                caller_location: unescape_field(fields[1]),
                callee_file: unescape_field(fields[2]),
                callee_location: unescape_field(fields[3]),
                pc: number(4, "pc")?,
                callee_class: number(5, "callee class")?,
                callee_index: number(6, "callee method")?,
                kind,
            },
            count: number(8, "count")?,
        })
    }
}

/// Percent-encodes the characters that would break the line format.
fn escape_field(field: &str) -> Cow<'_, str> {
    if !field.contains([SEPARATOR, '%', '\n', '\r']) {
        return Cow::Borrowed(field);
    }
    let mut escaped = String::with_capacity(field.len() + 8);
    for ch in field.chars() {
        match ch {
            SEPARATOR => escaped.push_str("%2C"),
            '%' => escaped.push_str("%25"),
            '\n' => escaped.push_str("%0A"),
            '\r' => escaped.push_str("%0D"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Reverses [`escape_field`]; unknown escapes are kept literally.
fn unescape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let decoded = match tail.get(..3) {
            Some("%2C") => Some(SEPARATOR),
            Some("%25") => Some('%'),
            Some("%0A") => Some('\n'),
            Some("%0D") => Some('\r'),
            _ => None,
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn key(caller_index: u32, pc: u32, callee_index: u32) -> InvokeKey {
        InvokeKey {
            caller_index,
            caller_location: "/data/app/base.apk".to_string(),
            callee_file: "/data/app/base.apk".to_string(),
            callee_location: "/data/app/base.apk".to_string(),
            pc,
            callee_class: 7,
            callee_index,
            kind: InvokeKind::Virtual,
        }
    }

    #[test]
    fn test_line_round_trip() {
        let record = InvokeRecord::new(key(12, 4, 99), 31);
        let line = record.to_line();
        assert_eq!(
            line,
            "12,/data/app/base.apk,/data/app/base.apk,/data/app/base.apk,4,7,99,2,31"
        );
        assert_eq!(InvokeRecord::parse_line(&line).unwrap(), record);
    }

    #[test]
    fn test_separator_in_location_round_trips() {
        let mut odd = key(12, 4, 99);
        odd.caller_location = "/data/app/a,b/base.apk".to_string();
        odd.callee_file = "/data/app/100%/x\ny.apk".to_string();
        odd.callee_location = "/data/app/%2C/base.apk".to_string();
        let record = InvokeRecord::new(odd, 3);

        let line = record.to_line();
        assert!(!line.contains('\n'));
        assert_eq!(line.matches(SEPARATOR).count(), FIELDS - 1);
        assert_eq!(InvokeRecord::parse_line(&line).unwrap(), record);
    }

    #[test]
    fn test_unescaped_percent_is_literal() {
        let record = InvokeRecord::parse_line("1,/data/50%off.apk,b,c,4,7,99,2,3").unwrap();
        assert_eq!(record.key.caller_location, "/data/50%off.apk");
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        assert!(InvokeRecord::parse_line("1,a,b,c,4,7,99,2").is_err());
        assert!(InvokeRecord::parse_line("1,a,b,c,4,7,99,2,3,4").is_err());
        assert!(InvokeRecord::parse_line("1,a,b,c,4,7,99,9,3").is_err());
        assert!(InvokeRecord::parse_line("1,a,b,c,x,7,99,2,3").is_err());
    }

    #[test]
    fn test_key_order_is_total() {
        let mut a = key(1, 4, 10);
        let mut b = a.clone();
        b.caller_location = "/data/app/other.apk".to_string();
        assert_ne!(a.cmp(&b), Ordering::Equal);

        a.pc = 9;
        b = key(1, 2, 11);
        // callee index is compared before pc
        assert!(a < b);
    }
}
