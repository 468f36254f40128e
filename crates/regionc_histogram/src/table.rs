use core::fmt::Write as _;

use colored::Colorize;
use regionc_config::FrameworkLocations;

use crate::record::{InvokeKey, InvokeRecord};

/// Callee module is part of the framework image.
pub fn is_internal(key: &InvokeKey, framework: &FrameworkLocations) -> bool {
    framework.is_framework(&key.callee_file)
}

fn short_location(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

/// Renders records as an aligned table, one row per record in the given order.
pub fn render_table(records: &[InvokeRecord], framework: &FrameworkLocations) -> String {
    let mut out = String::new();
    let header = format!(
        "{:>4} {:<20} {:<20} {:>6} {:>8} {:>8} {:>8} {:<11} {:>10} {:<8}",
        "#", "caller", "callee", "pc", "caller", "method", "class", "kind", "count", "type"
    );
    let _ = writeln!(out, "{}", header.bold());

    for (idx, record) in records.iter().enumerate() {
        let key = &record.key;
        let caller = if key.is_static_call() {
            "static".to_string()
        } else {
            key.caller_index.to_string()
        };
        let kind = if is_internal(key, framework) {
            "internal"
        } else {
            "normal"
        };
        let _ = writeln!(
            out,
            "{:>4} {:<20} {:<20} {:>6} {:>8} {:>8} {:>8} {:<11} {:>10} {:<8}",
            idx,
            short_location(&key.caller_location),
            short_location(&key.callee_location),
            key.pc,
            caller,
            key.callee_index,
            key.callee_class,
            key.kind.name(),
            record.count,
            kind
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::key;

    #[test]
    fn test_table_rows() {
        colored::control::set_override(false);
        let mut framework_callee = key(0, 0, 5);
        framework_callee.callee_file = "/system/framework/framework.jar".to_string();
        let records = [
            InvokeRecord::new(key(12, 4, 99), 31),
            InvokeRecord::new(framework_callee, 1),
        ];

        let table = render_table(&records, &FrameworkLocations::default());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("base.apk"));
        assert!(lines[1].contains("normal"));
        assert!(lines[2].contains("static"));
        assert!(lines[2].trim_end().ends_with("internal"));
    }
}
