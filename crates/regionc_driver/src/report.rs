use core::fmt::{self, Display, Formatter};
use core::fmt::Write as _;
use std::path::Path;

use regionc_utils::fs::{SHARED_RW, write_atomic};
use serde::Serialize;

use crate::error::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub severity: Severity,
    pub title: String,
    pub items: Vec<String>,
}

/// End-of-run summary, ordered info first, then warnings, then errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompilationReport {
    pub entrypoint: String,
    pub sections: Vec<ReportSection>,
}

impl CompilationReport {
    pub fn new(entrypoint: impl Into<String>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            sections: Vec::new(),
        }
    }

    /// Adds a section; sections without items are dropped.
    pub fn push<I, S>(&mut self, severity: Severity, title: impl Into<String>, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            return;
        }
        let section = ReportSection {
            severity,
            title: title.into(),
            items,
        };
        // keep severity order stable while preserving insertion order within a tier
        let at = self
            .sections
            .iter()
            .position(|s| s.severity > severity)
            .unwrap_or(self.sections.len());
        self.sections.insert(at, section);
    }

    pub fn sections(&self, severity: Severity) -> impl Iterator<Item = &ReportSection> {
        self.sections.iter().filter(move |s| s.severity == severity)
    }

    pub fn has_errors(&self) -> bool {
        self.sections.iter().any(|s| s.severity == Severity::Error)
    }

    pub fn render(&self) -> String {
        let title = format!("Compilation report: {}", self.entrypoint);
        let mut out = render_banner(&[title.as_str()]);
        for section in &self.sections {
            let _ = writeln!(
                out,
                "[{}] {} ({})",
                section.severity,
                section.title,
                section.items.len()
            );
            for item in &section.items {
                let _ = writeln!(out, "    {item}");
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DriverError> {
        write_atomic(path, self.render().as_bytes(), SHARED_RW).map_err(DriverError::io(path))
    }
}

/// Boxes the lines with each one centered.
pub fn render_banner<S: AsRef<str>>(lines: &[S]) -> String {
    let width = lines
        .iter()
        .map(|line| line.as_ref().chars().count())
        .max()
        .unwrap_or(0)
        + 4;
    let border = format!("+{}+", "-".repeat(width));

    let mut out = String::new();
    let _ = writeln!(out, "{border}");
    for line in lines {
        let _ = writeln!(out, "|{:^width$}|", line.as_ref());
    }
    let _ = writeln!(out, "{border}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_ordered_by_severity() {
        let mut report = CompilationReport::new("void a.B.run()");
        report.push(Severity::Error, "not found", ["x()"]);
        report.push(Severity::Info, "compiled", ["a()", "b()"]);
        report.push(Severity::Warning, "already in profile but failed", ["c()"]);
        report.push(Severity::Info, "skipped", Vec::<String>::new());
        report.push(Severity::Info, "cold constructors", ["d.<init>()"]);

        let order: Vec<(Severity, &str)> = report
            .sections
            .iter()
            .map(|s| (s.severity, s.title.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                (Severity::Info, "compiled"),
                (Severity::Info, "cold constructors"),
                (Severity::Warning, "already in profile but failed"),
                (Severity::Error, "not found"),
            ]
        );
        assert!(report.has_errors());

        let text = report.render();
        let info = text.find("[INFO] compiled (2)").unwrap();
        assert!(info < text.find("[ERROR] not found (1)").unwrap());
    }

    #[test]
    fn test_banner_is_centered() {
        let banner = render_banner(&["Recompilation required", "ab"]);
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.chars().count() == lines[0].chars().count()));
        assert_eq!(lines[2], format!("|{:^26}|", "ab"));
    }

    #[test]
    fn test_json_round_trip_fields() {
        let mut report = CompilationReport::new("e()");
        report.push(Severity::Warning, "debug profile", ["e()"]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["sections"][0]["severity"], "Warning");
        assert_eq!(json["entrypoint"], "e()");
    }
}
