use core::fmt::{self, Display, Formatter};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// One external tool call, fully described before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout,
            max_output_bytes,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Path following the `-o` flag, if any.
    pub fn output_path(&self) -> Option<&Path> {
        self.args
            .iter()
            .position(|arg| arg == "-o")
            .and_then(|idx| self.args.get(idx + 1))
            .map(Path::new)
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

impl Display for ToolInvocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolStatus {
    Exited(i32),
    /// Terminated by a signal it did not get from us
    Signaled,
    /// Killed after exceeding the invocation timeout
    TimedOut,
}

impl Display for ToolStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Exited(code) => write!(f, "exit code {code}"),
            ToolStatus::Signaled => f.write_str("terminated by signal"),
            ToolStatus::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Result of running a [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub status: ToolStatus,
    /// Combined stdout and stderr; empty when `trimmed`
    pub output: String,
    /// Output exceeded the capture bound and was discarded
    pub trimmed: bool,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == ToolStatus::Exited(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_and_command_line() {
        let invocation = ToolInvocation::new("opt", Duration::from_secs(60), 5000)
            .arg("-O3")
            .args(["in.bc", "-o", "out.bc"]);

        assert_eq!(invocation.output_path(), Some(Path::new("out.bc")));
        assert_eq!(invocation.to_string(), "opt -O3 in.bc -o out.bc");
        assert_eq!(
            ToolInvocation::new("llvm-link", Duration::ZERO, 0).output_path(),
            None
        );
    }
}
