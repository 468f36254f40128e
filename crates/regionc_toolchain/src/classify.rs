use serde::Serialize;

const TOOL_ERROR_MARKERS: &[&str] = &["error:", ": not found"];
const LINK_ERROR_MARKERS: &[&str] =
    &["clang: error:", "ld: error", "ld.lld: error", "undefined reference"];

/// What a tool's combined output says about the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputClass {
    pub tool_error: bool,
    pub link_error: bool,
    pub warning: bool,
}

impl OutputClass {
    pub fn of(output: &str) -> Self {
        Self {
            tool_error: TOOL_ERROR_MARKERS.iter().any(|m| output.contains(m)),
            link_error: LINK_ERROR_MARKERS.iter().any(|m| output.contains(m)),
            warning: output.contains("warning:"),
        }
    }

    pub fn has_error(self) -> bool {
        self.tool_error || self.link_error
    }

    pub fn is_clean(self) -> bool {
        !self.has_error() && !self.warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(OutputClass::of("").is_clean());

        let missing = OutputClass::of("sh: llc: not found");
        assert!(missing.tool_error && !missing.link_error);

        let link = OutputClass::of("clang: error: linker command failed with exit code 1");
        assert!(link.link_error && link.tool_error);

        let warn = OutputClass::of("hf.lnk.bc: warning: ignoring debug info");
        assert!(warn.warning && !warn.has_error());
    }

    #[test]
    fn test_error_words_outside_diagnostics_are_clean() {
        assert!(!OutputClass::of("remark: building with -Werror").tool_error);
        assert!(!OutputClass::of("inlined error_handler into run").has_error());
        assert!(OutputClass::of("opt: error: bad input").tool_error);
        assert!(OutputClass::of("hf.o: undefined reference to `f`").has_error());
    }
}
