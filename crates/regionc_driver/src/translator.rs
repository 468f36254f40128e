use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use regionc_config::BitcodeUnit;
use regionc_histogram::InvokeHistogram;
use regionc_method::{MethodCatalog, MethodIdentity, strip_signature};
use regionc_utils::fs::{LineFilter, read_lines_if_exists};

use crate::context;

/// Where a translation must put its two bitcode units.
#[derive(Debug, Clone)]
pub struct TranslationRequest<'a> {
    pub method: &'a MethodIdentity,
    pub outer: PathBuf,
    pub inner: PathBuf,
    pub debug: bool,
    /// Observed callees of each call site in the method, ranked
    pub call_sites: &'a [InvokeHistogram],
}

/// Bytecode to LLVM bitcode translation for one method.
///
/// Runs with a [`crate::CompilationContext`] installed on the calling
/// thread; implementations report calls through
/// [`crate::context::with_current`].
pub trait MethodTranslator {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<()>;
}

/// Translator backed by bitcode generated ahead of time.
///
/// Expects `<source>/<stripped>/hf.outer.bc`, `hf.inner.bc` and an optional
/// `calls` file with one `direct|cold|speculated <signature>` per line.
#[derive(Clone)]
pub struct PrebuiltTranslator {
    source: PathBuf,
    catalog: Arc<MethodCatalog>,
}

impl PrebuiltTranslator {
    pub fn new(source: impl Into<PathBuf>, catalog: Arc<MethodCatalog>) -> Self {
        Self {
            source: source.into(),
            catalog,
        }
    }

    fn unit_source(&self, method: &MethodIdentity, unit: BitcodeUnit) -> PathBuf {
        self.source
            .join(strip_signature(method.signature()))
            .join(format!("hf.{}.bc", unit.suffix()))
    }

    fn copy_unit(from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(from, to)
            .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
        Ok(())
    }

    fn record_calls(&self, method: &MethodIdentity) -> Result<()> {
        let calls = self
            .source
            .join(strip_signature(method.signature()))
            .join("calls");
        let Some(lines) = read_lines_if_exists(&calls, LineFilter::SkipBlankAndComments)
            .with_context(|| format!("failed to read {}", calls.display()))?
        else {
            return Ok(());
        };

        for line in lines {
            let Some((kind, signature)) = line.split_once(' ') else {
                bail!("malformed call entry `{line}` in {}", calls.display());
            };
            let signature = signature.trim();
            match kind {
                "direct" => match self.catalog.resolve(signature) {
                    Some(callee) => {
                        context::with_current(|ctx| ctx.record_direct_call(callee));
                    }
                    None => {
                        context::with_current(|ctx| ctx.record_cold_callee(signature));
                    }
                },
                "cold" => {
                    context::with_current(|ctx| ctx.record_cold_callee(signature));
                }
                "speculated" => {
                    context::with_current(|ctx| ctx.record_histogram_addition(signature));
                }
                other => bail!("unknown call kind `{other}` in {}", calls.display()),
            }
        }
        Ok(())
    }
}

impl MethodTranslator for PrebuiltTranslator {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<()> {
        let outer = self.unit_source(request.method, BitcodeUnit::Outer);
        let inner = self.unit_source(request.method, BitcodeUnit::Inner);
        if !outer.is_file() || !inner.is_file() {
            bail!("no prebuilt bitcode for {}", request.method);
        }

        Self::copy_unit(&outer, &request.outer)?;
        Self::copy_unit(&inner, &request.inner)?;
        self.record_calls(request.method)
    }
}
