use core::fmt::{self, Display, Formatter};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regionc_config::{BitcodeUnit, OptBaseline, ToolchainConfig, WorkspaceLayout};
use regionc_link::DependencyLinker;
use regionc_method::MethodIdentity;
use regionc_utils::Profiler;
use regionc_utils::fs::{SHARED_RO, relax_permissions, remove_if_exists};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::classify::OutputClass;
use crate::invocation::{ToolInvocation, ToolOutput, ToolStatus};
use crate::runner::ProcessRunner;

/// Stages of a region build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Cleanup,
    Link,
    DeadCodeElimination,
    Optimize,
    Compile,
    NativeLink,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Cleanup,
        Stage::Link,
        Stage::DeadCodeElimination,
        Stage::Optimize,
        Stage::Compile,
        Stage::NativeLink,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Cleanup => "cleanup",
            Stage::Link => "link",
            Stage::DeadCodeElimination => "dead-code-elimination",
            Stage::Optimize => "optimize",
            Stage::Compile => "compile",
            Stage::NativeLink => "native-link",
        }
    }

    /// File this stage produces for the given entrypoint signature.
    pub fn output(self, layout: &WorkspaceLayout, signature: &str) -> Option<PathBuf> {
        match self {
            Stage::Cleanup => None,
            Stage::Link => Some(layout.linked(signature)),
            Stage::DeadCodeElimination => Some(layout.dead_code_eliminated(signature)),
            Stage::Optimize => Some(layout.optimized(signature)),
            Stage::Compile => Some(layout.object(signature)),
            Stage::NativeLink => Some(layout.native_module(signature)),
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    NonZeroExit(i32),
    Signaled,
    TimedOut,
    /// Tool could not be started
    Spawn(String),
    /// Tool succeeded but its output file is missing
    MissingOutput(PathBuf),
    /// Dependency closure could not be read
    Dependencies(String),
    Io(String),
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NonZeroExit(code) => write!(f, "exited with status {code}"),
            FailureKind::Signaled => f.write_str("terminated by signal"),
            FailureKind::TimedOut => f.write_str("timed out"),
            FailureKind::Spawn(err) => write!(f, "could not be started: {err}"),
            FailureKind::MissingOutput(path) => write!(f, "did not produce {}", path.display()),
            FailureKind::Dependencies(err) => write!(f, "dependency error: {err}"),
            FailureKind::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

/// Why a region build stopped. No stage output from `stage` onwards is
/// left on disk.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{entrypoint}: {stage} {kind}")]
pub struct PipelineFailure {
    pub entrypoint: String,
    pub stage: Stage,
    pub kind: FailureKind,
    pub command: Option<String>,
    /// Captured tool output; empty when trimmed
    pub diagnostics: String,
    pub trimmed: bool,
    /// Warnings raised by stages that ran before the failure
    pub warnings: Vec<String>,
}

/// Bookkeeping for one executed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub command: String,
    pub duration: Duration,
    pub slow: bool,
    pub class: OutputClass,
}

/// A loadable native module for one hot region.
#[derive(Debug, Clone, Serialize)]
pub struct CompilationArtifact {
    pub entrypoint: MethodIdentity,
    pub module_path: PathBuf,
    pub unit: BitcodeUnit,
    pub baseline: OptBaseline,
    pub linked_methods: usize,
    pub stages: Vec<StageRecord>,
    pub warnings: Vec<String>,
}

struct BuildState<'a> {
    entrypoint: &'a MethodIdentity,
    timeout: Duration,
    stages: Vec<StageRecord>,
    warnings: Vec<String>,
    profiler: Profiler,
}

/// Link, dead-code elimination, optimize, compile and native link for one
/// region, each stage consuming the previous stage's output.
pub struct ToolchainPipeline {
    config: ToolchainConfig,
    linker: DependencyLinker,
    runner: Arc<dyn ProcessRunner>,
}

impl ToolchainPipeline {
    pub fn new(
        config: ToolchainConfig,
        layout: WorkspaceLayout,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config,
            linker: DependencyLinker::new(layout),
            runner,
        }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub fn linker(&self) -> &DependencyLinker {
        &self.linker
    }

    fn layout(&self) -> &WorkspaceLayout {
        self.linker.layout()
    }

    /// Builds the native module for `entrypoint`.
    ///
    /// `extra_opt_flags` are appended to the optimize stage after the
    /// configured ones.
    pub fn build(
        &self,
        entrypoint: &MethodIdentity,
        extra_opt_flags: &[String],
    ) -> Result<CompilationArtifact, PipelineFailure> {
        let signature = entrypoint.signature();
        let layout = self.layout();
        let mut state = BuildState {
            entrypoint,
            timeout: self.config.timeout(),
            stages: Vec::new(),
            warnings: Vec::new(),
            profiler: Profiler::new(),
        };

        info!(entrypoint = %entrypoint, baseline = %self.config.baseline, "building hot region");
        self.cleanup(signature);

        // link
        let link_inputs = self
            .linker
            .link_inputs(entrypoint)
            .map_err(|err| {
                let kind = FailureKind::Dependencies(err.to_string());
                self.fail(&state, Stage::Link, kind, None)
            })?;
        let linked = layout.linked(signature);
        let link = self
            .tool(&self.config.llvm_link, state.timeout)
            .args(link_inputs.inputs.iter().map(|path| path.as_os_str()))
            .arg("-o")
            .arg(&linked);
        let link_time = self.run_stage(&mut state, Stage::Link, link)?;

        state.timeout = self
            .config
            .timeout_for_region(link_inputs.linked_methods, link_time);
        if state.timeout > self.config.timeout() {
            info!(
                linked_methods = link_inputs.linked_methods,
                link_time = ?link_time,
                timeout = ?state.timeout,
                "large region, using long tool timeout"
            );
        }

        // dead-code elimination
        let mut current = linked;
        if self.config.dead_code_elimination {
            let dce = layout.dead_code_eliminated(signature);
            let invocation = self
                .tool(&self.config.opt, state.timeout)
                .arg("-passes=dce")
                .arg(&current)
                .arg("-o")
                .arg(&dce);
            self.run_stage(&mut state, Stage::DeadCodeElimination, invocation)?;
            current = dce;
        }

        // optimize
        let optimized = layout.optimized(signature);
        let invocation = self
            .tool(&self.config.opt, state.timeout)
            .arg(self.config.baseline.flag())
            .args(&self.config.extra_opt_flags)
            .args(extra_opt_flags)
            .arg(&current)
            .arg("-o")
            .arg(&optimized);
        self.run_stage(&mut state, Stage::Optimize, invocation)?;

        // compile
        let object = layout.object(signature);
        let invocation = self
            .tool(&self.config.llc, state.timeout)
            .args(self.config.target.compile_flags())
            .arg("-filetype=obj")
            .args(self.config.target.needs_pic().then_some("-relocation-model=pic"))
            .arg(self.config.baseline.flag())
            .args(&self.config.extra_llc_flags)
            .arg(&optimized)
            .arg("-o")
            .arg(&object);
        self.run_stage(&mut state, Stage::Compile, invocation)?;

        // native link
        let module = layout.native_module(signature);
        let invocation = self
            .tool(&self.config.clang, state.timeout)
            .arg("-shared")
            .arg(format!("--target={}", self.config.target))
            .arg("-Wl,-soname,hf.so")
            .args(&self.config.extra_link_flags)
            .arg("-o")
            .arg(&module)
            .arg(&object)
            .args(self.runtime_link_flags());
        self.run_stage(&mut state, Stage::NativeLink, invocation)?;

        if let Err(err) = remove_if_exists(&object) {
            warn!(path = %object.display(), error = %err, "could not remove object file");
        }

        debug!(entrypoint = %entrypoint, "stage timings\n{}", state.profiler.summary());
        info!(
            entrypoint = %entrypoint,
            module = %module.display(),
            linked_methods = link_inputs.linked_methods,
            total = ?state.profiler.total(),
            "hot region built"
        );

        Ok(CompilationArtifact {
            entrypoint: entrypoint.clone(),
            module_path: module,
            unit: BitcodeUnit::Outer,
            baseline: self.config.baseline,
            linked_methods: link_inputs.linked_methods,
            stages: state.stages,
            warnings: state.warnings,
        })
    }

    fn tool(&self, program: &str, timeout: Duration) -> ToolInvocation {
        let invocation = ToolInvocation::new(program, timeout, self.config.max_output_bytes);
        invocation.dir(self.layout().root())
    }

    fn runtime_link_flags(&self) -> Vec<OsString> {
        let mut flags = Vec::new();
        if let Some(dir) = &self.config.runtime_lib_dir {
            let mut flag = OsString::from("-L");
            flag.push(dir);
            flags.push(flag);
        }
        flags.push(OsString::from(format!("-l{}", self.config.runtime_lib)));
        flags
    }

    /// Removes every stage output left by an earlier attempt.
    fn cleanup(&self, signature: &str) {
        self.remove_outputs_from(Stage::Cleanup, signature);
    }

    fn remove_outputs_from(&self, first: Stage, signature: &str) {
        for stage in Stage::ALL.iter().filter(|stage| **stage >= first) {
            let Some(path) = stage.output(self.layout(), signature) else {
                continue;
            };
            match remove_if_exists(&path) {
                Ok(true) => debug!(path = %path.display(), "removed stage output"),
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not remove stage output");
                }
            }
        }
    }

    fn fail(
        &self,
        state: &BuildState<'_>,
        stage: Stage,
        kind: FailureKind,
        output: Option<(&ToolInvocation, &ToolOutput)>,
    ) -> PipelineFailure {
        self.remove_outputs_from(stage, state.entrypoint.signature());

        let (command, diagnostics, trimmed) = match output {
            Some((invocation, output)) => (
                Some(invocation.command_line()),
                output.output.clone(),
                output.trimmed,
            ),
            None => (None, String::new(), false),
        };
        error!(
            entrypoint = %state.entrypoint,
            stage = %stage,
            reason = %kind,
            command = command.as_deref().unwrap_or(""),
            "toolchain stage failed"
        );
        if !diagnostics.is_empty() {
            error!("{diagnostics}");
        }

        PipelineFailure {
            entrypoint: state.entrypoint.to_string(),
            stage,
            kind,
            command,
            diagnostics,
            trimmed,
            warnings: state.warnings.clone(),
        }
    }

    /// Runs one stage, returning its duration.
    fn run_stage(
        &self,
        state: &mut BuildState<'_>,
        stage: Stage,
        invocation: ToolInvocation,
    ) -> Result<Duration, PipelineFailure> {
        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(err) => {
                return Err(self.fail(state, stage, FailureKind::Spawn(err.to_string()), None));
            }
        };
        state.profiler.push_phase(stage.name(), output.duration);

        let class = OutputClass::of(&output.output);
        let slow = output.duration >= self.config.slow_call_threshold();
        state.stages.push(StageRecord {
            stage,
            command: invocation.command_line(),
            duration: output.duration,
            slow,
            class,
        });

        if slow {
            warn!(
                stage = %stage,
                duration = ?output.duration,
                command = %invocation,
                "slow tool invocation"
            );
            state.warnings.push(format!(
                "{stage} took {:.1}s: {invocation}",
                output.duration.as_secs_f64()
            ));
        }
        if output.trimmed {
            warn!(stage = %stage, limit = invocation.max_output_bytes, "tool output trimmed");
            state.warnings.push(format!(
                "{stage} output exceeded {} bytes and was trimmed",
                invocation.max_output_bytes
            ));
        }

        let kind = match output.status {
            ToolStatus::Exited(0) => None,
            ToolStatus::Exited(code) => Some(FailureKind::NonZeroExit(code)),
            ToolStatus::Signaled => Some(FailureKind::Signaled),
            ToolStatus::TimedOut => Some(FailureKind::TimedOut),
        };
        if let Some(kind) = kind {
            if class.has_error() {
                debug!(stage = %stage, ?class, "tool reported errors");
            }
            return Err(self.fail(state, stage, kind, Some((&invocation, &output))));
        }

        if self.config.verbose && !output.output.is_empty() {
            info!(stage = %stage, "{}", output.output);
        }
        if class.warning || class.has_error() {
            debug!(stage = %stage, "{}", output.output);
            state
                .warnings
                .push(format!("{stage} reported diagnostics: {}", first_line(&output.output)));
        }

        if let Some(path) = invocation.output_path() {
            if !path.is_file() {
                let kind = FailureKind::MissingOutput(path.to_path_buf());
                return Err(self.fail(state, stage, kind, Some((&invocation, &output))));
            }
            if let Err(err) = relax_permissions(path, SHARED_RO) {
                return Err(self.fail(state, stage, FailureKind::Io(err.to_string()), None));
            }
        }

        Ok(output.duration)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|line| !line.trim().is_empty()).unwrap_or("")
}
