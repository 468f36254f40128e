use std::collections::BTreeSet;
use std::sync::Arc;

use regionc_config::{BitcodeUnit, PipelineConfig, WorkspaceLayout};
use regionc_histogram::{HistogramFilter, InvokeHistogram};
use regionc_link::DependencySet;
use regionc_method::{MetadataEntry, MethodCatalog, MethodIdentity, strip_signature};
use regionc_profile::{DebugProfile, ExclusionPolicy, ProfileStore, classify_cold_methods};
use regionc_toolchain::{CompilationArtifact, PipelineFailure, ProcessRunner, ToolchainPipeline};
use regionc_utils::Stopwatch;
use regionc_utils::fs::{SHARED_RW, remove_if_exists, write_atomic};
use tracing::{error, info, warn};

use crate::context::{self, CompilationContext};
use crate::error::DriverError;
use crate::report::{CompilationReport, Severity, render_banner};
use crate::session::BuildSession;
use crate::translator::{MethodTranslator, TranslationRequest};

/// How a run ended.
#[derive(Debug)]
pub enum BuildOutcome {
    /// Every stage ran; `artifact` is `None` when the entrypoint itself
    /// could not be translated
    Completed {
        artifact: Option<CompilationArtifact>,
        report: CompilationReport,
    },
    ToolchainFailed {
        failure: PipelineFailure,
        report: CompilationReport,
    },
    /// The profile was changed; the caller should start a fresh run
    RecompilationRequired {
        reasons: Vec<String>,
        report: CompilationReport,
    },
}

impl BuildOutcome {
    pub fn report(&self) -> &CompilationReport {
        match self {
            BuildOutcome::Completed { report, .. }
            | BuildOutcome::ToolchainFailed { report, .. }
            | BuildOutcome::RecompilationRequired { report, .. } => report,
        }
    }

    /// Centered banner listing why another run is needed.
    pub fn recompilation_banner(&self) -> Option<String> {
        match self {
            BuildOutcome::RecompilationRequired { reasons, .. } => {
                let mut lines = vec!["Recompilation required".to_string()];
                lines.extend(reasons.iter().cloned());
                Some(render_banner(&lines))
            }
            _ => None,
        }
    }
}

/// Translates every profile method, links the region of the profile's
/// entrypoint and records what happened.
pub struct CompilationOrchestrator<T> {
    config: PipelineConfig,
    layout: WorkspaceLayout,
    catalog: Arc<MethodCatalog>,
    translator: T,
    pipeline: ToolchainPipeline,
    extra_opt_flags: Vec<String>,
}

impl<T: MethodTranslator> CompilationOrchestrator<T> {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<MethodCatalog>,
        translator: T,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let layout = config.layout();
        let pipeline = ToolchainPipeline::new(config.toolchain.clone(), layout.clone(), runner);
        Self {
            config,
            layout,
            catalog,
            translator,
            pipeline,
            extra_opt_flags: Vec::new(),
        }
    }

    pub fn with_extra_opt_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_opt_flags = flags;
        self
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn run(&self) -> Result<BuildOutcome, DriverError> {
        let mut session = BuildSession::new();
        let run_clock = Stopwatch::start_new();

        let mut profile =
            ProfileStore::load(&self.layout.profile(), self.config.profile.max_hot_methods)?;
        let debug_profile = DebugProfile::load(&self.layout.debug_profile())?;
        let mut policy =
            ExclusionPolicy::load(&self.layout.blocklist(), &self.layout.failed_list())?;
        let histogram = InvokeHistogram::load(
            &self.layout.histogram(),
            &HistogramFilter::all(),
            &self.config.histogram,
        )?;
        session.histogram_dropped = histogram.cross_boundary_dropped();

        let mut translated = Vec::new();
        let mut cold_callees = BTreeSet::new();
        let translate_clock = Stopwatch::start_new();
        for signature in profile.methods() {
            if debug_profile.is_in_debug_profile(signature) {
                session.debug_methods.insert(signature.clone());
            }
            let Some(method) = self.catalog.resolve(signature) else {
                warn!(method = %signature, "profile method not found");
                session.not_found.insert(signature.clone());
                continue;
            };
            if policy.is_excluded(signature) {
                info!(method = %signature, "skipping excluded method");
                session.skipped.insert(signature.clone());
                continue;
            }

            let call_sites = histogram.call_sites(method.id.index);
            let debug = debug_profile.is_in_debug_profile(signature);
            match self.translate(&method, debug, &call_sites) {
                Ok(parts) => {
                    translated.push(parts.dependencies);
                    cold_callees.extend(parts.cold_callees);
                    session.histogram_additions.extend(parts.histogram_additions);
                    session.warnings.extend(
                        parts
                            .warnings
                            .into_iter()
                            .map(|w| format!("{method}: {w}")),
                    );
                    session.compiled.insert(method);
                }
                Err(err) => {
                    error!(method = %signature, error = %format!("{err:#}"), "translation failed");
                    session.cant_compile.insert(signature.clone());
                    policy.record_failure(signature);
                    discard_partial(&self.layout, &method);
                    // stale sidecar from an earlier run must not pull this method in
                    self.pipeline
                        .linker()
                        .store_dependencies(&DependencySet::new(method))?;
                }
            }
        }
        session
            .profiler
            .push_phase("translate", translate_clock.elapsed());

        self.store_dependencies(&session, translated, &mut cold_callees)?;

        let entrypoint = self.catalog.resolve(profile.entrypoint());
        let build = match entrypoint.filter(|m| session.compiled.contains(m)) {
            Some(entrypoint) => {
                let clock = Stopwatch::start_new();
                let result = self.pipeline.build(&entrypoint, &self.extra_opt_flags);
                session.profiler.push_phase("toolchain", clock.elapsed());
                Some(result)
            }
            None => {
                error!(
                    entrypoint = profile.entrypoint(),
                    "entrypoint was not compiled, nothing to link"
                );
                None
            }
        };

        self.write_metadata(build.as_ref().and_then(|r| r.as_ref().ok()))?;
        policy.persist_failures()?;

        let cold: Vec<String> = cold_callees
            .into_iter()
            .chain(session.cant_compile.iter().cloned())
            .filter(|m| !session.is_compiled(m))
            .collect();
        session.classification = classify_cold_methods(
            cold.iter().map(String::as_str),
            &profile,
            &policy,
            &session.histogram_additions,
        );
        session.cold = cold.into_iter().collect();

        if self.config.profile.auto_grow {
            let additions = session.classification.needs_manual_addition.clone();
            if profile.append(&additions)? {
                session.request_recompilation(format!(
                    "Appended {} methods to the profile.",
                    additions.len()
                ));
            }
        }
        session.profiler.push_phase("run", run_clock.elapsed());

        let report = self.build_report(profile.entrypoint(), &session, build.as_ref());
        report.write_to(&self.layout.report())?;
        info!("\n{}", report.render());

        if session.requires_recompilation() {
            return Ok(BuildOutcome::RecompilationRequired {
                reasons: session.recompile_reasons,
                report,
            });
        }
        Ok(match build {
            Some(Err(failure)) => BuildOutcome::ToolchainFailed { failure, report },
            Some(Ok(artifact)) => BuildOutcome::Completed {
                artifact: Some(artifact),
                report,
            },
            None => BuildOutcome::Completed {
                artifact: None,
                report,
            },
        })
    }

    fn translate(
        &self,
        method: &MethodIdentity,
        debug: bool,
        call_sites: &[InvokeHistogram],
    ) -> anyhow::Result<context::ContextParts> {
        let request = TranslationRequest {
            method,
            outer: self.layout.bitcode(method.signature(), BitcodeUnit::Outer),
            inner: self.layout.bitcode(method.signature(), BitcodeUnit::Inner),
            debug,
            call_sites,
        };
        let mut context = CompilationContext::new(method.clone(), debug);
        let megamorphic = call_sites
            .iter()
            .filter(|site| site.has_speculation() && site.is_megamorphic());
        for site in megamorphic {
            if let Some(at) = site.site() {
                context.warn(format!(
                    "megamorphic call site at pc {} ({} candidates)",
                    at.pc,
                    site.speculations().len()
                ));
            }
        }
        let (result, context) = context::scoped(context, || self.translator.translate(&request));
        result?;
        Ok(context.into_parts())
    }

    /// Writes each compiled method's sidecar, keeping only callees that
    /// were compiled this run; the rest become cold.
    fn store_dependencies(
        &self,
        session: &BuildSession,
        translated: Vec<DependencySet>,
        cold: &mut BTreeSet<String>,
    ) -> Result<(), DriverError> {
        let linker = self.pipeline.linker();
        for dependencies in translated {
            let mut kept = DependencySet::new(dependencies.owner().clone());
            for callee in dependencies.callees() {
                if session.compiled.contains(callee) {
                    kept.add(callee.clone());
                } else {
                    cold.insert(callee.signature().to_owned());
                }
            }
            linker.store_dependencies(&kept)?;
        }
        Ok(())
    }

    /// Metadata lists the regions the runtime can load; with nothing built
    /// the file is removed so the runtime turns the feature off.
    fn write_metadata(&self, artifact: Option<&CompilationArtifact>) -> Result<(), DriverError> {
        let path = self.layout.metadata();
        let Some(artifact) = artifact else {
            remove_if_exists(&path).map_err(DriverError::io(&path))?;
            return Ok(());
        };

        let entry = MetadataEntry::new(
            strip_signature(artifact.entrypoint.signature()),
            artifact.entrypoint.id.index,
        );
        write_atomic(&path, format!("{entry}\n").as_bytes(), SHARED_RW)
            .map_err(DriverError::io(&path))?;
        info!(path = %path.display(), %entry, "wrote region metadata");
        Ok(())
    }

    fn build_report(
        &self,
        entrypoint: &str,
        session: &BuildSession,
        build: Option<&Result<CompilationArtifact, PipelineFailure>>,
    ) -> CompilationReport {
        let mut report = CompilationReport::new(entrypoint);
        let classification = &session.classification;

        report.push(Severity::Info, "compiled", session.compiled_signatures());
        if let Some(Ok(artifact)) = build {
            report.push(
                Severity::Info,
                "native module",
                [
                    artifact.module_path.display().to_string(),
                    format!("linked methods: {}", artifact.linked_methods),
                    format!("baseline: {}", artifact.baseline),
                ],
            );
        }
        report.push(
            Severity::Info,
            "skipped by exclusion policy",
            session.skipped.iter().cloned(),
        );
        report.push(
            Severity::Info,
            "cold constructors",
            classification.constructors.iter().cloned(),
        );
        report.push(
            Severity::Info,
            "cold, blocklisted or failed before",
            classification.blocklisted_or_failed.iter().cloned(),
        );
        let mut additions: Vec<&String> = session.histogram_additions.iter().collect();
        additions.sort();
        report.push(
            Severity::Info,
            "histogram additions",
            additions.into_iter().cloned(),
        );
        report.push(
            Severity::Info,
            "timings",
            session
                .profiler
                .phases()
                .iter()
                .map(|p| format!("{}: {:.3?}", p.name, p.duration)),
        );

        report.push(
            Severity::Warning,
            "already in profile but failed",
            classification.already_in_profile_but_failed.iter().cloned(),
        );
        report.push(
            Severity::Warning,
            "needs manual addition to profile",
            classification.needs_manual_addition.iter().cloned(),
        );
        report.push(
            Severity::Warning,
            "debug profile",
            session.debug_methods.iter().cloned(),
        );
        report.push(Severity::Warning, "translation", session.warnings.iter().cloned());
        if session.histogram_dropped > 0 {
            report.push(
                Severity::Warning,
                "invoke histogram",
                [format!(
                    "{} framework-to-app records ignored",
                    session.histogram_dropped
                )],
            );
        }
        match build {
            Some(Ok(artifact)) => {
                report.push(Severity::Warning, "toolchain", artifact.warnings.iter().cloned());
            }
            Some(Err(failure)) => {
                report.push(Severity::Warning, "toolchain", failure.warnings.iter().cloned());
            }
            None => {}
        }
        report.push(
            Severity::Warning,
            "recompilation required",
            session.recompile_reasons.iter().cloned(),
        );

        report.push(
            Severity::Error,
            "cannot compile",
            session.cant_compile.iter().cloned(),
        );
        report.push(Severity::Error, "not found", session.not_found.iter().cloned());
        match build {
            Some(Err(failure)) => {
                let mut items = vec![failure.to_string()];
                items.extend(failure.command.iter().cloned());
                if failure.trimmed {
                    items.push("tool output trimmed".to_string());
                }
                items.extend(failure.diagnostics.lines().map(str::to_owned));
                report.push(Severity::Error, "toolchain failure", items);
            }
            None => report.push(
                Severity::Error,
                "entrypoint not compiled",
                [entrypoint.to_owned()],
            ),
            Some(Ok(_)) => {}
        }
        report
    }
}

/// Removes the bitcode a failed translation may have left half-written.
fn discard_partial(layout: &WorkspaceLayout, method: &MethodIdentity) {
    for unit in [BitcodeUnit::Outer, BitcodeUnit::Inner] {
        let path = layout.bitcode(method.signature(), unit);
        if let Err(err) = remove_if_exists(&path) {
            warn!(path = %path.display(), error = %err, "could not remove partial bitcode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::with_current;
    use parking_lot::Mutex;
    use regionc_method::MethodId;
    use regionc_profile::ProfileError;
    use regionc_toolchain::{Stage, ToolInvocation, ToolOutput, ToolStatus};
    use std::fs;
    use std::io;
    use std::time::Duration;
    use tempfile::TempDir;

    const ENTRY: &str = "void a.B.run()";
    const HELPER: &str = "int a.B.helper(int)";
    const BROKEN: &str = "void a.B.broken()";
    const BLOCKED: &str = "void a.B.blocked()";
    const COLD: &str = "void a.C.cold()";

    #[derive(Default)]
    struct FakeRunner {
        programs: Mutex<Vec<String>>,
        fail_program: Option<&'static str>,
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
            self.programs.lock().push(invocation.program.clone());
            let status = if self.fail_program == Some(invocation.program.as_str()) {
                ToolStatus::Exited(1)
            } else {
                if let Some(path) = invocation.output_path() {
                    fs::write(path, b"out")?;
                }
                ToolStatus::Exited(0)
            };
            Ok(ToolOutput {
                status,
                output: String::new(),
                trimmed: false,
                duration: Duration::from_millis(1),
            })
        }
    }

    /// Writes dummy bitcode and reports a fixed call graph.
    struct ScriptedTranslator {
        catalog: Arc<MethodCatalog>,
    }

    impl MethodTranslator for ScriptedTranslator {
        fn translate(&self, request: &TranslationRequest<'_>) -> anyhow::Result<()> {
            let signature = request.method.signature();
            if signature == BROKEN {
                anyhow::bail!("unsupported instruction");
            }
            fs::create_dir_all(request.outer.parent().unwrap())?;
            fs::write(&request.outer, b"outer")?;
            fs::write(&request.inner, b"inner")?;

            if signature == ENTRY {
                let helper = self.catalog.resolve(HELPER).unwrap();
                let broken = self.catalog.resolve(BROKEN).unwrap();
                with_current(|ctx| {
                    ctx.record_direct_call(helper);
                    ctx.record_direct_call(broken);
                    ctx.record_cold_callee(COLD);
                    ctx.record_cold_callee("void a.C.<init>()");
                    ctx.record_histogram_addition("void a.C.speculated()");
                    ctx.record_cold_callee("void a.C.speculated()");
                });
            }
            Ok(())
        }
    }

    fn catalog() -> Arc<MethodCatalog> {
        let catalog = Arc::new(MethodCatalog::new());
        catalog.register_many([
            (MethodId::new(0, 10), ENTRY),
            (MethodId::new(0, 11), HELPER),
            (MethodId::new(0, 12), BROKEN),
            (MethodId::new(0, 13), BLOCKED),
        ]);
        catalog
    }

    fn workspace(profile: &str) -> (TempDir, PipelineConfig) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("profile"), profile).unwrap();
        fs::write(dir.path().join("methods.blocklist"), format!("{BLOCKED}\n")).unwrap();
        fs::write(dir.path().join("profile.dbg_methods"), "a.B.help*\n").unwrap();
        let config = PipelineConfig::default().with_work_root(dir.path());
        (dir, config)
    }

    fn orchestrator(
        config: PipelineConfig,
        runner: Arc<FakeRunner>,
    ) -> CompilationOrchestrator<ScriptedTranslator> {
        let catalog = catalog();
        let translator = ScriptedTranslator {
            catalog: Arc::clone(&catalog),
        };
        CompilationOrchestrator::new(config, catalog, translator, runner)
    }

    fn full_profile() -> String {
        format!("{ENTRY}\n{HELPER}\n{BROKEN}\n{BLOCKED}\nvoid a.B.unknown()\n")
    }

    fn section<'a>(report: &'a CompilationReport, title: &str) -> Option<&'a [String]> {
        report
            .sections
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.items.as_slice())
    }

    #[test]
    fn test_full_run_builds_region() {
        let (dir, config) = workspace(&full_profile());
        let runner = Arc::new(FakeRunner::default());
        let orchestrator = orchestrator(config, Arc::clone(&runner));
        let layout = orchestrator.layout().clone();

        let outcome = orchestrator.run().unwrap();
        let BuildOutcome::Completed {
            artifact: Some(artifact),
            report,
        } = outcome
        else {
            panic!("expected a native module");
        };

        assert_eq!(artifact.linked_methods, 2);
        assert!(artifact.module_path.is_file());

        // broken callee is not linked, it becomes cold instead
        let deps = fs::read_to_string(layout.dependencies(ENTRY)).unwrap();
        assert_eq!(deps.lines().collect::<Vec<_>>(), [format!("0:11:{HELPER}")]);

        let metadata = fs::read_to_string(layout.metadata()).unwrap();
        assert_eq!(metadata, "void#a.B.run@@ 10\n");

        let failed = fs::read_to_string(layout.failed_list()).unwrap();
        assert_eq!(failed, format!("{BROKEN}\n"));

        assert_eq!(section(&report, "not found").unwrap(), ["void a.B.unknown()"]);
        assert_eq!(section(&report, "cannot compile").unwrap(), [BROKEN]);
        assert_eq!(section(&report, "skipped by exclusion policy").unwrap(), [BLOCKED]);
        assert_eq!(section(&report, "already in profile but failed").unwrap(), [BROKEN]);
        assert_eq!(section(&report, "cold constructors").unwrap(), ["void a.C.<init>()"]);
        assert_eq!(section(&report, "needs manual addition to profile").unwrap(), [COLD]);
        assert_eq!(section(&report, "debug profile").unwrap(), [HELPER]);
        assert!(section(&report, "translation").is_none());
        assert!(section(&report, "invoke histogram").is_none());

        let rendered = fs::read_to_string(dir.path().join("compilation.report")).unwrap();
        assert!(rendered.contains("[ERROR] not found (1)"));
        assert!(rendered.find("[INFO]").unwrap() < rendered.find("[WARNING]").unwrap());
        assert!(rendered.find("[WARNING]").unwrap() < rendered.find("[ERROR]").unwrap());
    }

    #[test]
    fn test_invoke_histogram_feeds_translation() {
        let (dir, config) = workspace(&full_profile());
        let app = "/data/app/base.apk";
        let mut lines: Vec<String> = (0..12)
            .map(|callee| format!("10,{app},{app},{app},4,7,{callee},2,1"))
            .collect();
        lines.push(format!("10,{app},{app},{app},9,7,50,2,8"));
        lines.push(format!("11,{app},{app},{app},4,7,60,2,8"));
        lines.push(format!("10,/system/framework/x.jar,{app},{app},6,7,70,2,3"));
        fs::write(dir.path().join("invoke.hist"), lines.join("\n") + "\n").unwrap();

        let outcome = orchestrator(config, Arc::new(FakeRunner::default()))
            .run()
            .unwrap();
        let report = outcome.report();

        assert_eq!(
            section(report, "translation").unwrap(),
            [format!("{ENTRY}: megamorphic call site at pc 4 (12 candidates)")]
        );
        assert_eq!(
            section(report, "invoke histogram").unwrap(),
            ["1 framework-to-app records ignored"]
        );
    }

    #[test]
    fn test_corrupt_invoke_histogram_is_fatal() {
        let (dir, config) = workspace(&full_profile());
        fs::write(dir.path().join("invoke.hist"), "10,a,b\n").unwrap();

        let err = orchestrator(config, Arc::new(FakeRunner::default()))
            .run()
            .unwrap_err();
        assert!(matches!(err, DriverError::Histogram(_)));
    }

    #[test]
    fn test_failed_method_is_skipped_next_run() {
        let (_dir, config) = workspace(&full_profile());
        let runner = Arc::new(FakeRunner::default());
        orchestrator(config.clone(), Arc::clone(&runner)).run().unwrap();

        let outcome = orchestrator(config, runner).run().unwrap();
        let report = outcome.report();
        assert!(section(report, "cannot compile").is_none());
        assert_eq!(
            section(report, "skipped by exclusion policy").unwrap(),
            [BLOCKED, BROKEN]
        );
    }

    #[test]
    fn test_auto_grow_requests_recompilation() {
        let (dir, mut config) = workspace(&full_profile());
        config.profile.auto_grow = true;
        let outcome = orchestrator(config, Arc::new(FakeRunner::default()))
            .run()
            .unwrap();

        let banner = outcome.recompilation_banner().unwrap();
        assert!(banner.contains("Recompilation required"));
        let BuildOutcome::RecompilationRequired { reasons, .. } = outcome else {
            panic!("expected recompilation");
        };
        assert_eq!(reasons, ["Appended 1 methods to the profile."]);

        let profile = fs::read_to_string(dir.path().join("profile")).unwrap();
        assert!(profile.lines().any(|l| l == COLD));
        assert!(!profile.contains("speculated"));
    }

    #[test]
    fn test_toolchain_failure_disables_metadata() {
        let (_dir, config) = workspace(&full_profile());
        let layout = config.layout();
        fs::write(layout.metadata(), "stale 1\n").unwrap();

        let runner = Arc::new(FakeRunner {
            fail_program: Some("llc"),
            ..FakeRunner::default()
        });
        let outcome = orchestrator(config, runner).run().unwrap();

        let BuildOutcome::ToolchainFailed { failure, report } = outcome else {
            panic!("expected toolchain failure");
        };
        assert_eq!(failure.stage, Stage::Compile);
        assert!(section(&report, "toolchain failure").is_some());
        assert!(!layout.metadata().exists());
        assert!(!layout.native_module(ENTRY).exists());
    }

    #[test]
    fn test_missing_profile_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default().with_work_root(dir.path());
        let err = orchestrator(config, Arc::new(FakeRunner::default()))
            .run()
            .unwrap_err();
        assert!(matches!(err, DriverError::Profile(ProfileError::Missing { .. })));
    }

    #[test]
    fn test_uncompiled_entrypoint_builds_nothing() {
        let (_dir, config) = workspace(&format!("{BROKEN}\n{HELPER}\n"));
        let runner = Arc::new(FakeRunner::default());
        let outcome = orchestrator(config, Arc::clone(&runner)).run().unwrap();

        assert!(matches!(outcome, BuildOutcome::Completed { artifact: None, .. }));
        assert!(runner.programs.lock().is_empty());
        assert!(section(outcome.report(), "entrypoint not compiled").is_some());
    }
}
