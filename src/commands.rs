use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use regionc_config::PipelineConfig;
use regionc_driver::{BuildOutcome, CompilationOrchestrator, PrebuiltTranslator};
use regionc_histogram::{CallSite, HistogramFilter, InvokeHistogram, render_table};
use regionc_runtime::RuntimeLoader;
use regionc_toolchain::DuctRunner;
use tracing::info;

use crate::catalog::load_catalog;
use crate::{BuildArgs, HistogramArgs};

const EXIT_RECOMPILE: u8 = 2;

pub fn load_config(file: Option<&Path>, work_root: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut config = match file {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::from_env(),
    };
    if let Some(root) = work_root {
        config.work_root = root;
    }
    Ok(config)
}

pub fn build(mut config: PipelineConfig, args: &BuildArgs) -> Result<ExitCode> {
    config.profile.auto_grow |= args.auto_grow;
    let catalog = Arc::new(load_catalog(&args.catalog)?);
    info!(methods = catalog.len(), "loaded method catalog");

    let translator = PrebuiltTranslator::new(&args.bitcode, Arc::clone(&catalog));
    let orchestrator =
        CompilationOrchestrator::new(config, catalog, translator, Arc::new(DuctRunner::new()))
            .with_extra_opt_flags(args.opt_flags.clone());
    let outcome = orchestrator.run()?;

    if args.json {
        println!("{}", outcome.report().to_json()?);
    } else {
        print!("{}", outcome.report().render());
    }

    Ok(match &outcome {
        BuildOutcome::Completed {
            artifact: Some(artifact),
            ..
        } => {
            println!(
                "{} {} ({} methods)",
                "built".green().bold(),
                artifact.module_path.display(),
                artifact.linked_methods
            );
            ExitCode::SUCCESS
        }
        BuildOutcome::Completed { artifact: None, .. } => {
            eprintln!("{} entrypoint was not compiled", "failed:".red().bold());
            ExitCode::FAILURE
        }
        BuildOutcome::ToolchainFailed { failure, .. } => {
            eprintln!("{} {failure}", "failed:".red().bold());
            ExitCode::FAILURE
        }
        BuildOutcome::RecompilationRequired { .. } => {
            if let Some(banner) = outcome.recompilation_banner() {
                eprint!("{}", banner.yellow());
            }
            ExitCode::from(EXIT_RECOMPILE)
        }
    })
}

pub fn histogram(config: &PipelineConfig, args: &HistogramArgs) -> Result<ExitCode> {
    let filter = match (args.caller, args.pc) {
        (Some(caller_index), Some(pc)) => {
            HistogramFilter::for_site(args.location.clone(), CallSite { caller_index, pc })
        }
        _ => match &args.location {
            Some(location) => HistogramFilter::for_location(location.clone()),
            None => HistogramFilter::all(),
        },
    };

    let path = config.layout().histogram();
    let mut histogram = InvokeHistogram::load(&path, &filter, &config.histogram)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let records = if args.speculate {
        histogram.generate_speculation_map();
        histogram.speculations()
    } else {
        histogram.records()
    };
    print!("{}", render_table(records, &config.histogram.framework));
    if histogram.is_megamorphic() {
        println!("{}", "call site is megamorphic".yellow());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn inspect(config: &PipelineConfig) -> Result<ExitCode> {
    let loader = RuntimeLoader::install(config.layout());
    let loaded = loader.load_metadata()?;
    if !loader.is_enabled() {
        println!("{}", "native execution disabled: no region metadata".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    for entry in loader.metadata() {
        let status = if loader.has_native_code(entry.method_index) {
            "loaded".green()
        } else {
            "missing".red()
        };
        println!("{:>8}  {:<8} {}", entry.method_index, status, entry.stripped);
    }
    println!("{loaded} region(s) loaded");
    Ok(ExitCode::SUCCESS)
}
