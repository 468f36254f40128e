//! Runs one compilation of a hot region end to end and reports on it.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod translator;

pub use crate::context::CompilationContext;
pub use crate::error::DriverError;
pub use crate::orchestrator::{BuildOutcome, CompilationOrchestrator};
pub use crate::report::{CompilationReport, ReportSection, Severity, render_banner};
pub use crate::session::BuildSession;
pub use crate::translator::{MethodTranslator, PrebuiltTranslator, TranslationRequest};
