//! Drives the external LLVM toolchain that turns a region's bitcode into a
//! loadable native module.

pub mod classify;
pub mod invocation;
pub mod pipeline;
pub mod runner;

pub use crate::classify::OutputClass;
pub use crate::invocation::{ToolInvocation, ToolOutput, ToolStatus};
pub use crate::pipeline::{
    CompilationArtifact, FailureKind, PipelineFailure, Stage, StageRecord, ToolchainPipeline,
};
pub use crate::runner::{DuctRunner, ProcessRunner};
