//! Core pipeline orchestration and domain logic for Corpscope.
//!
//! This crate ties collection, the four preparation stages and the two
//! validation stages into one run over a [`CompanyRecord`], then layers
//! optional LLM analysis, persistence and reporting on top
//! (see [`pipeline::process_company`]).
//!
//! [`CompanyRecord`]: corpscope_shared::CompanyRecord

pub mod analysis;
pub mod pipeline;
pub mod preparation;
pub mod report;
pub mod retry;
pub mod runner;
pub mod scoring;

#[cfg(test)]
mod testing;

pub use analysis::{Analyzer, GeminiClient, OpenAiClient, client_from_config};
pub use pipeline::{CompanyOutcome, ProgressReporter, SilentProgress, process_company};
pub use report::{RunReport, write_reports};
pub use retry::RetryPolicy;
pub use runner::{Collaborators, PipelineRun, PipelineRunner};
