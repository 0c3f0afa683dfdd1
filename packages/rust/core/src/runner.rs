//! Pipeline runner: sequences stages over one [`CompanyRecord`].
//!
//! Stages run strictly one after another. A fatal [`StageError`] stops the
//! run with the partial record preserved; recoverable errors are collected
//! and the run continues.

use std::sync::Arc;

use corpscope_shared::{
    AssetProbe, CompanyRecord, DomainResolver, FetchError, PipelineConfig, RunSummary,
    SourceFetcher, Stage, StageCause, StageError, ValidationResult,
};
use tracing::{error, info, instrument};

use crate::pipeline::{ProgressReporter, SilentProgress};
use crate::preparation;
use crate::retry::RetryPolicy;
use crate::scoring;

/// Handles to the external systems a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub resolver: Arc<dyn DomainResolver>,
    pub probe: Arc<dyn AssetProbe>,
}

/// State of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub record: CompanyRecord,
    /// Every error raised, recoverable ones first-come; a fatal error is last.
    pub errors: Vec<StageError>,
    /// One result per validation stage that ran.
    pub results: Vec<ValidationResult>,
    /// Stage currently executing, or the one that aborted the run.
    pub active_stage: Option<Stage>,
    pub completed: Vec<Stage>,
    pub aborted: bool,
}

impl PipelineRun {
    fn start(record: CompanyRecord) -> Self {
        Self {
            record,
            errors: Vec::new(),
            results: Vec::new(),
            active_stage: None,
            completed: Vec::new(),
            aborted: false,
        }
    }

    pub fn overall_score(&self) -> f64 {
        scoring::overall_score(&self.results)
    }

    /// An aborted run never passes, whatever it scored before stopping.
    pub fn passed(&self) -> bool {
        !self.aborted && scoring::overall_passed(self.overall_score())
    }

    pub fn fatal_error(&self) -> Option<&StageError> {
        if self.aborted {
            self.errors.last()
        } else {
            None
        }
    }

    /// Scores and errors, without the optional analysis.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            overall_score: self.overall_score(),
            passed: self.passed(),
            aborted: self.aborted,
            errors: self.errors.clone(),
            analysis: None,
            analysis_error: None,
        }
    }

    pub fn into_parts(self) -> (CompanyRecord, Vec<StageError>) {
        (self.record, self.errors)
    }
}

/// Executes stages with the configuration it was built with.
pub struct PipelineRunner {
    config: PipelineConfig,
    collaborators: Collaborators,
    retry: RetryPolicy,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let retry = RetryPolicy::from(&config);
        Self {
            config,
            collaborators,
            retry,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `stages` in order over `record`.
    pub async fn run(&self, record: CompanyRecord, stages: &[Stage]) -> PipelineRun {
        self.run_with_progress(record, stages, &SilentProgress).await
    }

    #[instrument(skip_all, fields(company = %record.identity().legal_name, stages = stages.len()))]
    pub async fn run_with_progress(
        &self,
        record: CompanyRecord,
        stages: &[Stage],
        progress: &dyn ProgressReporter,
    ) -> PipelineRun {
        let mut run = PipelineRun::start(record);

        for &stage in stages {
            run.active_stage = Some(stage);
            progress.stage(stage);

            match self
                .execute(stage, &mut run.record, &mut run.results, progress)
                .await
            {
                Ok(errors) => {
                    run.errors.extend(errors);
                    run.completed.push(stage);
                }
                Err(fatal) => {
                    error!(%stage, error = %fatal, "stage failed, aborting run");
                    run.errors.push(fatal);
                    run.aborted = true;
                    return run;
                }
            }
        }

        run.active_stage = None;
        info!(
            score = run.overall_score(),
            passed = run.passed(),
            errors = run.errors.len(),
            "pipeline run complete"
        );
        run
    }

    /// Dispatch one stage. `Err` is fatal; `Ok` carries recoverable errors.
    async fn execute(
        &self,
        stage: Stage,
        record: &mut CompanyRecord,
        results: &mut Vec<ValidationResult>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<StageError>, StageError> {
        match stage {
            Stage::Collection => {
                self.collect(record).await?;
                Ok(Vec::new())
            }
            Stage::DataEntry => {
                let mut seeds = self.config.seed_terms.clone();
                seeds.extend(record.seed_terms.iter().cloned());
                preparation::data_entry(record, &seeds)?;
                Ok(Vec::new())
            }
            Stage::DomainAssociation => Ok(preparation::associate_domains(
                record,
                self.collaborators.resolver.as_ref(),
                &self.config.tlds,
                &self.retry,
            )
            .await),
            Stage::AssetVerification => Ok(preparation::verify_assets(
                record,
                Arc::clone(&self.collaborators.probe),
                self.config.concurrency,
                self.config.check_timeout,
                &self.retry,
                progress,
            )
            .await),
            Stage::Enumeration => {
                preparation::enumerate_names(record);
                Ok(Vec::new())
            }
            Stage::SourceValidation => {
                results.push(scoring::score_source(record));
                Ok(Vec::new())
            }
            Stage::HierarchyValidation => {
                results.push(scoring::score_hierarchy(record));
                Ok(Vec::new())
            }
        }
    }

    /// Fetch the source document. Only transient failures are retried.
    async fn collect(&self, record: &mut CompanyRecord) -> Result<(), StageError> {
        let name = record.identity().legal_name.trim().to_string();
        if name.is_empty() {
            return Err(StageError::new(
                Stage::Collection,
                StageCause::MissingIdentity,
            ));
        }

        let fetcher = self.collaborators.fetcher.as_ref();
        let query = name.as_str();
        let document = self
            .retry
            .run("fetch source", move || fetcher.fetch(query), |e: &FetchError| {
                e.is_transient()
            })
            .await
            .map_err(|e| StageError::new(Stage::Collection, StageCause::Fetch(e)))?;

        info!(title = %document.title, url = %document.source_url, "source collected");
        record.source = Some(document);
        Ok(())
    }
}
