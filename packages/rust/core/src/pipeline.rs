//! End-to-end company pipeline: run all stages → analyze → store → report.

use std::time::{Duration, Instant};

use corpscope_shared::{CompanyIdentity, CompanyRecord, RunId, RunStore, Stage, StoreError};
use tracing::{error, info, instrument, warn};

use crate::analysis::Analyzer;
use crate::report::RunReport;
use crate::runner::PipelineRunner;

/// Result of processing one company.
#[derive(Debug)]
pub struct CompanyOutcome {
    pub report: RunReport,
    /// Set when the run was persisted.
    pub run_id: Option<RunId>,
    /// Set when persisting failed; the report's scores still stand.
    pub store_error: Option<String>,
    pub elapsed: Duration,
}

impl CompanyOutcome {
    /// Whether a fatal stage error stopped the run.
    pub fn aborted(&self) -> bool {
        self.report.aborted
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a phase outside the stage sequence.
    fn phase(&self, name: &str);
    /// Called before each pipeline stage runs.
    fn stage(&self, stage: Stage);
    /// Called as each asset check completes, in insertion order.
    fn asset_checked(&self, domain: &str, active: bool, current: usize, total: usize);
    /// Called when the company is finished.
    fn done(&self, outcome: &CompanyOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn stage(&self, _stage: Stage) {}
    fn asset_checked(&self, _domain: &str, _active: bool, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &CompanyOutcome) {}
}

/// Process one company through every stage.
///
/// 1. Collection, preparation and validation via the runner
/// 2. Optional analysis (skipped for aborted runs, never fatal)
/// 3. Persistence, retried; a failure is reported but keeps the scores
#[instrument(skip_all, fields(company = %identity.legal_name))]
pub async fn process_company(
    runner: &PipelineRunner,
    identity: CompanyIdentity,
    store: &dyn RunStore,
    analyzer: Option<&Analyzer>,
    progress: &dyn ProgressReporter,
) -> CompanyOutcome {
    let start = Instant::now();
    info!("starting company pipeline");

    let run = runner
        .run_with_progress(CompanyRecord::new(identity), &Stage::ALL, progress)
        .await;
    let mut summary = run.summary();

    if let (Some(analyzer), false) = (analyzer, run.aborted) {
        progress.phase("Analyzing");
        let record_summary = run.record.summarize(summary.overall_score, summary.passed);
        match analyzer.analyze(&record_summary).await {
            Ok(analysis) => summary.analysis = Some(analysis),
            Err(e) => {
                warn!(error = %e, "analysis failed, continuing without it");
                summary.analysis_error = Some(e.to_string());
            }
        }
    }

    progress.phase("Saving run");
    let (record, results, summary_ref) = (&run.record, run.results.as_slice(), &summary);
    let saved = runner
        .retry()
        .run(
            "save run",
            move || store.save(record, results, summary_ref),
            StoreError::is_transient,
        )
        .await;

    let (run_id, store_error) = match saved {
        Ok(id) => (Some(id), None),
        Err(e) => {
            error!(error = %e, "failed to persist run");
            (None, Some(e.to_string()))
        }
    };

    let outcome = CompanyOutcome {
        report: RunReport::new(&run.record, &run.results, &summary, run_id.clone()),
        run_id,
        store_error,
        elapsed: start.elapsed(),
    };
    progress.done(&outcome);

    info!(
        score = outcome.report.overall_score,
        passed = outcome.report.passed,
        aborted = outcome.aborted(),
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "company pipeline complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use crate::retry::RetryPolicy;
    use crate::runner::Collaborators;
    use crate::testing::{
        FakeAnalysis, FakeFetcher, FakeProbe, FakeResolver, MemoryStore, source_document,
    };
    use corpscope_shared::{FetchError, PipelineConfig};

    fn runner(fetcher: FakeFetcher) -> PipelineRunner {
        PipelineRunner::new(
            PipelineConfig {
                tlds: vec!["com".into()],
                retry_delay: Duration::ZERO,
                ..PipelineConfig::default()
            },
            Collaborators {
                fetcher: Arc::new(fetcher),
                resolver: Arc::new(
                    FakeResolver::new()
                        .with("alphabet.com", Some("AS15169"))
                        .with("google.com", Some("AS15169")),
                ),
                probe: Arc::new(FakeProbe::new()),
            },
        )
    }

    fn alphabet() -> CompanyIdentity {
        CompanyIdentity::new("Alphabet Inc.")
    }

    #[tokio::test]
    async fn completed_run_is_analyzed_and_stored() {
        let store = MemoryStore::default();
        let client = Arc::new(FakeAnalysis::default());
        let analyzer = Analyzer::new(client.clone(), None, RetryPolicy::none());

        let outcome = process_company(
            &runner(FakeFetcher::returning(source_document())),
            alphabet(),
            &store,
            Some(&analyzer),
            &SilentProgress,
        )
        .await;

        assert!(!outcome.aborted());
        assert!(outcome.run_id.is_some());
        assert_eq!(outcome.report.run_id, outcome.run_id);
        assert_eq!(store.count(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        let analysis = outcome.report.analysis.as_ref().unwrap();
        assert_eq!(analysis.summary, "Alphabet Inc. looks complete");

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved[0].1.len(), 2);
        assert!(saved[0].2.analysis.is_some());
    }

    #[tokio::test]
    async fn aborted_run_is_stored_without_analysis() {
        let store = MemoryStore::default();
        let client = Arc::new(FakeAnalysis::default());
        let analyzer = Analyzer::new(client.clone(), None, RetryPolicy::none());

        let outcome = process_company(
            &runner(FakeFetcher::failing(FetchError::NotFound {
                name: "Alphabet Inc.".into(),
            })),
            alphabet(),
            &store,
            Some(&analyzer),
            &SilentProgress,
        )
        .await;

        assert!(outcome.aborted());
        assert!(!outcome.report.passed);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count(), 1);
        assert!(store.saved.lock().unwrap()[0].2.aborted);
    }

    #[tokio::test]
    async fn analysis_failure_is_recorded_not_fatal() {
        let store = MemoryStore::default();
        let analyzer = Analyzer::new(Arc::new(FakeAnalysis::broken()), None, RetryPolicy::none());

        let outcome = process_company(
            &runner(FakeFetcher::returning(source_document())),
            alphabet(),
            &store,
            Some(&analyzer),
            &SilentProgress,
        )
        .await;

        assert!(!outcome.aborted());
        assert!(outcome.report.analysis.is_none());
        assert!(outcome.report.analysis_error.as_deref().unwrap().contains("429"));
        assert!(outcome.run_id.is_some());
    }

    #[tokio::test]
    async fn store_failure_keeps_scores() {
        let without_store = process_company(
            &runner(FakeFetcher::returning(source_document())),
            alphabet(),
            &MemoryStore::default(),
            None,
            &SilentProgress,
        )
        .await;
        let outcome = process_company(
            &runner(FakeFetcher::returning(source_document())),
            alphabet(),
            &MemoryStore::broken(),
            None,
            &SilentProgress,
        )
        .await;

        assert!(outcome.run_id.is_none());
        assert!(outcome.store_error.as_deref().unwrap().contains("disk I/O"));
        assert_eq!(outcome.report.overall_score, without_store.report.overall_score);
        assert_eq!(outcome.report.validation, without_store.report.validation);
    }

    #[tokio::test]
    async fn read_only_store_is_not_retried() {
        let store = MemoryStore::read_only();
        let outcome = process_company(
            &runner(FakeFetcher::returning(source_document())),
            alphabet(),
            &store,
            None,
            &SilentProgress,
        )
        .await;

        assert!(outcome.run_id.is_none());
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    }
}
