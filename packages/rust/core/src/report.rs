//! Final hierarchy report for a run, written as JSON.

use std::path::Path;

use chrono::{DateTime, Utc};
use corpscope_shared::{
    AnalysisResult, CompanyIdentity, CompanyRecord, CorpscopeError, DigitalAsset, HierarchyNode,
    Result, RunId, RunSummary, StageError, ValidationResult,
};
use corpscope_storage::StoredRun;
use serde::{Deserialize, Serialize};

/// Everything a reader needs to judge one company run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// `None` when persisting the run failed.
    pub run_id: Option<RunId>,
    pub generated_at: DateTime<Utc>,
    pub company: CompanyIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub overall_score: f64,
    pub passed: bool,
    pub aborted: bool,
    pub validation: Vec<ValidationResult>,
    pub hierarchy: Option<HierarchyNode>,
    pub assets: Vec<DigitalAsset>,
    pub search_terms: Vec<String>,
    pub name_variants: Vec<String>,
    pub errors: Vec<StageError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl RunReport {
    pub fn new(
        record: &CompanyRecord,
        results: &[ValidationResult],
        summary: &RunSummary,
        run_id: Option<RunId>,
    ) -> Self {
        Self {
            run_id,
            generated_at: Utc::now(),
            company: record.identity().clone(),
            source_url: record.source.as_ref().map(|s| s.source_url.clone()),
            overall_score: summary.overall_score,
            passed: summary.passed,
            aborted: summary.aborted,
            validation: results.to_vec(),
            hierarchy: record.hierarchy.clone(),
            assets: record.assets().to_vec(),
            search_terms: record.search_terms.clone(),
            name_variants: record.name_variants.clone(),
            errors: summary.errors.clone(),
            analysis: summary.analysis.clone(),
            analysis_error: summary.analysis_error.clone(),
        }
    }

    /// Rebuild the report of a persisted run.
    pub fn from_stored(stored: &StoredRun) -> Self {
        let summary = RunSummary {
            overall_score: stored.run.overall_score,
            passed: stored.run.passed,
            aborted: stored.run.aborted,
            errors: stored.run.errors.clone(),
            analysis: stored.analysis.clone(),
            analysis_error: stored.analysis_error.clone(),
        };
        let mut report = Self::new(
            &stored.record,
            &stored.results,
            &summary,
            Some(stored.run.id.clone()),
        );
        report.generated_at = stored.run.created_at;
        report
    }

    /// Recommendations from every validation stage, in stage order.
    pub fn recommendations(&self) -> impl Iterator<Item = &str> {
        self.validation
            .iter()
            .flat_map(|r| r.recommendations().iter().map(String::as_str))
    }

    pub fn active_assets(&self) -> usize {
        self.assets.iter().filter(|a| a.is_active).count()
    }
}

/// Write reports as a pretty-printed JSON array, creating parent dirs.
pub fn write_reports(path: &Path, reports: &[RunReport]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CorpscopeError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(reports)
        .map_err(|e| CorpscopeError::validation(format!("report serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| CorpscopeError::io(path, e))?;
    tracing::info!(?path, reports = reports.len(), "report written");
    Ok(())
}
