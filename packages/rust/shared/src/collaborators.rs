//! Narrow interfaces to the systems the pipeline talks to.
//!
//! Concrete implementations live in `corpscope-collector` (source),
//! `corpscope-assets` (DNS, ASN, reachability) and `corpscope-storage`
//! (persistence); tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::error::{AnalysisError, AssetCheckError, FetchError, StoreError};
use crate::types::{
    AnalysisResult, CompanyRecord, RawDocument, RecordSummary, Resolution, RunId, RunSummary,
    ValidationResult,
};

/// Fetches the source document describing a company.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, company_name: &str) -> Result<RawDocument, FetchError>;
}

/// Resolves a domain name to its network metadata.
#[async_trait]
pub trait DomainResolver: Send + Sync {
    /// `Ok(None)` means the name does not resolve to a public address.
    async fn resolve(&self, domain: &str) -> Result<Option<Resolution>, AssetCheckError>;
}

/// Checks whether a domain currently serves anything.
#[async_trait]
pub trait AssetProbe: Send + Sync {
    async fn is_active(&self, domain: &str) -> Result<bool, AssetCheckError>;
}

/// Optional LLM enrichment over a finished record.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Model identifier, part of the cache key.
    fn model(&self) -> &str;

    async fn analyze(&self, summary: &RecordSummary) -> Result<AnalysisResult, AnalysisError>;
}

/// Storage for analysis responses, keyed by prompt hash.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    async fn get_analysis(&self, key: &str) -> Result<Option<AnalysisResult>, StoreError>;

    async fn put_analysis(
        &self,
        key: &str,
        model: &str,
        result: &AnalysisResult,
    ) -> Result<(), StoreError>;
}

/// Persists a completed (or aborted) run.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(
        &self,
        record: &CompanyRecord,
        results: &[ValidationResult],
        summary: &RunSummary,
    ) -> Result<RunId, StoreError>;
}
