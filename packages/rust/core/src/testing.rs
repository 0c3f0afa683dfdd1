//! In-memory collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use corpscope_shared::{
    AnalysisCache, AnalysisClient, AnalysisError, AnalysisResult, AssetCheckError, AssetProbe,
    CompanyFacts, CompanyIdentity, CompanyRecord, DomainResolver, FetchError, RawDocument,
    RecordSummary, Resolution, RunId, RunStore, RunSummary, SourceFetcher, StoreError,
    ValidationResult,
};

pub fn record_with_aliases(legal_name: &str, aliases: &[&str]) -> CompanyRecord {
    let identity = aliases
        .iter()
        .fold(CompanyIdentity::new(legal_name), |id, alias| id.with_alias(*alias));
    CompanyRecord::new(identity)
}

/// A trimmed-down Alphabet article.
pub fn source_document() -> RawDocument {
    RawDocument {
        title: "Alphabet Inc.".into(),
        source_url: "https://en.wikipedia.org/wiki/Alphabet_Inc.".into(),
        summary: "Alphabet Inc. is an American multinational technology conglomerate.".into(),
        text: "In 2014 Alphabet acquired DeepMind.".into(),
        facts: CompanyFacts {
            legal_name: Some("Alphabet Inc.".into()),
            domains: vec!["abc.xyz".into(), "mail.google.com".into(), "google.com".into()],
            subsidiaries: vec!["Google".into(), "Waymo".into()],
            brands: vec!["YouTube".into()],
            acquisitions: vec!["DeepMind".into()],
            ..CompanyFacts::default()
        },
        fetched_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct FakeFetcher {
    outcome: Result<RawDocument, FetchError>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn returning(doc: RawDocument) -> Self {
        Self {
            outcome: Ok(doc),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: FetchError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, _company_name: &str) -> Result<RawDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Resolves only the domains it was told about.
#[derive(Default)]
pub struct FakeResolver {
    known: HashMap<String, Resolution>,
    failing: Vec<String>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: &str, asn: Option<&str>) -> Self {
        let resolution = Resolution {
            ip_address: format!("198.51.100.{}", self.known.len() + 1),
            asn: asn.map(String::from),
            netblock: Some("198.51.100.0/24".into()),
        };
        self.known.insert(domain.to_string(), resolution);
        self
    }

    pub fn failing(mut self, domain: &str) -> Self {
        self.failing.push(domain.to_string());
        self
    }
}

#[async_trait]
impl DomainResolver for FakeResolver {
    async fn resolve(&self, domain: &str) -> Result<Option<Resolution>, AssetCheckError> {
        if self.failing.iter().any(|d| d == domain) {
            return Err(AssetCheckError::lookup(domain, "SERVFAIL"));
        }
        Ok(self.known.get(domain).cloned())
    }
}

/// Every domain is active unless configured otherwise.
#[derive(Default)]
pub struct FakeProbe {
    inactive: Vec<String>,
    failing: Vec<String>,
    delays: HashMap<String, Duration>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inactive(mut self, domain: &str) -> Self {
        self.inactive.push(domain.to_string());
        self
    }

    pub fn failing(mut self, domain: &str) -> Self {
        self.failing.push(domain.to_string());
        self
    }

    pub fn slow(mut self, domain: &str, delay: Duration) -> Self {
        self.delays.insert(domain.to_string(), delay);
        self
    }
}

#[async_trait]
impl AssetProbe for FakeProbe {
    async fn is_active(&self, domain: &str) -> Result<bool, AssetCheckError> {
        if let Some(delay) = self.delays.get(domain) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.iter().any(|d| d == domain) {
            return Err(AssetCheckError::network(domain, "connection reset"));
        }
        Ok(!self.inactive.iter().any(|d| d == domain))
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Vec<(CompanyRecord, Vec<ValidationResult>, RunSummary)>>,
    pub attempts: AtomicUsize,
    fail: bool,
    read_only: bool,
}

impl MemoryStore {
    pub fn broken() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn save(
        &self,
        record: &CompanyRecord,
        results: &[ValidationResult],
        summary: &RunSummary,
    ) -> Result<RunId, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        if self.fail {
            return Err(StoreError::Query("disk I/O error".into()));
        }
        self.saved
            .lock()
            .unwrap()
            .push((record.clone(), results.to_vec(), summary.clone()));
        Ok(RunId::new())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, AnalysisResult>>,
}

impl MemoryCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get_analysis(&self, key: &str) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put_analysis(
        &self,
        key: &str,
        _model: &str,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Returns a canned result, or fails when built with [`FakeAnalysis::broken`].
#[derive(Default)]
pub struct FakeAnalysis {
    pub calls: AtomicUsize,
    fail: bool,
}

impl FakeAnalysis {
    pub fn broken() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalysis {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn analyze(&self, summary: &RecordSummary) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AnalysisError::Status {
                status: 429,
                body: "rate limited".into(),
            });
        }
        Ok(AnalysisResult {
            data_quality_score: 80,
            summary: format!("{} looks complete", summary.company_name),
            model: self.model().to_string(),
            ..AnalysisResult::default()
        })
    }
}
