//! Core domain types for Corpscope company profiles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum stage (and overall) score that counts as a pass.
pub const PASS_THRESHOLD: u8 = 70;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// The closed set of pipeline operations, in canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Collection,
    DataEntry,
    DomainAssociation,
    AssetVerification,
    Enumeration,
    SourceValidation,
    HierarchyValidation,
}

impl Stage {
    /// Every stage, collection through validation.
    pub const ALL: [Stage; 7] = [
        Stage::Collection,
        Stage::DataEntry,
        Stage::DomainAssociation,
        Stage::AssetVerification,
        Stage::Enumeration,
        Stage::SourceValidation,
        Stage::HierarchyValidation,
    ];

    /// Everything after collection, for records built without a source fetch.
    pub const OFFLINE: [Stage; 6] = [
        Stage::DataEntry,
        Stage::DomainAssociation,
        Stage::AssetVerification,
        Stage::Enumeration,
        Stage::SourceValidation,
        Stage::HierarchyValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::DataEntry => "data_entry",
            Self::DomainAssociation => "domain_association",
            Self::AssetVerification => "asset_verification",
            Self::Enumeration => "enumeration",
            Self::SourceValidation => "source_validation",
            Self::HierarchyValidation => "hierarchy_validation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source document
// ---------------------------------------------------------------------------

/// A fetched source article, already reduced to text and structured facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// Article title as resolved by the source.
    pub title: String,
    /// Canonical article URL.
    pub source_url: String,
    /// Lead summary paragraph.
    pub summary: String,
    /// Plain-text body.
    pub text: String,
    /// Facts extracted from the article.
    pub facts: CompanyFacts,
    /// When the document was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// Structured company facts extracted from a source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colloquial_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsidiaries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acquisitions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_people: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employees: Option<String>,
}

// ---------------------------------------------------------------------------
// Company record
// ---------------------------------------------------------------------------

/// The names a company is known by. Fixed for the lifetime of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyIdentity {
    pub legal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colloquial_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CompanyIdentity {
    pub fn new(legal_name: impl Into<String>) -> Self {
        Self {
            legal_name: legal_name.into(),
            colloquial_name: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_colloquial(mut self, name: impl Into<String>) -> Self {
        self.colloquial_name = Some(name.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
        self
    }
}

/// The single record a pipeline run carries from stage to stage.
///
/// Identity is set at construction and only readable afterwards; every other
/// field is appended by a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    identity: CompanyIdentity,
    /// Extra search terms supplied by configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_terms: Vec<String>,
    /// Source document attached by collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RawDocument>,
    /// Normalized search terms in derivation order.
    #[serde(default)]
    pub search_terms: Vec<String>,
    #[serde(default)]
    assets: Vec<DigitalAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchyNode>,
    /// Every enumerated representation of the company's names.
    #[serde(default)]
    pub name_variants: Vec<String>,
}

impl CompanyRecord {
    pub fn new(identity: CompanyIdentity) -> Self {
        Self {
            identity,
            seed_terms: Vec::new(),
            source: None,
            search_terms: Vec::new(),
            assets: Vec::new(),
            hierarchy: None,
            name_variants: Vec::new(),
        }
    }

    pub fn identity(&self) -> &CompanyIdentity {
        &self.identity
    }

    /// Extracted facts, if a source document has been collected.
    pub fn facts(&self) -> Option<&CompanyFacts> {
        self.source.as_ref().map(|doc| &doc.facts)
    }

    /// Colloquial name from identity, falling back to the source facts.
    pub fn colloquial_name(&self) -> Option<&str> {
        self.identity
            .colloquial_name
            .as_deref()
            .or_else(|| self.facts().and_then(|f| f.colloquial_name.as_deref()))
    }

    /// All names the company is known by: legal, colloquial, aliases, and
    /// whatever the source adds. Order preserved, exact duplicates removed.
    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };

        push(&self.identity.legal_name);
        if let Some(c) = self.colloquial_name() {
            push(c);
        }
        for alias in &self.identity.aliases {
            push(alias);
        }
        if let Some(facts) = self.facts() {
            if let Some(legal) = &facts.legal_name {
                push(legal);
            }
            for alias in &facts.aliases {
                push(alias);
            }
        }
        names
    }

    pub fn assets(&self) -> &[DigitalAsset] {
        &self.assets
    }

    pub fn asset(&self, domain: &str) -> Option<&DigitalAsset> {
        self.assets.iter().find(|a| a.domain == domain)
    }

    /// Insert an asset, collapsing duplicates by domain.
    ///
    /// On collision the entry with a known ASN wins; association terms are
    /// merged either way and the original insertion position is kept.
    pub fn upsert_asset(&mut self, asset: DigitalAsset) {
        match self.assets.iter_mut().find(|a| a.domain == asset.domain) {
            Some(existing) => {
                let mut terms = std::mem::take(&mut existing.terms);
                for term in &asset.terms {
                    if !terms.contains(term) {
                        terms.push(term.clone());
                    }
                }
                if existing.asn.is_none() && asset.asn.is_some() {
                    *existing = asset;
                }
                existing.terms = terms;
            }
            None => self.assets.push(asset),
        }
    }

    /// Compact view for the analysis layer.
    pub fn summarize(&self, overall_score: f64, passed: bool) -> RecordSummary {
        let mut brands = Vec::new();
        let mut subsidiaries = Vec::new();
        if let Some(root) = &self.hierarchy {
            for node in root.iter().skip(1) {
                match node.kind {
                    NodeKind::Brand => brands.push(node.name.clone()),
                    NodeKind::Subsidiary => subsidiaries.push(node.name.clone()),
                    NodeKind::Company | NodeKind::Acquisition => {}
                }
            }
        }

        RecordSummary {
            company_name: self.identity.legal_name.clone(),
            colloquial_name: self.colloquial_name().map(String::from),
            search_terms: self.search_terms.clone(),
            domains: self.assets.iter().map(|a| a.domain.clone()).collect(),
            brands,
            subsidiaries,
            validation_score: overall_score,
            validation_passed: passed,
        }
    }

    /// Set the activity flag of an asset. Returns `false` if no such domain.
    pub fn set_asset_active(&mut self, domain: &str, active: bool) -> bool {
        match self.assets.iter_mut().find(|a| a.domain == domain) {
            Some(asset) => {
                asset.is_active = active;
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// DigitalAsset
// ---------------------------------------------------------------------------

/// A domain plus its network-ownership metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalAsset {
    pub domain: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netblock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Search terms this domain was associated from.
    #[serde(default)]
    pub terms: Vec<String>,
}

impl DigitalAsset {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            is_active: false,
            asn: None,
            netblock: None,
            ip_address: None,
            terms: Vec::new(),
        }
    }
}

/// Result of resolving a domain name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub ip_address: String,
    pub asn: Option<String>,
    pub netblock: Option<String>,
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// What a hierarchy node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Company,
    Subsidiary,
    Brand,
    Acquisition,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Subsidiary => "subsidiary",
            Self::Brand => "brand",
            Self::Acquisition => "acquisition",
        }
    }
}

/// A node in the company tree. Children are owned, so the tree cannot cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub name: String,
    pub kind: NodeKind,
    /// Domains attached to this node during association.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            domains: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Pre-order traversal including `self`.
    pub fn iter(&self) -> impl Iterator<Item = &HierarchyNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Visit every node mutably, pre-order.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut HierarchyNode)) {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }

    /// Number of nodes in the tree, including `self`.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A lone root has no subsidiaries or brands to show for itself.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_brand(&self) -> bool {
        self.children.iter().any(|c| c.kind == NodeKind::Brand)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Which validation stage produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Source,
    Hierarchy,
}

impl ValidationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Hierarchy => "hierarchy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn from_score(score: u8) -> Self {
        if score >= PASS_THRESHOLD {
            Self::Passed
        } else {
            Self::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of one validation stage. Read-only once built.
///
/// Deserialization goes through [`ValidationResult::new`], so a stored
/// status that disagrees with its score is recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ValidationResultRepr")]
pub struct ValidationResult {
    stage: ValidationStage,
    status: ValidationStatus,
    score: u8,
    #[serde(default)]
    details: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    recommendations: Vec<String>,
}

#[derive(Deserialize)]
struct ValidationResultRepr {
    stage: ValidationStage,
    score: u8,
    #[serde(default)]
    details: BTreeMap<String, u64>,
    #[serde(default)]
    recommendations: Vec<String>,
}

impl From<ValidationResultRepr> for ValidationResult {
    fn from(repr: ValidationResultRepr) -> Self {
        Self::new(repr.stage, repr.score, repr.details, repr.recommendations)
    }
}

impl ValidationResult {
    /// Build a result; the score is clamped to 0–100 and the status derived
    /// from it, so the two can never disagree.
    pub fn new(
        stage: ValidationStage,
        score: u8,
        details: BTreeMap<String, u64>,
        recommendations: Vec<String>,
    ) -> Self {
        let score = score.min(100);
        Self {
            stage,
            status: ValidationStatus::from_score(score),
            score,
            details,
            recommendations,
        }
    }

    pub fn stage(&self) -> ValidationStage {
        self.stage
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn details(&self) -> &BTreeMap<String, u64> {
        &self.details
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Compact view of a record handed to the analysis layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colloquial_name: Option<String>,
    pub search_terms: Vec<String>,
    pub domains: Vec<String>,
    pub brands: Vec<String>,
    pub subsidiaries: Vec<String>,
    pub validation_score: f64,
    pub validation_passed: bool,
}

/// Structured output of the analysis layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub data_quality_score: u8,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub business_insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: String,
    /// Model that produced the analysis.
    #[serde(default)]
    pub model: String,
}

/// Run-level outcome persisted next to the record and its validation results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub overall_score: f64,
    pub passed: bool,
    /// Set when a fatal error stopped the run early.
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub errors: Vec<crate::error::StageError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}
