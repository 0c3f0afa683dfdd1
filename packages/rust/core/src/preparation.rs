//! Preparation stages: data entry, domain association, asset verification
//! ("DANS check") and name enumeration.
//!
//! Every stage works in place on the run's [`CompanyRecord`]. Recoverable
//! problems come back as a list of [`StageError`]s; only data entry can fail
//! outright, when the record has no legal name.

use std::sync::Arc;
use std::time::Duration;

use corpscope_shared::{
    AssetCheckError, AssetCheckFailure, AssetProbe, CompanyRecord, DigitalAsset, DomainResolver,
    HierarchyNode, NodeKind, Stage, StageCause, StageError,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::ProgressReporter;
use crate::retry::RetryPolicy;

/// Trailing words dropped when normalizing a company name.
const CORPORATE_SUFFIXES: &[&str] = &[
    "inc",
    "inc.",
    "llc",
    "corp",
    "corp.",
    "corporation",
    "ltd",
    "ltd.",
    "limited",
    "co",
    "co.",
    "company",
    "plc",
    "gmbh",
    "ag",
    "sa",
];

/// Shortest word kept as a standalone name variant.
const MIN_WORD_VARIANT: usize = 3;

// ---------------------------------------------------------------------------
// Name helpers
// ---------------------------------------------------------------------------

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_corporate_suffix(word: &str) -> bool {
    CORPORATE_SUFFIXES.contains(&word.to_lowercase().as_str())
}

/// Drop one trailing corporate suffix, keeping case. Single words are
/// returned unchanged so "Company" never normalizes to nothing.
pub fn strip_corporate_suffix(name: &str) -> &str {
    let trimmed = name.trim();
    match trimmed.rsplit_once(char::is_whitespace) {
        Some((head, last)) if is_corporate_suffix(last) => {
            head.trim_end().trim_end_matches(',').trim_end()
        }
        _ => trimmed,
    }
}

/// Search-term normalization: trim, collapse whitespace, lowercase, strip
/// one trailing corporate suffix.
pub fn normalize_term(name: &str) -> String {
    let lowered = collapse_whitespace(name).to_lowercase();
    strip_corporate_suffix(&lowered).to_string()
}

/// ASCII alphanumerics of a term, used as a domain label.
pub fn slug(term: &str) -> String {
    term.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// Remove punctuation; hyphens, slashes and underscores become spaces.
fn strip_punctuation(name: &str) -> String {
    let spaced: String = name
        .chars()
        .filter_map(|c| match c {
            '-' | '/' | '_' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() || c == '&' => Some(c),
            _ => None,
        })
        .collect();
    collapse_whitespace(&spaced)
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

// ---------------------------------------------------------------------------
// Stage 1: data entry
// ---------------------------------------------------------------------------

/// Derive normalized search terms and build the company hierarchy.
///
/// Terms come from every known name, configured seed terms and the names of
/// hierarchy children, in that order. Re-running replaces both fields.
#[instrument(skip_all, fields(company = %record.identity().legal_name))]
pub fn data_entry(record: &mut CompanyRecord, seed_terms: &[String]) -> Result<(), StageError> {
    if record.identity().legal_name.trim().is_empty() {
        return Err(StageError::new(Stage::DataEntry, StageCause::MissingIdentity));
    }

    let hierarchy = build_hierarchy(record);

    let mut names = record.known_names();
    names.extend(seed_terms.iter().cloned());
    names.extend(hierarchy.iter().skip(1).map(|node| node.name.clone()));

    let mut terms = Vec::new();
    for name in &names {
        push_unique(&mut terms, normalize_term(name));
    }

    info!(
        terms = terms.len(),
        nodes = hierarchy.len(),
        "search terms derived"
    );
    record.search_terms = terms;
    record.hierarchy = Some(hierarchy);
    Ok(())
}

/// Root is the target company; children come from the collected source.
fn build_hierarchy(record: &CompanyRecord) -> HierarchyNode {
    let legal_name = collapse_whitespace(&record.identity().legal_name);
    let mut root = HierarchyNode::new(legal_name.clone(), NodeKind::Company);
    let mut seen = vec![normalize_term(&legal_name)];

    let Some(facts) = record.facts() else {
        return root;
    };

    let groups = [
        (&facts.subsidiaries, NodeKind::Subsidiary),
        (&facts.brands, NodeKind::Brand),
        (&facts.acquisitions, NodeKind::Acquisition),
    ];
    for (names, kind) in groups {
        for name in names {
            let key = normalize_term(name);
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            root.children
                .push(HierarchyNode::new(collapse_whitespace(name), kind));
        }
    }
    root
}

// ---------------------------------------------------------------------------
// Stage 2: domain association
// ---------------------------------------------------------------------------

/// Candidate domains with the search terms that produced them, in order.
pub fn domain_candidates(record: &CompanyRecord, tlds: &[String]) -> Vec<(String, Vec<String>)> {
    let mut candidates: Vec<(String, Vec<String>)> = Vec::new();
    let mut add = |domain: String, term: Option<&String>| {
        match candidates.iter_mut().find(|(d, _)| *d == domain) {
            Some((_, terms)) => {
                if let Some(term) = term {
                    push_unique(terms, term.clone());
                }
            }
            None => candidates.push((domain, term.into_iter().cloned().collect())),
        }
    };

    for term in &record.search_terms {
        let label = slug(term);
        if label.is_empty() {
            continue;
        }
        for tld in tlds {
            add(format!("{label}.{}", tld.trim_start_matches('.')), Some(term));
        }
    }

    if let Some(facts) = record.facts() {
        for domain in &facts.domains {
            let domain = domain.trim().to_lowercase();
            if domain.is_empty() {
                continue;
            }
            let linked: Vec<&String> = record
                .search_terms
                .iter()
                .filter(|term| {
                    let label = slug(term);
                    !label.is_empty() && domain.contains(&label)
                })
                .collect();
            if linked.is_empty() {
                add(domain, None);
            } else {
                for term in linked {
                    add(domain.clone(), Some(term));
                }
            }
        }
    }

    candidates
}

/// Resolve every candidate domain and keep those that resolve.
///
/// Duplicates collapse by domain, preferring an entry with a known ASN.
/// Running twice over the same record yields the same assets.
#[instrument(skip_all, fields(company = %record.identity().legal_name))]
pub async fn associate_domains(
    record: &mut CompanyRecord,
    resolver: &dyn DomainResolver,
    tlds: &[String],
    retry: &RetryPolicy,
) -> Vec<StageError> {
    let candidates = domain_candidates(record, tlds);
    let mut errors = Vec::new();
    info!(candidates = candidates.len(), "associating domains");

    for (domain, terms) in candidates {
        let name = domain.as_str();
        let resolved = retry
            .run("resolve domain", move || resolver.resolve(name), is_transient_check)
            .await;

        match resolved {
            Ok(Some(resolution)) => {
                debug!(%domain, asn = ?resolution.asn, "domain resolved");
                record.upsert_asset(DigitalAsset {
                    domain,
                    is_active: false,
                    asn: resolution.asn,
                    netblock: resolution.netblock,
                    ip_address: Some(resolution.ip_address),
                    terms,
                });
            }
            Ok(None) => debug!(%domain, "candidate does not resolve"),
            Err(e) => {
                warn!(error = %e, "domain lookup failed");
                errors.push(StageError::new(
                    Stage::DomainAssociation,
                    StageCause::AssetCheck(e),
                ));
            }
        }
    }

    attach_domains(record);
    info!(assets = record.assets().len(), "domain association complete");
    errors
}

fn is_transient_check(e: &AssetCheckError) -> bool {
    matches!(
        e.reason,
        AssetCheckFailure::Timeout(_) | AssetCheckFailure::Network(_)
    )
}

/// Attach each asset's domain to the hierarchy nodes its terms name.
/// Assets that match no child node belong to the root.
fn attach_domains(record: &mut CompanyRecord) {
    let Some(mut root) = record.hierarchy.take() else {
        return;
    };

    root.for_each_mut(&mut |node| node.domains.clear());
    let child_terms: Vec<String> = root
        .iter()
        .skip(1)
        .map(|node| normalize_term(&node.name))
        .collect();

    let mut by_term: Vec<(String, String)> = Vec::new();
    for asset in record.assets() {
        let mut placed = false;
        for term in &asset.terms {
            if child_terms.contains(term) {
                by_term.push((term.clone(), asset.domain.clone()));
                placed = true;
            }
        }
        if !placed || asset.terms.iter().any(|t| !child_terms.contains(t)) {
            push_unique(&mut root.domains, asset.domain.clone());
        }
    }

    for child in &mut root.children {
        child.for_each_mut(&mut |node| {
            let key = normalize_term(&node.name);
            for (term, domain) in &by_term {
                if *term == key {
                    push_unique(&mut node.domains, domain.clone());
                }
            }
        });
    }

    record.hierarchy = Some(root);
}

// ---------------------------------------------------------------------------
// Stage 3: asset verification
// ---------------------------------------------------------------------------

/// Check every asset's reachability with bounded concurrency.
///
/// Each check runs under `timeout`; a failed or timed-out check marks the
/// asset inactive and is reported as an [`AssetCheckError`]. When any asset
/// degraded, a summary error for the stage follows the individual ones.
#[instrument(skip_all, fields(company = %record.identity().legal_name))]
pub async fn verify_assets(
    record: &mut CompanyRecord,
    probe: Arc<dyn AssetProbe>,
    concurrency: usize,
    timeout: Duration,
    retry: &RetryPolicy,
    progress: &dyn ProgressReporter,
) -> Vec<StageError> {
    let domains: Vec<String> = record.assets().iter().map(|a| a.domain.clone()).collect();
    let total = domains.len();
    if total == 0 {
        return Vec::new();
    }

    info!(total, concurrency, "verifying assets");
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let handles: Vec<_> = domains
        .iter()
        .map(|domain| {
            let semaphore = Arc::clone(&semaphore);
            let probe = Arc::clone(&probe);
            let retry = retry.clone();
            let domain = domain.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                check_asset(probe.as_ref(), &domain, timeout, &retry).await
            })
        })
        .collect();

    // Awaiting in spawn order restores insertion order.
    let mut errors = Vec::new();
    let mut degraded = 0;
    for (index, (domain, handle)) in domains.iter().zip(handles).enumerate() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AssetCheckError::network(
                domain,
                format!("check task failed: {e}"),
            )),
        };

        let active = match outcome {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "asset degraded to inactive");
                degraded += 1;
                errors.push(StageError::new(
                    Stage::AssetVerification,
                    StageCause::AssetCheck(e),
                ));
                false
            }
        };
        record.set_asset_active(domain, active);
        progress.asset_checked(domain, active, index + 1, total);
    }

    if degraded > 0 {
        errors.push(StageError::new(
            Stage::AssetVerification,
            StageCause::Degraded { degraded, total },
        ));
    }

    let active = record.assets().iter().filter(|a| a.is_active).count();
    info!(total, active, degraded, "asset verification complete");
    errors
}

async fn check_asset(
    probe: &dyn AssetProbe,
    domain: &str,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<bool, AssetCheckError> {
    retry
        .run(
            "asset check",
            move || async move {
                match tokio::time::timeout(timeout, probe.is_active(domain)).await {
                    Ok(result) => result,
                    Err(_) => Err(AssetCheckError::timeout(domain, timeout.as_millis() as u64)),
                }
            },
            is_transient_check,
        )
        .await
}

// ---------------------------------------------------------------------------
// Stage 4: enumeration
// ---------------------------------------------------------------------------

/// Every representation of the company's names, ordered and deduplicated:
/// each known name, its suffix-free base, punctuation-free forms, the
/// joined form and (for multi-word names) the individual words. Brands,
/// subsidiaries and acquisitions from the hierarchy follow the company's own
/// names.
#[instrument(skip_all, fields(company = %record.identity().legal_name))]
pub fn enumerate_names(record: &mut CompanyRecord) {
    let mut variants = Vec::new();

    for name in record.known_names() {
        push_variants(&mut variants, &name);
    }
    if let Some(root) = &record.hierarchy {
        for node in root.iter().skip(1) {
            push_variants(&mut variants, &node.name);
        }
    }

    debug!(variants = variants.len(), "names enumerated");
    record.name_variants = variants;
}

fn push_variants(variants: &mut Vec<String>, name: &str) {
    let name = collapse_whitespace(name);
    let base = strip_corporate_suffix(&name).to_string();
    let stripped = strip_punctuation(&name);
    let base_stripped = strip_punctuation(&base);

    push_unique(variants, name);
    push_unique(variants, base);
    push_unique(variants, stripped);

    let words: Vec<&str> = base_stripped.split_whitespace().collect();
    if words.len() > 1 {
        push_unique(variants, words.concat());
        for word in &words {
            if word.chars().count() >= MIN_WORD_VARIANT && !is_corporate_suffix(word) {
                push_unique(variants, (*word).to_string());
            }
        }
    }
    push_unique(variants, base_stripped);
}
