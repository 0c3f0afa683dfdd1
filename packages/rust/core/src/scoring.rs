//! Validation scorer.
//!
//! Two stages, each producing one [`ValidationResult`]:
//!
//! - source: share of search terms backed by at least one active asset
//! - hierarchy: share of hierarchy nodes with an active domain or a brand
//!
//! Scores are integer percentages rounded down. The run's overall score is
//! the mean of the stage scores.

use std::collections::{BTreeMap, BTreeSet};

use corpscope_shared::{CompanyRecord, PASS_THRESHOLD, ValidationResult, ValidationStage};
use tracing::{info, instrument};

fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (part * 100 / total) as u8
}

fn details<const N: usize>(entries: [(&str, usize); N]) -> BTreeMap<String, u64> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value as u64))
        .collect()
}

/// Score how many search terms resolved to an active digital asset.
#[instrument(skip_all, fields(company = %record.identity().legal_name))]
pub fn score_source(record: &CompanyRecord) -> ValidationResult {
    let assets = record.assets();
    let active: Vec<_> = assets.iter().filter(|a| a.is_active).collect();

    let unresolved: Vec<&String> = record
        .search_terms
        .iter()
        .filter(|term| !active.iter().any(|a| a.terms.contains(term)))
        .collect();
    let terms_total = record.search_terms.len();
    let terms_resolved = terms_total - unresolved.len();
    let score = percentage(terms_resolved, terms_total);

    let asns: BTreeSet<&str> = assets.iter().filter_map(|a| a.asn.as_deref()).collect();
    let netblocks: BTreeSet<&str> = assets.iter().filter_map(|a| a.netblock.as_deref()).collect();

    let mut recommendations = Vec::new();
    if score < PASS_THRESHOLD {
        if terms_total == 0 {
            recommendations.push("Add search terms for the company's known names".to_string());
        } else {
            let names: Vec<&str> = unresolved.iter().map(|t| t.as_str()).collect();
            recommendations.push(format!(
                "Refine search terms with no active domain: {}",
                names.join(", ")
            ));
        }
        let inactive = assets.len() - active.len();
        if inactive > 0 {
            recommendations.push(format!("Verify {inactive} inactive domain(s)"));
        }
    }

    info!(score, terms_total, terms_resolved, "source validated");
    ValidationResult::new(
        ValidationStage::Source,
        score,
        details([
            ("terms_total", terms_total),
            ("terms_resolved", terms_resolved),
            ("domains_total", assets.len()),
            ("domains_active", active.len()),
            ("asns", asns.len()),
            ("netblocks", netblocks.len()),
        ]),
        recommendations,
    )
}

/// Score how much of the company tree is backed by evidence. A tree with
/// only its root fails with 0.
#[instrument(skip_all, fields(company = %record.identity().legal_name))]
pub fn score_hierarchy(record: &CompanyRecord) -> ValidationResult {
    let (nodes_total, nodes_verified) = match &record.hierarchy {
        Some(root) if !root.is_empty() => {
            let verified = root
                .iter()
                .filter(|node| {
                    node.has_brand()
                        || node
                            .domains
                            .iter()
                            .any(|d| record.asset(d).is_some_and(|a| a.is_active))
                })
                .count();
            (root.len(), verified)
        }
        _ => (0, 0),
    };
    let score = percentage(nodes_verified, nodes_total);

    let mut recommendations = Vec::new();
    if score < PASS_THRESHOLD {
        if nodes_total == 0 {
            recommendations.push("Complete the subsidiary and brand hierarchy".to_string());
        } else {
            recommendations.push(format!(
                "Find active domains for {} unverified hierarchy node(s)",
                nodes_total - nodes_verified
            ));
        }
    }

    info!(score, nodes_total, nodes_verified, "hierarchy validated");
    ValidationResult::new(
        ValidationStage::Hierarchy,
        score,
        details([("nodes_total", nodes_total), ("nodes_verified", nodes_verified)]),
        recommendations,
    )
}

/// Mean of the stage scores; 0 when nothing was scored.
pub fn overall_score(results: &[ValidationResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let sum: f64 = results.iter().map(|r| f64::from(r.score())).sum();
    sum / results.len() as f64
}

pub fn overall_passed(score: f64) -> bool {
    score >= f64::from(PASS_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_with_aliases;
    use corpscope_shared::{DigitalAsset, HierarchyNode, NodeKind, ValidationStatus};

    fn asset(domain: &str, terms: &[&str], active: bool) -> DigitalAsset {
        DigitalAsset {
            is_active: active,
            terms: terms.iter().map(|t| t.to_string()).collect(),
            asn: Some("AS15169".into()),
            ..DigitalAsset::new(domain)
        }
    }

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn all_terms_resolving_pass() {
        let mut record = record_with_aliases("Alphabet Inc.", &["Google"]);
        record.search_terms = terms(&["alphabet", "google"]);
        record.upsert_asset(asset("google.com", &["google"], true));
        record.upsert_asset(asset("alphabet.com", &["alphabet"], true));

        let result = score_source(&record);
        assert_eq!(result.score(), 100);
        assert_eq!(result.status(), ValidationStatus::Passed);
        assert_eq!(result.details()["asns"], 1);
        assert!(result.recommendations().is_empty());
    }

    #[test]
    fn two_of_three_terms_fail() {
        let mut record = record_with_aliases("Alphabet Inc.", &[]);
        record.search_terms = terms(&["alphabet", "google", "nonexistent"]);
        record.upsert_asset(asset("google.com", &["google"], true));
        record.upsert_asset(asset("alphabet.com", &["alphabet"], true));

        let result = score_source(&record);
        assert_eq!(result.score(), 66);
        assert!(!result.passed());
        assert!(result.recommendations()[0].contains("nonexistent"));
    }

    #[test]
    fn inactive_assets_do_not_count() {
        let mut record = record_with_aliases("Alphabet Inc.", &[]);
        record.search_terms = terms(&["alphabet"]);
        record.upsert_asset(asset("alphabet.com", &["alphabet"], false));

        let result = score_source(&record);
        assert_eq!(result.score(), 0);
        assert_eq!(result.details()["domains_active"], 0);
        assert!(result.recommendations().iter().any(|r| r.contains("inactive")));
    }

    #[test]
    fn no_terms_fail_with_zero() {
        let record = record_with_aliases("Alphabet Inc.", &[]);
        let result = score_source(&record);
        assert_eq!(result.score(), 0);
        assert_eq!(result.status(), ValidationStatus::Failed);
    }

    #[test]
    fn source_score_is_monotonic() {
        let all = ["a", "b", "c", "d", "e", "f", "g"];
        let mut record = record_with_aliases("Acme Corp", &[]);
        record.search_terms = terms(&all);

        let mut previous = 0;
        for (i, term) in all.iter().enumerate() {
            record.upsert_asset(asset(&format!("{term}.com"), &[*term], true));
            let score = score_source(&record).score();
            assert!(score >= previous, "score dropped after {} resolved", i + 1);
            previous = score;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn empty_hierarchy_fails() {
        let mut record = record_with_aliases("Alphabet Inc.", &[]);
        assert_eq!(score_hierarchy(&record).score(), 0);

        // A root with an active domain but no children is still empty.
        let mut root = HierarchyNode::new("Alphabet Inc.", NodeKind::Company);
        root.domains.push("abc.xyz".into());
        record.upsert_asset(asset("abc.xyz", &[], true));
        record.hierarchy = Some(root);

        let result = score_hierarchy(&record);
        assert_eq!(result.score(), 0);
        assert!(!result.passed());
        assert_eq!(result.details()["nodes_total"], 0);
    }

    #[test]
    fn hierarchy_counts_brands_and_active_domains() {
        let mut record = record_with_aliases("Alphabet Inc.", &[]);
        record.upsert_asset(asset("google.com", &["google"], true));
        record.upsert_asset(asset("waymo.com", &["waymo"], false));

        let mut google = HierarchyNode::new("Google", NodeKind::Subsidiary);
        google.domains.push("google.com".into());
        let mut waymo = HierarchyNode::new("Waymo", NodeKind::Subsidiary);
        waymo.domains.push("waymo.com".into());
        let mut root = HierarchyNode::new("Alphabet Inc.", NodeKind::Company);
        root.children = vec![
            google,
            waymo,
            HierarchyNode::new("YouTube", NodeKind::Brand),
        ];
        record.hierarchy = Some(root);

        // Root (has a brand) and Google verify; Waymo and YouTube do not.
        let result = score_hierarchy(&record);
        assert_eq!(result.details()["nodes_total"], 4);
        assert_eq!(result.details()["nodes_verified"], 2);
        assert_eq!(result.score(), 50);
    }

    #[test]
    fn overall_is_the_mean() {
        let make = |score| ValidationResult::new(ValidationStage::Source, score, BTreeMap::new(), vec![]);
        let score = overall_score(&[make(88), make(83)]);
        assert!((score - 85.5).abs() < f64::EPSILON);
        assert!(overall_passed(score));

        assert_eq!(overall_score(&[]), 0.0);
        assert!(!overall_passed(69.5));
    }
}
