//! SQL migration definitions for the Corpscope database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: runs, companies, hierarchy, assets, validation, sources",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pipeline run
CREATE TABLE IF NOT EXISTS runs (
    id             TEXT PRIMARY KEY,
    company        TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    overall_score  REAL NOT NULL,
    passed         INTEGER NOT NULL,
    aborted        INTEGER NOT NULL,
    errors_json    TEXT NOT NULL,
    analysis_json  TEXT,
    analysis_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_company ON runs(company);

-- Company identity and derived name sets, plus the full record
CREATE TABLE IF NOT EXISTS companies (
    run_id             TEXT PRIMARY KEY REFERENCES runs(id) ON DELETE CASCADE,
    legal_name         TEXT NOT NULL,
    colloquial_name    TEXT,
    aliases_json       TEXT NOT NULL,
    search_terms_json  TEXT NOT NULL,
    name_variants_json TEXT NOT NULL,
    record_json        TEXT NOT NULL
);

-- Company tree, flattened in pre-order
CREATE TABLE IF NOT EXISTS hierarchy_nodes (
    run_id       TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    node_index   INTEGER NOT NULL,
    parent_index INTEGER,
    name         TEXT NOT NULL,
    kind         TEXT NOT NULL,
    domains_json TEXT NOT NULL,
    PRIMARY KEY (run_id, node_index)
);

-- Domains with network attribution
CREATE TABLE IF NOT EXISTS digital_assets (
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    position   INTEGER NOT NULL,
    domain     TEXT NOT NULL,
    is_active  INTEGER NOT NULL,
    asn        TEXT,
    netblock   TEXT,
    ip_address TEXT,
    terms_json TEXT NOT NULL,
    PRIMARY KEY (run_id, domain)
);

CREATE INDEX IF NOT EXISTS idx_digital_assets_asn ON digital_assets(asn);

-- Scorer output, one row per stage per run
CREATE TABLE IF NOT EXISTS validation_results (
    run_id               TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    stage                TEXT NOT NULL,
    status               TEXT NOT NULL,
    score                INTEGER NOT NULL,
    details_json         TEXT NOT NULL,
    recommendations_json TEXT NOT NULL,
    PRIMARY KEY (run_id, stage)
);

-- Raw collected documents
CREATE TABLE IF NOT EXISTS data_sources (
    run_id      TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    source_type TEXT NOT NULL,
    title       TEXT NOT NULL,
    source_url  TEXT NOT NULL,
    raw_json    TEXT NOT NULL,
    fetched_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_data_sources_run ON data_sources(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "LLM analysis cache",
            sql: r#"
CREATE TABLE IF NOT EXISTS analysis_cache (
    prompt_hash TEXT PRIMARY KEY,
    model_id    TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
