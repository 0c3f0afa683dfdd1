//! libSQL storage layer for pipeline runs.
//!
//! The [`Storage`] struct wraps a local libSQL database holding every run:
//! the company record, its hierarchy, digital assets, validation results,
//! the raw source document, and the LLM analysis cache.
//!
//! **Access rules:**
//! - `corpscope run` / `init-db`: read-write via [`Storage::open`]
//! - `corpscope runs`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corpscope_shared::{
    AnalysisCache, AnalysisResult, CompanyRecord, HierarchyNode, RunId, RunStore, RunSummary,
    StageError, StoreError, ValidationResult, ValidationStage,
};
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Source type recorded for collected documents.
const WIKIPEDIA_SOURCE: &str = "wikipedia";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Summary row of a persisted run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    pub id: RunId,
    pub company: String,
    pub created_at: DateTime<Utc>,
    pub overall_score: f64,
    pub passed: bool,
    pub aborted: bool,
    pub errors: Vec<StageError>,
}

/// A persisted run with everything needed to rebuild its report.
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub run: RunRow,
    pub record: CompanyRecord,
    pub results: Vec<ValidationResult>,
    pub analysis: Option<AnalysisResult>,
    pub analysis_error: Option<String>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("{}: {e}", parent.display())))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        let conn = db.connect().map_err(|e| StoreError::Open(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Err(StoreError::Open(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        let conn = db.connect().map_err(|e| StoreError::Open(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| StoreError::Migration {
                        version: migration.version,
                        message: e.to_string(),
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> StoreResult<()> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Persist a whole run in one transaction and return its id.
    #[instrument(skip_all, fields(company = %record.identity().legal_name))]
    pub async fn save_run(
        &self,
        record: &CompanyRecord,
        results: &[ValidationResult],
        summary: &RunSummary,
    ) -> StoreResult<RunId> {
        self.check_writable()?;

        let id = RunId::new();
        let run_id = id.to_string();
        let now = Utc::now().to_rfc3339();
        let identity = record.identity();

        let tx = self.conn.transaction().await.map_err(query_err)?;

        tx.execute(
            "INSERT INTO runs (id, company, created_at, overall_score, passed, aborted,
                               errors_json, analysis_json, analysis_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id.as_str(),
                identity.legal_name.as_str(),
                now.as_str(),
                summary.overall_score,
                summary.passed as i64,
                summary.aborted as i64,
                to_json(&summary.errors)?,
                summary.analysis.as_ref().map(to_json).transpose()?,
                summary.analysis_error.as_deref(),
            ],
        )
        .await
        .map_err(query_err)?;

        tx.execute(
            "INSERT INTO companies (run_id, legal_name, colloquial_name, aliases_json,
                                    search_terms_json, name_variants_json, record_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id.as_str(),
                identity.legal_name.as_str(),
                record.colloquial_name(),
                to_json(&identity.aliases)?,
                to_json(&record.search_terms)?,
                to_json(&record.name_variants)?,
                to_json(record)?,
            ],
        )
        .await
        .map_err(query_err)?;

        if let Some(root) = &record.hierarchy {
            let mut nodes = Vec::new();
            flatten(root, None, &mut nodes);
            for (index, parent, node) in nodes {
                tx.execute(
                    "INSERT INTO hierarchy_nodes (run_id, node_index, parent_index, name, kind, domains_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        run_id.as_str(),
                        index,
                        parent,
                        node.name.as_str(),
                        node.kind.as_str(),
                        to_json(&node.domains)?,
                    ],
                )
                .await
                .map_err(query_err)?;
            }
        }

        for (position, asset) in record.assets().iter().enumerate() {
            tx.execute(
                "INSERT INTO digital_assets (run_id, position, domain, is_active, asn, netblock,
                                             ip_address, terms_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id.as_str(),
                    position as i64,
                    asset.domain.as_str(),
                    asset.is_active as i64,
                    asset.asn.as_deref(),
                    asset.netblock.as_deref(),
                    asset.ip_address.as_deref(),
                    to_json(&asset.terms)?,
                ],
            )
            .await
            .map_err(query_err)?;
        }

        for result in results {
            tx.execute(
                "INSERT INTO validation_results (run_id, stage, status, score, details_json,
                                                 recommendations_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id.as_str(),
                    result.stage().as_str(),
                    result.status().as_str(),
                    i64::from(result.score()),
                    to_json(result.details())?,
                    to_json(result.recommendations())?,
                ],
            )
            .await
            .map_err(query_err)?;
        }

        if let Some(doc) = &record.source {
            tx.execute(
                "INSERT INTO data_sources (run_id, source_type, title, source_url, raw_json, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id.as_str(),
                    WIKIPEDIA_SOURCE,
                    doc.title.as_str(),
                    doc.source_url.as_str(),
                    to_json(doc)?,
                    doc.fetched_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;

        info!(run_id = %id, assets = record.assets().len(), "run persisted");
        Ok(id)
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> StoreResult<Vec<RunRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, company, created_at, overall_score, passed, aborted, errors_json
                 FROM runs ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(query_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    /// Load a run by id.
    pub async fn get_run(&self, id: &RunId) -> StoreResult<Option<StoredRun>> {
        let run_id = id.to_string();

        let mut rows = self
            .conn
            .query(
                "SELECT r.id, r.company, r.created_at, r.overall_score, r.passed, r.aborted,
                        r.errors_json, r.analysis_json, r.analysis_error, c.record_json
                 FROM runs r JOIN companies c ON c.run_id = r.id
                 WHERE r.id = ?1",
                params![run_id.as_str()],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };

        let run = row_to_run(&row)?;
        let analysis = optional_text(&row, 7)?
            .map(|json| from_json::<AnalysisResult>(&json))
            .transpose()?;
        let analysis_error = optional_text(&row, 8)?;
        let record: CompanyRecord = from_json(&row.get::<String>(9).map_err(query_err)?)?;

        let results = self.validation_results(&run_id).await?;
        debug!(run_id = %id, results = results.len(), "run loaded");

        Ok(Some(StoredRun {
            run,
            record,
            results,
            analysis,
            analysis_error,
        }))
    }

    async fn validation_results(&self, run_id: &str) -> StoreResult<Vec<ValidationResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stage, score, details_json, recommendations_json
                 FROM validation_results WHERE run_id = ?1
                 ORDER BY CASE stage WHEN 'source' THEN 0 ELSE 1 END",
                params![run_id],
            )
            .await
            .map_err(query_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let stage = match row.get::<String>(0).map_err(query_err)?.as_str() {
                "source" => ValidationStage::Source,
                "hierarchy" => ValidationStage::Hierarchy,
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "unknown validation stage '{other}'"
                    )));
                }
            };
            let score = u8::try_from(row.get::<i64>(1).map_err(query_err)?)
                .map_err(|e| StoreError::Corrupt(format!("validation score: {e}")))?;
            let details: BTreeMap<String, u64> =
                from_json(&row.get::<String>(2).map_err(query_err)?)?;
            let recommendations: Vec<String> =
                from_json(&row.get::<String>(3).map_err(query_err)?)?;

            results.push(ValidationResult::new(stage, score, details, recommendations));
        }
        Ok(results)
    }
}

#[async_trait]
impl RunStore for Storage {
    async fn save(
        &self,
        record: &CompanyRecord,
        results: &[ValidationResult],
        summary: &RunSummary,
    ) -> StoreResult<RunId> {
        self.save_run(record, results, summary).await
    }
}

// ---------------------------------------------------------------------------
// Analysis cache
// ---------------------------------------------------------------------------

#[async_trait]
impl AnalysisCache for Storage {
    async fn get_analysis(&self, key: &str) -> StoreResult<Option<AnalysisResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM analysis_cache WHERE prompt_hash = ?1",
                params![key],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let json: String = row.get(0).map_err(query_err)?;
                Ok(Some(from_json(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn put_analysis(
        &self,
        key: &str,
        model: &str,
        result: &AnalysisResult,
    ) -> StoreResult<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO analysis_cache (prompt_hash, model_id, result_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(prompt_hash) DO UPDATE SET
                   model_id = excluded.model_id,
                   result_json = excluded.result_json,
                   created_at = excluded.created_at",
                params![key, model, to_json(result)?, now.as_str()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn query_err(e: libsql::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Query(format!("serialize: {e}")))
}

fn from_json<T: DeserializeOwned>(json: &str) -> StoreResult<T> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// A nullable TEXT column.
fn optional_text(row: &libsql::Row, idx: i32) -> StoreResult<Option<String>> {
    match row.get_value(idx).map_err(query_err)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(text) => Ok(Some(text)),
        other => Err(StoreError::Corrupt(format!(
            "expected text in column {idx}, got {other:?}"
        ))),
    }
}

/// Pre-order flattening: `(index, parent_index, node)`.
fn flatten<'a>(
    node: &'a HierarchyNode,
    parent: Option<i64>,
    out: &mut Vec<(i64, Option<i64>, &'a HierarchyNode)>,
) {
    let index = out.len() as i64;
    out.push((index, parent, node));
    for child in &node.children {
        flatten(child, Some(index), out);
    }
}

/// Convert the leading `runs` columns to a [`RunRow`].
fn row_to_run(row: &libsql::Row) -> StoreResult<RunRow> {
    let id: String = row.get(0).map_err(query_err)?;
    let id = id
        .parse::<RunId>()
        .map_err(|e| StoreError::Corrupt(format!("run id '{id}': {e}")))?;
    let created_at: String = row.get(2).map_err(query_err)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid date: {e}")))?;

    Ok(RunRow {
        id,
        company: row.get(1).map_err(query_err)?,
        created_at,
        overall_score: row.get(3).map_err(query_err)?,
        passed: row.get::<i64>(4).map_err(query_err)? != 0,
        aborted: row.get::<i64>(5).map_err(query_err)? != 0,
        errors: from_json(&row.get::<String>(6).map_err(query_err)?)?,
    })
}
