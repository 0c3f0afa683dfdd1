//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use corpscope_assets as assets;
use corpscope_collector::WikipediaFetcher;
use corpscope_core::{
    Analyzer, Collaborators, CompanyOutcome, PipelineRunner, ProgressReporter, RunReport,
    client_from_config, process_company, write_reports,
};
use corpscope_shared::{
    AnalysisCache, AnalysisProvider, AppConfig, CompanyIdentity, PipelineConfig, RunId, Stage,
    expand_home, init_config, load_config,
};
use corpscope_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Corpscope: collect, enrich and validate company profiles.
#[derive(Parser)]
#[command(
    name = "corpscope",
    version,
    about = "Collect, enrich and validate company-profile data starting from Wikipedia.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also append log output to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for one or more companies.
    Run {
        /// Company name (repeatable). Defaults to the configured target.
        #[arg(short, long = "company")]
        companies: Vec<String>,

        /// Extra search term merged into data entry (repeatable).
        #[arg(short, long = "search-term")]
        search_terms: Vec<String>,

        /// Analysis provider: none, openai or gemini. Overrides config.
        #[arg(short, long)]
        analysis: Option<AnalysisProvider>,

        /// Database path (defaults to the configured database_path).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write a JSON report of every run to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Create the database and apply migrations.
    InitDb {
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List persisted runs, newest first.
    Runs {
        #[arg(long)]
        db: Option<PathBuf>,

        /// Maximum number of runs to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show one persisted run.
    Show {
        /// Run identifier, as printed by `run` and `runs`.
        run_id: String,

        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Console output goes to stderr;
/// `--log-file` adds a second, uncolored sink in the same format.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

    let filter = match cli.verbose {
        0 => "corpscope=warn",
        1 => "corpscope=info",
        2 => "corpscope=debug",
        _ => "corpscope=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match cli.log_format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    });

    if let Some(path) = &cli.log_file {
        match open_log_file(path) {
            Ok(file) => {
                let writer = std::sync::Mutex::new(file);
                layers.push(match cli.log_format {
                    LogFormat::Text => fmt::layer()
                        .with_ansi(false)
                        .with_target(false)
                        .with_writer(writer)
                        .boxed(),
                    LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
                });
            }
            Err(e) => eprintln!("warning: cannot open log file {}: {e}", path.display()),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();
}

/// Open `path` for appending, creating it and its parent directories.
fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            companies,
            search_terms,
            analysis,
            db,
            report,
        } => {
            cmd_run(
                companies,
                search_terms,
                analysis,
                db.as_deref(),
                report.as_deref(),
            )
            .await
        }
        Command::InitDb { db } => cmd_init_db(db.as_deref()).await,
        Command::Runs { db, limit } => cmd_runs(db.as_deref(), limit).await,
        Command::Show { run_id, db, json } => cmd_show(&run_id, db.as_deref(), json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// `--db` wins over the configured path; `~/` is expanded either way.
fn database_path(config: &AppConfig, db: Option<&Path>) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(expand_home(&path.to_string_lossy())?),
        None => Ok(expand_home(&config.defaults.database_path)?),
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    companies: Vec<String>,
    search_terms: Vec<String>,
    analysis: Option<AnalysisProvider>,
    db: Option<&Path>,
    report: Option<&Path>,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(provider) = analysis {
        config.analysis.provider = provider;
    }

    let companies = if companies.is_empty() {
        vec![config.defaults.target_company.clone()]
    } else {
        companies
    };

    // Fail on a missing API key before any network work.
    let analysis_client = client_from_config(&config.analysis)?;

    let mut pipeline_config = PipelineConfig::from(&config);
    pipeline_config.seed_terms.extend(search_terms);

    let db_path = database_path(&config, db)?;
    let storage = Arc::new(Storage::open(&db_path).await?);

    let fetcher = WikipediaFetcher::new(&config.wikipedia)?;
    let (resolver, probe) = assets::from_config(&config.assets)?;
    let runner = PipelineRunner::new(
        pipeline_config,
        Collaborators {
            fetcher: Arc::new(fetcher),
            resolver: Arc::new(resolver),
            probe: Arc::new(probe),
        },
    );

    let cache: Arc<dyn AnalysisCache> = storage.clone();
    let analyzer = analysis_client
        .map(|client| Analyzer::new(client, Some(cache), runner.retry().clone()));

    info!(
        companies = companies.len(),
        db = %db_path.display(),
        analysis = %config.analysis.provider,
        "starting runs"
    );

    let mut reports = Vec::with_capacity(companies.len());
    let mut failed = 0;
    for name in &companies {
        let progress = CliProgress::new(name);
        let outcome = process_company(
            &runner,
            CompanyIdentity::new(name.trim()),
            storage.as_ref(),
            analyzer.as_ref(),
            &progress,
        )
        .await;

        print_outcome(&outcome);
        if outcome.aborted() || outcome.store_error.is_some() {
            failed += 1;
        }
        reports.push(outcome.report);
    }

    if let Some(path) = report {
        write_reports(path, &reports)?;
        println!("  Report written to {}", path.display());
        println!();
    }

    if failed > 0 {
        return Err(eyre!(
            "{failed} of {} company run(s) did not complete",
            companies.len()
        ));
    }
    Ok(())
}

fn print_outcome(outcome: &CompanyOutcome) {
    let report = &outcome.report;
    let verdict = if report.aborted {
        "ABORTED"
    } else if report.passed {
        "PASSED"
    } else {
        "FAILED"
    };

    println!();
    println!("  {}  {verdict}", report.company.legal_name);
    println!("  Overall:   {:.1}", report.overall_score);
    for result in &report.validation {
        println!(
            "  {:<10} {:>3}  {}",
            format!("{}:", capitalize(result.stage().as_str())),
            result.score(),
            result.status().as_str()
        );
    }
    println!(
        "  Assets:    {}/{} active",
        report.active_assets(),
        report.assets.len()
    );
    println!("  Terms:     {}", report.search_terms.len());
    println!("  Variants:  {}", report.name_variants.len());
    if !report.errors.is_empty() {
        println!("  Errors:    {}", report.errors.len());
        for error in &report.errors {
            println!("    - {error}");
        }
    }
    for recommendation in report.recommendations() {
        println!("  > {recommendation}");
    }
    if let Some(analysis) = &report.analysis {
        println!(
            "  Analysis:  quality {} ({})",
            analysis.data_quality_score, analysis.model
        );
        if !analysis.summary.is_empty() {
            println!("    {}", analysis.summary);
        }
    }
    if let Some(error) = &report.analysis_error {
        println!("  Analysis failed: {error}");
    }
    match (&outcome.run_id, &outcome.store_error) {
        (Some(id), _) => println!("  Run ID:    {id}"),
        (None, Some(error)) => println!("  Not saved: {error}"),
        (None, None) => {}
    }
    if !outcome.elapsed.is_zero() {
        println!("  Time:      {:.1}s", outcome.elapsed.as_secs_f64());
    }
    println!();
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(company: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.set_prefix(company.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Collection => "Collecting Wikipedia article",
        Stage::DataEntry => "Deriving search terms",
        Stage::DomainAssociation => "Associating domains",
        Stage::AssetVerification => "Verifying assets",
        Stage::Enumeration => "Enumerating name variants",
        Stage::SourceValidation => "Validating sources",
        Stage::HierarchyValidation => "Validating hierarchy",
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage_label(stage));
    }

    fn asset_checked(&self, domain: &str, active: bool, current: usize, total: usize) {
        let state = if active { "active" } else { "inactive" };
        self.spinner.set_message(format!(
            "Verifying assets [{current}/{total}] {domain} ({state})"
        ));
    }

    fn done(&self, _outcome: &CompanyOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Database commands
// ---------------------------------------------------------------------------

async fn cmd_init_db(db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let path = database_path(&config, db)?;
    let storage = Storage::open(&path).await?;
    println!(
        "Database ready at {} (schema v{})",
        path.display(),
        storage.schema_version().await
    );
    Ok(())
}

async fn cmd_runs(db: Option<&Path>, limit: u32) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&database_path(&config, db)?).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:>6}  {:<7}  COMPANY",
        "RUN ID", "CREATED", "SCORE", "STATUS"
    );
    for run in runs {
        let status = if run.aborted {
            "aborted"
        } else if run.passed {
            "passed"
        } else {
            "failed"
        };
        println!(
            "{:<36}  {:<20}  {:>6.1}  {:<7}  {}",
            run.id,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.overall_score,
            status,
            run.company
        );
    }
    Ok(())
}

async fn cmd_show(run_id: &str, db: Option<&Path>, json: bool) -> Result<()> {
    let id: RunId = run_id
        .parse()
        .map_err(|e| eyre!("invalid run id '{run_id}': {e}"))?;

    let config = load_config()?;
    let storage = Storage::open_readonly(&database_path(&config, db)?).await?;
    let stored = storage
        .get_run(&id)
        .await?
        .ok_or_else(|| eyre!("no run with id {id}"))?;
    let report = RunReport::from_stored(&stored);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_outcome(&CompanyOutcome {
        run_id: Some(id),
        store_error: None,
        elapsed: std::time::Duration::ZERO,
        report,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_file_flag_is_global() {
        let cli = Cli::try_parse_from(["corpscope", "runs", "--log-file", "logs/corpscope.log"])
            .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("logs/corpscope.log")));
        assert!(matches!(cli.command, Command::Runs { limit: 20, .. }));

        let cli = Cli::try_parse_from(["corpscope", "runs"]).unwrap();
        assert!(cli.log_file.is_none());
    }

    #[test]
    fn log_file_is_created_and_appended() {
        let dir = std::env::temp_dir().join(format!("corpscope_logs_{}", std::process::id()));
        let path = dir.join("nested").join("corpscope.log");

        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        std::fs::remove_dir_all(&dir).ok();
    }
}
