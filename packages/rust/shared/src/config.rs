//! Application configuration for Corpscope.
//!
//! User config lives at `~/.corpscope/corpscope.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CorpscopeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "corpscope.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".corpscope";

// ---------------------------------------------------------------------------
// Config structs (matching corpscope.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Wikipedia source settings.
    #[serde(default)]
    pub wikipedia: WikipediaConfig,

    /// Domain association and verification settings.
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Retry policy for collaborator calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// LLM analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Company processed when `run` gets no `--company`.
    #[serde(default = "default_target_company")]
    pub target_company: String,

    /// Extra search terms added to every run.
    #[serde(default)]
    pub search_terms: Vec<String>,

    /// SQLite database location.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            target_company: default_target_company(),
            search_terms: Vec::new(),
            database_path: default_database_path(),
        }
    }
}

fn default_target_company() -> String {
    "Alphabet Inc.".into()
}
fn default_database_path() -> String {
    "~/.corpscope/corpscope.db".into()
}

/// `[wikipedia]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikipediaConfig {
    #[serde(default = "default_wikipedia_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_wikipedia_timeout")]
    pub timeout_secs: u64,

    /// Pause between consecutive company fetches.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            base_url: default_wikipedia_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_wikipedia_timeout(),
            request_delay_ms: default_request_delay(),
        }
    }
}

fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org".into()
}
fn default_user_agent() -> String {
    concat!("corpscope/", env!("CARGO_PKG_VERSION"), " (company profile research)").into()
}
fn default_wikipedia_timeout() -> u64 {
    30
}
fn default_request_delay() -> u64 {
    1000
}

/// `[assets]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// TLDs tried for each search-term slug.
    #[serde(default = "default_tlds")]
    pub tlds: Vec<String>,

    /// Maximum concurrent asset checks.
    #[serde(default = "default_asset_concurrency")]
    pub concurrency: usize,

    /// Per-check timeout.
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,

    /// Base URL of the IP-to-ASN service.
    #[serde(default = "default_asn_lookup_url")]
    pub asn_lookup_url: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            tlds: default_tlds(),
            concurrency: default_asset_concurrency(),
            check_timeout_secs: default_check_timeout(),
            asn_lookup_url: default_asn_lookup_url(),
        }
    }
}

fn default_tlds() -> Vec<String> {
    ["com", "org", "net", "io", "co"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_asset_concurrency() -> usize {
    8
}
fn default_check_timeout() -> u64 {
    10
}
fn default_asn_lookup_url() -> String {
    "https://ipinfo.io".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per collaborator call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts.
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    500
}

/// Which LLM backend (if any) produces the analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisProvider {
    #[default]
    None,
    OpenAi,
    Gemini,
}

impl AnalysisProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for AnalysisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisProvider {
    type Err = CorpscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(CorpscopeError::config(format!(
                "unknown analysis provider '{other}' (expected none, openai or gemini)"
            ))),
        }
    }
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub provider: AnalysisProvider,

    /// Name of the env var holding the OpenAI key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub openai_api_key_env: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_openai_url")]
    pub openai_base_url: String,

    /// Name of the env var holding the Gemini key.
    #[serde(default = "default_gemini_key_env")]
    pub gemini_api_key_env: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_gemini_url")]
    pub gemini_base_url: String,

    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: AnalysisProvider::None,
            openai_api_key_env: default_openai_key_env(),
            openai_model: default_openai_model(),
            openai_base_url: default_openai_url(),
            gemini_api_key_env: default_gemini_key_env(),
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_url(),
            timeout_secs: default_analysis_timeout(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_gemini_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_analysis_timeout() -> u64 {
    60
}

impl AnalysisConfig {
    /// Env var holding the key for the selected provider.
    pub fn api_key_env(&self) -> Option<&str> {
        match self.provider {
            AnalysisProvider::None => None,
            AnalysisProvider::OpenAi => Some(&self.openai_api_key_env),
            AnalysisProvider::Gemini => Some(&self.gemini_api_key_env),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, handed to the runner at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Extra search terms merged into data entry.
    pub seed_terms: Vec<String>,
    /// TLDs tried per search-term slug.
    pub tlds: Vec<String>,
    /// Maximum concurrent asset checks.
    pub concurrency: usize,
    /// Timeout applied to every single asset check.
    pub check_timeout: Duration,
    /// Attempts per collaborator call.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            seed_terms: config.defaults.search_terms.clone(),
            tlds: config.assets.tlds.clone(),
            concurrency: config.assets.concurrency.max(1),
            check_timeout: Duration::from_secs(config.assets.check_timeout_secs.max(1)),
            max_attempts: config.retry.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry.delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.corpscope/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CorpscopeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.corpscope/corpscope.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CorpscopeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CorpscopeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CorpscopeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CorpscopeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CorpscopeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CorpscopeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the API key for the selected analysis provider from its env var.
pub fn validate_api_key(config: &AnalysisConfig) -> Result<String> {
    let Some(var_name) = config.api_key_env() else {
        return Err(CorpscopeError::config("no analysis provider selected"));
    };
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(CorpscopeError::config(format!(
            "{} API key not found. Set the {var_name} environment variable.",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("provider = \"none\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.assets.tlds, vec!["com", "org", "net", "io", "co"]);
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.analysis.gemini_api_key_env, "GOOGLE_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
target_company = "Alphabet Inc."
search_terms = ["Google"]

[assets]
tlds = ["com"]

[analysis]
provider = "gemini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.search_terms, vec!["Google"]);
        assert_eq!(config.assets.tlds, vec!["com"]);
        assert_eq!(config.assets.concurrency, 8);
        assert_eq!(config.analysis.provider, AnalysisProvider::Gemini);
        assert_eq!(config.analysis.api_key_env(), Some("GOOGLE_API_KEY"));
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let mut app = AppConfig::default();
        app.assets.concurrency = 0;
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.concurrency, 1);
        assert_eq!(pipeline.check_timeout, Duration::from_secs(10));
        assert_eq!(pipeline.max_attempts, 3);
        assert_eq!(pipeline.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("OpenAI".parse::<AnalysisProvider>().unwrap(), AnalysisProvider::OpenAi);
        assert_eq!("none".parse::<AnalysisProvider>().unwrap(), AnalysisProvider::None);
        assert!("claude".parse::<AnalysisProvider>().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AnalysisConfig {
            provider: AnalysisProvider::OpenAi,
            ..Default::default()
        };
        // Use a unique env var name to avoid interfering with other tests
        config.openai_api_key_env = "CORPSCOPE_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));

        config.provider = AnalysisProvider::None;
        assert!(validate_api_key(&config).is_err());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
        assert!(expand_home("~/x.db").unwrap().ends_with("x.db"));
    }
}
