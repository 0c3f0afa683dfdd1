//! Shared types, error model, and configuration for Corpscope.
//!
//! This crate is the foundation depended on by all other Corpscope crates.
//! It provides:
//! - [`CorpscopeError`] and the pipeline error taxonomy
//! - Domain types ([`CompanyRecord`], [`DigitalAsset`], [`HierarchyNode`], [`ValidationResult`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - Collaborator traits ([`SourceFetcher`], [`DomainResolver`], [`AssetProbe`], [`RunStore`])

pub mod collaborators;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use collaborators::{
    AnalysisCache, AnalysisClient, AssetProbe, DomainResolver, RunStore, SourceFetcher,
};
pub use config::{
    AnalysisConfig, AnalysisProvider, AppConfig, AssetsConfig, DefaultsConfig, PipelineConfig,
    RetryConfig, WikipediaConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, validate_api_key,
};
pub use error::{
    AnalysisError, AssetCheckError, AssetCheckFailure, CorpscopeError, FetchError, Result,
    StageCause, StageError, StoreError,
};
pub use types::{
    AnalysisResult, CompanyFacts, CompanyIdentity, CompanyRecord, DigitalAsset, HierarchyNode,
    NodeKind, PASS_THRESHOLD, RawDocument, RecordSummary, Resolution, RunId, RunSummary, Stage,
    ValidationResult, ValidationStage, ValidationStatus,
};
