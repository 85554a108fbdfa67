//! Shared types, error model, and configuration for projectmap.
//!
//! This crate is the foundation depended on by all other projectmap crates.
//! It provides:
//! - [`ProjectMapError`] — the unified error type
//! - Domain types ([`ProjectRef`], [`Repository`], [`PipelineDefinition`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PlatformConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, OrganizationConfig, PathsConfig, PlatformConfig, RenderConfig,
    WikiConfig, config_dir, default_config_path, init_config, load_config, load_config_from,
    resolve_pat,
};
pub use error::{ProjectMapError, Result};
pub use types::{
    PipelineDefinition, ProjectInventory, ProjectRef, QueueStatus, Repository, RunId,
};
