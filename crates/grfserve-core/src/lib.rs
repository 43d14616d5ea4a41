//! Core services for grfserve.
//!
//! This crate ties the manifest and archive layers together: `ServerConfig`
//! and `EnvSnapshot` for configuration, the `OverlayCache` write-back store,
//! the `ResourceResolver` that answers lookups overlay-first and then by
//! archive priority, the `ClientContext` built once per process, and the
//! `StartupValidator` pipeline that decides whether the service may start.

pub mod config;
pub mod context;
pub mod overlay;
pub mod prereq;
pub mod report;
pub mod resolver;
pub mod validation;

pub use config::{EnvSnapshot, ServerConfig, CONFIG_FILE, DEFAULT_PORT};
pub use context::ClientContext;
pub use overlay::OverlayCache;
pub use prereq::{check_prerequisites, default_prerequisites, format_missing, MissingPrereq, Prerequisite};
pub use report::{Messages, StatusSnapshot, Summary};
pub use resolver::{ResolvedFile, ResolvedSource, ResolverOptions, ResourceResolver};
pub use validation::{StartupValidator, ValidationDetails, ValidationResult};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] grfserve_schema::ManifestError),
    #[error("archive error: {0}")]
    Archive(#[from] grfserve_archive::ArchiveError),
    #[error("invalid path: {0}")]
    Path(#[from] grfserve_schema::PathError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),
}
