//! Error types for the streaming core

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MaptailError>;

#[derive(Debug, Error)]
pub enum MaptailError {
    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to open geo database {path}: {source}")]
    GeoDatabase {
        path: PathBuf,
        source: maxminddb::MaxMindDbError,
    },

    #[error("Failed to read geo database {path}: {source}")]
    GeoDatabaseRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid {field}: {value} (must be at least 1)")]
    InvalidCapacity { field: &'static str, value: usize },

    #[error("Invalid base path: {path:?}")]
    InvalidBasePath { path: String },

    #[error("Invalid port: 0")]
    InvalidPort,

    #[error("Invalid listen host: {host:?}")]
    InvalidHost { host: String },
}

/// Failure of a single address lookup. Never fatal: the pipeline logs it
/// and treats the address as unresolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Geo lookup failed: {0}")]
    Lookup(String),

    #[error("Geo resolver unavailable: {0}")]
    Unavailable(String),
}

impl From<maxminddb::MaxMindDbError> for ResolveError {
    fn from(err: maxminddb::MaxMindDbError) -> Self {
        ResolveError::Lookup(err.to_string())
    }
}
