//! DDR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DendrError>;

/// Top-level error type for dendr.
#[derive(Debug, Error)]
pub enum DendrError {
    #[error("[DDR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DDR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DDR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-2001] cannot open snapshot {location}: {source}")]
    SnapshotOpen {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[DDR-2002] malformed snapshot record at line {line}: {details}")]
    SnapshotDecode { line: u64, details: String },

    #[error("[DDR-2003] snapshot write failure for {location}: {source}")]
    SnapshotWrite {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[DDR-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DDR-3001] traversal aborted at {path}: {source}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DDR-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DDR-3003] collector sink failure: {details}")]
    Sink { details: String },

    #[error("[DDR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DendrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DDR-1001",
            Self::MissingConfig { .. } => "DDR-1002",
            Self::ConfigParse { .. } => "DDR-1003",
            Self::SnapshotOpen { .. } => "DDR-2001",
            Self::SnapshotDecode { .. } => "DDR-2002",
            Self::SnapshotWrite { .. } => "DDR-2003",
            Self::Serialization { .. } => "DDR-2101",
            Self::Sql { .. } => "DDR-2102",
            Self::Traversal { .. } => "DDR-3001",
            Self::Io { .. } => "DDR-3002",
            Self::Sink { .. } => "DDR-3003",
            Self::Runtime { .. } => "DDR-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DendrError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DendrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DendrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
