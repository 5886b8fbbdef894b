//! Error types for deploylog-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{DeployId, ProjectName};

/// Kind of entity a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Project,
    Deploy,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Project => f.write_str("project"),
            Entity::Deploy => f.write_str("deploy"),
        }
    }
}

/// Domain failures. Always detected before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A project with this name already exists.
    #[error("project '{0}' already exists")]
    DuplicateEntity(ProjectName),

    #[error("{entity} '{key}' not found")]
    NotFound { entity: Entity, key: String },

    /// Caller input that can never be accepted as-is.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl LedgerError {
    pub fn project_not_found(name: &ProjectName) -> Self {
        LedgerError::NotFound {
            entity: Entity::Project,
            key: name.0.clone(),
        }
    }

    pub fn deploy_not_found(project: &ProjectName, id: &DeployId) -> Self {
        LedgerError::NotFound {
            entity: Entity::Deploy,
            key: format!("{project}/{id}"),
        }
    }
}

/// All errors that can arise from reading or writing project documents.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure, with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse project document at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.into(),
        source,
    }
}
