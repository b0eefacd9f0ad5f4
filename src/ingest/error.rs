use thiserror::Error;

use crate::storage::error::{BlobError, CatalogError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("form field `{0}` is not valid UTF-8")]
    NotUtf8(String),

    #[error("file {file} already belongs to song {owner}")]
    FileTaken { file: String, owner: String },

    #[error("{program} failed: {reason}")]
    Upstream { program: String, reason: String },

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn upstream(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Upstream {
            program: program.into(),
            reason: reason.into(),
        }
    }
}
