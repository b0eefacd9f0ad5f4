use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("song {0} already exists")]
    Duplicate(String),

    #[error("song with id {0} not found")]
    SongNotFound(String),

    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog document is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(String),

    #[error("invalid blob name {0:?}")]
    InvalidName(String),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),
}
