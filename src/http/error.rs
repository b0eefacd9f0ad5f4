use rouille::Response;
use serde_json::json;

use crate::{
    ingest::error::IngestError,
    storage::error::{BlobError, CatalogError},
    streaming::responder::StreamError,
};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    RangeNotSatisfiable { size: u64 },
    Unauthorized,
    Upstream(String),
    Internal(String),
    /// Reported with `200 OK` and an `error` field, the way clients expect
    /// duplicates and unknown ids to be answered.
    Soft(String),
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(name) => ApiError::NotFound(format!("file {name} not found")),
            BlobError::InvalidName(name) => {
                ApiError::BadRequest(format!("invalid file name {name:?}"))
            }
            BlobError::Fs(e) => {
                log::error!("filesystem error: {e}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Blob(e) => e.into(),
            StreamError::Range { size, .. } => ApiError::RangeNotSatisfiable { size },
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Duplicate(_) => ApiError::Soft("Error: Song already exists".into()),

            CatalogError::SongNotFound(id) => {
                ApiError::Soft(format!("Error: song with id {id} not found"))
            }

            CatalogError::Io(_) | CatalogError::Json(_) | CatalogError::Poisoned => {
                log::error!("catalog error: {err}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MissingField(_)
            | IngestError::InvalidField { .. }
            | IngestError::NotUtf8(_) => ApiError::BadRequest(err.to_string()),

            IngestError::FileTaken { .. } => {
                log::warn!("{err}");
                ApiError::Soft("Error: Song already exists".into())
            }

            IngestError::Upstream { .. } => {
                log::error!("{err}");
                ApiError::Upstream(err.to_string())
            }

            IngestError::Blob(e) => e.into(),
            IngestError::Catalog(e) => e.into(),

            IngestError::Io(e) => {
                log::error!("ingest io error: {e}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::RangeNotSatisfiable { .. } => 416,
            ApiError::Unauthorized => 401,
            ApiError::Upstream(_) | ApiError::Internal(_) => 500,
            ApiError::Soft(_) => 200,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Upstream(msg)
            | ApiError::Internal(msg)
            | ApiError::Soft(msg) => msg.clone(),
            ApiError::RangeNotSatisfiable { .. } => "range not satisfiable".into(),
            ApiError::Unauthorized => "UNAUTHORIZED".into(),
        }
    }

    pub fn into_response(self) -> Response {
        let response =
            Response::json(&json!({ "error": self.message() })).with_status_code(self.status_code());

        match self {
            ApiError::RangeNotSatisfiable { size } => {
                response.with_additional_header("Content-Range", format!("bytes */{size}"))
            }
            _ => response,
        }
    }
}
