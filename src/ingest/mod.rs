//! Getting songs into the library: uploads, external downloads and search.
//!
//! External programs (`ffprobe`, `yt-dlp`) sit behind small traits so the
//! server can be exercised without them. Calls into them block the request
//! thread until the program exits and carry no timeout.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod probe;
pub mod upload;
pub mod youtube;

use error::IngestError;

/// Measures the playing time of an audio file.
pub trait DurationProbe: Send + Sync {
    fn duration_secs(&self, path: &Path) -> Result<u64, IngestError>;
}

/// Fetches audio for an external source id and stores it at `dest`.
///
/// Returns once the file is complete or the download failed.
pub trait Downloader: Send + Sync {
    fn download_audio(&self, source_id: &str, dest: &Path) -> Result<(), IngestError>;
}

/// Searches an external catalogue for videos.
pub trait VideoSearch: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Video>, IngestError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}
