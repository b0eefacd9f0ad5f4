//! Turning uploaded or downloaded audio into catalog entries.
//!
//! Uploads are probed and checked against the catalog while still staged, so a
//! rejected upload never replaces a file a song points at. Blobs are moved into
//! place before the catalog is written. When the catalog append fails afterwards
//! the blob stays on disk without a song pointing at it; this is logged and
//! left for the `status` command to report.

use std::{
    collections::HashMap,
    io::Read,
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;

use crate::{
    domain::{hash::ContentHash, song::Song},
    ingest::{Downloader, DurationProbe, error::IngestError},
    storage::{
        blobs::{DirBlobs, sanitize_name},
        catalog::{self, Catalog},
        error::CatalogError,
    },
};

const DEFAULT_AUDIO_EXT: &str = "mp3";

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Audio written under a temporary name while the rest of the form is read.
#[derive(Debug)]
pub struct StagedBlob {
    pub temp_name: String,
    pub original_name: Option<String>,
}

/// Text fields of an audio upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub artist: String,
    pub title: String,
    pub id: Option<String>,
    pub release_year: Option<u32>,
    pub image: Option<String>,
    pub user: Option<String>,
}

impl UploadForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, IngestError> {
        let get = |name: &str| {
            fields
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let release_year = match get("releaseYear") {
            Some(year) => Some(year.parse::<u32>().map_err(|e| IngestError::InvalidField {
                field: "releaseYear",
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            artist: get("artist").ok_or(IngestError::MissingField("artist"))?,
            title: get("title").ok_or(IngestError::MissingField("title"))?,
            id: get("id"),
            release_year,
            image: get("image"),
            user: get("user"),
        })
    }
}

/// Body of a request adding a song from an external source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSong {
    pub id: String,
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub release_year: Option<u32>,
    #[serde(default)]
    pub user: Option<String>,
}

pub struct Ingest {
    pub songs: DirBlobs,
    pub images: DirBlobs,
    probe: Box<dyn DurationProbe>,
    downloader: Box<dyn Downloader>,
}

impl Ingest {
    pub fn new(
        songs: DirBlobs,
        images: DirBlobs,
        probe: Box<dyn DurationProbe>,
        downloader: Box<dyn Downloader>,
    ) -> Self {
        Self {
            songs,
            images,
            probe,
            downloader,
        }
    }

    /// Writes uploaded audio under a hidden temporary name.
    pub fn stage_audio<R: Read>(
        &self,
        original_name: Option<String>,
        reader: R,
    ) -> Result<StagedBlob, IngestError> {
        let temp_name = format!(
            ".upload-{}-{}.part",
            std::process::id(),
            STAGE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        self.songs.write(&temp_name, reader)?;
        Ok(StagedBlob {
            temp_name,
            original_name,
        })
    }

    /// Removes a staged blob that will not be used.
    pub fn discard(&self, staged: StagedBlob) {
        let Ok(path) = self.songs.path_of(&staged.temp_name) else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            // already moved into place
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged upload {}: {e}", staged.temp_name),
        }
    }

    /// Probes staged audio, moves it to its final name and appends the song.
    /// The staged blob is removed whenever the upload is rejected before the move.
    pub fn finish_upload(
        &self,
        staged: StagedBlob,
        form: UploadForm,
        catalog: &Mutex<Catalog>,
    ) -> Result<Song, IngestError> {
        let result = self.place_upload(&staged, form, catalog);
        if result.is_err() {
            self.discard(staged);
        }
        result
    }

    fn place_upload(
        &self,
        staged: &StagedBlob,
        form: UploadForm,
        catalog: &Mutex<Catalog>,
    ) -> Result<Song, IngestError> {
        let ext = staged
            .original_name
            .as_deref()
            .and_then(audio_extension)
            .unwrap_or_else(|| DEFAULT_AUDIO_EXT.to_string());

        let file = Song::derived_file_name(&form.artist, &form.title, &ext);
        let path = self.songs.path_of(&file)?;
        let staged_path = self.songs.path_of(&staged.temp_name)?;

        let duration = self.probe.duration_secs(&staged_path)?;

        let id = match form.id {
            Some(id) => id,
            None => ContentHash::from_file(&staged_path)?.to_hex(),
        };

        // held until the song is appended so the checks below stay true
        let mut catalog = catalog::lock(catalog)?;
        if catalog.find_by_id(&id).is_some() {
            return Err(CatalogError::Duplicate(id).into());
        }
        if let Some(owner) = catalog.list_all().iter().find(|s| s.file == file) {
            return Err(IngestError::FileTaken {
                file,
                owner: owner.id.clone(),
            });
        }

        std::fs::rename(&staged_path, &path)?;
        info!("Stored upload as {file}");

        let song = Song {
            id,
            file,
            title: form.title,
            artist: form.artist,
            duration,
            release_year: form.release_year,
            image: form.image,
            timestamp: None,
            users: form.user.into_iter().collect(),
            created_at: Utc::now(),
        };

        append_song(&mut catalog, song)
    }

    /// Stores a cover image under its (sanitized) original name.
    pub fn store_image<R: Read>(
        &self,
        original_name: Option<&str>,
        reader: R,
    ) -> Result<String, IngestError> {
        let name = sanitize_name(original_name.ok_or(IngestError::MissingField("file"))?);
        self.images.write(&name, reader)?;
        info!("Stored image {name}");
        Ok(name)
    }

    /// Adds a song whose audio comes from the external downloader. The
    /// download is skipped when the blob is already present.
    pub fn add_external(
        &self,
        request: ExternalSong,
        catalog: &Mutex<Catalog>,
    ) -> Result<Song, IngestError> {
        if request.id.trim().is_empty() {
            return Err(IngestError::MissingField("id"));
        }

        if catalog::lock(catalog)?.find_by_id(&request.id).is_some() {
            return Err(CatalogError::Duplicate(request.id).into());
        }

        let file = Song::derived_file_name(&request.artist, &request.title, DEFAULT_AUDIO_EXT);
        let path = self.songs.path_of(&file)?;

        if self.songs.exists(&file) {
            info!("{file} already present, skipping download");
        } else {
            self.downloader.download_audio(&request.id, &path)?;
        }

        let song = Song {
            id: request.id,
            file,
            title: request.title,
            artist: request.artist,
            duration: request.duration,
            release_year: request.release_year,
            image: request.image,
            timestamp: request.timestamp,
            users: request.user.into_iter().collect(),
            created_at: Utc::now(),
        };

        append_song(&mut *catalog::lock(catalog)?, song)
    }
}

fn append_song(catalog: &mut Catalog, song: Song) -> Result<Song, IngestError> {
    if let Err(e) = catalog.append(song.clone()) {
        warn!("Blob {} is stored but song {} was not added: {e}", song.file, song.id);
        return Err(e.into());
    }
    info!("Added song {} ({})", song.id, song.file);
    Ok(song)
}

/// Lowercased extension of an uploaded filename, if it looks like one.
fn audio_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
}
