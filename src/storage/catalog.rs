//! Song catalog kept as a single JSON document.
//!
//! The whole document is loaded when the catalog is opened and rewritten after
//! every mutation. Within one process writers are serialized by whoever owns the
//! `Catalog` (the HTTP server keeps it behind a mutex). Two processes sharing
//! the same document overwrite each other: the last flush wins.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{domain::song::Song, storage::error::CatalogError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    songs: Vec<Song>,
}

pub struct Catalog {
    path: Option<PathBuf>,
    doc: CatalogDocument,
}

pub type SharedCatalog = Arc<Mutex<Catalog>>;

pub fn lock(catalog: &Mutex<Catalog>) -> Result<MutexGuard<'_, Catalog>, CatalogError> {
    catalog.lock().map_err(|_| CatalogError::Poisoned)
}

impl Catalog {
    /// Opens the document at `path`, starting from an empty catalog if it does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();

        let doc = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            info!(
                "Catalog {} does not exist, starting empty",
                path.to_string_lossy()
            );
            CatalogDocument::default()
        };

        debug!(
            "Opened catalog {} with {} songs",
            path.to_string_lossy(),
            doc.songs.len()
        );

        Ok(Self {
            path: Some(path),
            doc,
        })
    }

    /// Catalog that is never written anywhere
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: CatalogDocument::default(),
        }
    }

    pub fn list_all(&self) -> &[Song] {
        &self.doc.songs
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Song> {
        self.doc.songs.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.doc.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.songs.is_empty()
    }

    /// Appends a song, rejecting ids already present. The catalog is left
    /// untouched when the id is a duplicate.
    pub fn append(&mut self, song: Song) -> Result<(), CatalogError> {
        if self.find_by_id(&song.id).is_some() {
            return Err(CatalogError::Duplicate(song.id));
        }

        self.doc.songs.push(song);
        if let Err(e) = self.flush() {
            self.doc.songs.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Adds `user` to the song's listeners.
    pub fn append_user_to_song(&mut self, id: &str, user: &str) -> Result<(), CatalogError> {
        let song = self
            .doc
            .songs
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CatalogError::SongNotFound(id.to_string()))?;

        song.users.push(user.to_string());
        if let Err(e) = self.flush() {
            if let Some(song) = self.doc.songs.iter_mut().find(|s| s.id == id) {
                song.users.pop();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Rewrites the whole document. Writes to a sibling temp file first so a
    /// crash mid-write never leaves a truncated catalog behind.
    pub fn flush(&self) -> Result<(), CatalogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &self.doc)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        debug!(
            "Flushed catalog {} ({} songs)",
            path.to_string_lossy(),
            self.doc.songs.len()
        );
        Ok(())
    }

    /// Flushes and releases the catalog.
    pub fn close(self) -> Result<(), CatalogError> {
        self.flush()
    }
}
