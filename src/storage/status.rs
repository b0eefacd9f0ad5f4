//! Consistency between the catalog and the songs directory.

use std::collections::HashSet;

use crate::storage::{blobs::DirBlobs, catalog::Catalog, error::BlobError};

#[derive(Debug, Default, PartialEq)]
pub struct LibraryStatus {
    pub songs: usize,
    pub blobs: usize,
    /// Songs whose file is not in the songs directory.
    pub missing_blobs: Vec<(String, String)>,
    /// Files no song points at. Left behind by failed catalog writes.
    pub orphan_blobs: Vec<String>,
}

impl LibraryStatus {
    pub fn is_consistent(&self) -> bool {
        self.missing_blobs.is_empty() && self.orphan_blobs.is_empty()
    }
}

pub fn library_status(catalog: &Catalog, songs: &DirBlobs) -> Result<LibraryStatus, BlobError> {
    // hidden files are staged uploads in flight
    let on_disk: Vec<String> = songs
        .list()?
        .into_iter()
        .filter(|name| !name.starts_with('.'))
        .collect();
    let on_disk_set: HashSet<&str> = on_disk.iter().map(String::as_str).collect();
    let referenced: HashSet<&str> = catalog.list_all().iter().map(|s| s.file.as_str()).collect();

    let missing_blobs = catalog
        .list_all()
        .iter()
        .filter(|s| !on_disk_set.contains(s.file.as_str()))
        .map(|s| (s.id.clone(), s.file.clone()))
        .collect();

    let mut orphan_blobs: Vec<String> = on_disk
        .iter()
        .filter(|name| !referenced.contains(name.as_str()))
        .cloned()
        .collect();
    orphan_blobs.sort();

    Ok(LibraryStatus {
        songs: catalog.len(),
        blobs: on_disk.len(),
        missing_blobs,
        orphan_blobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::song::Song;
    use chrono::Utc;
    use tempfile::tempdir;

    fn song(id: &str, file: &str) -> Song {
        Song {
            id: id.to_string(),
            file: file.to_string(),
            title: "T".to_string(),
            artist: "A".to_string(),
            duration: 1,
            release_year: None,
            image: None,
            timestamp: None,
            users: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reports_missing_and_orphan_blobs() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let blobs = DirBlobs::new(dir.path());
        blobs.write("kept.mp3", &b"x"[..])?;
        blobs.write("orphan.mp3", &b"x"[..])?;
        blobs.write(".upload-1-0.part", &b"x"[..])?;

        let mut catalog = Catalog::in_memory();
        catalog.append(song("a", "kept.mp3"))?;
        catalog.append(song("b", "gone.mp3"))?;

        let status = library_status(&catalog, &blobs)?;

        assert_eq!(status.songs, 2);
        assert_eq!(status.blobs, 2);
        assert_eq!(
            status.missing_blobs,
            vec![("b".to_string(), "gone.mp3".to_string())]
        );
        assert_eq!(status.orphan_blobs, vec!["orphan.mp3".to_string()]);
        assert!(!status.is_consistent());
        Ok(())
    }

    #[test]
    fn empty_library_is_consistent() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let status = library_status(
            &Catalog::in_memory(),
            &DirBlobs::new(dir.path().join("none")),
        )?;
        assert_eq!(status, LibraryStatus::default());
        assert!(status.is_consistent());
        Ok(())
    }
}
