//! Media blobs: plain files addressed by their literal filename inside one directory.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::storage::error::BlobError;

/// Read access to blobs by name.
pub trait BlobSource: Send + Sync {
    fn open(&self, name: &str) -> Result<OpenBlob, BlobError>;
}

pub trait BlobReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> BlobReader for T {}

/// An opened blob. `size` is taken from the opened handle, so it always
/// describes the bytes the reader yields.
pub struct OpenBlob {
    pub size: u64,
    reader: Box<dyn BlobReader>,
}

impl OpenBlob {
    pub fn new<R: BlobReader + 'static>(size: u64, reader: R) -> Self {
        Self {
            size,
            reader: Box::new(reader),
        }
    }

    /// Reader positioned at `start` yielding at most `len` bytes.
    pub fn window(mut self, start: u64, len: u64) -> Result<Box<dyn Read + Send>, BlobError> {
        if start > 0 {
            self.reader.seek(SeekFrom::Start(start))?;
        }
        Ok(Box::new(self.reader.take(len)))
    }

    pub fn into_reader(self) -> Result<Box<dyn Read + Send>, BlobError> {
        let size = self.size;
        self.window(0, size)
    }
}

/// Blobs stored as files directly under `root`.
#[derive(Debug, Clone)]
pub struct DirBlobs {
    root: PathBuf,
}

impl DirBlobs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a blob, rejecting names that would escape the directory.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, BlobError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Writes the whole reader into a blob, replacing any previous content.
    pub fn write<R: Read>(&self, name: &str, mut reader: R) -> Result<u64, BlobError> {
        let path = self.path_of(name)?;
        std::fs::create_dir_all(&self.root)?;
        let mut file = File::create(&path)?;
        Ok(io::copy(&mut reader, &mut file)?)
    }

    /// Names of all files directly inside the directory.
    pub fn list(&self) -> Result<Vec<String>, BlobError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) if e.file_type().is_file() => Some(Ok(e)),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })
            .map(|e| {
                let e = e.map_err(|err| BlobError::Fs(err.into()))?;
                Ok(e.file_name().to_string_lossy().into_owned())
            })
            .collect()
    }
}

impl BlobSource for DirBlobs {
    fn open(&self, name: &str) -> Result<OpenBlob, BlobError> {
        let path = self.path_of(name)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                BlobError::NotFound(name.to_string())
            }
            _ => BlobError::Fs(e),
        })?;

        // directories open fine on unix but are not blobs
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(BlobError::NotFound(name.to_string()));
        }

        Ok(OpenBlob::new(meta.len(), file))
    }
}

/// A blob name is a single path component.
pub fn validate_name(name: &str) -> Result<(), BlobError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if invalid {
        Err(BlobError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Makes an uploaded filename usable as a blob name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect::<String>();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_all(mut reader: Box<dyn Read + Send>) -> anyhow::Result<String> {
        let mut buf = String::new();
        reader.read_to_string(&mut buf)?;
        Ok(buf)
    }

    #[test]
    fn size_and_window_read() -> anyhow::Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("song.mp3"), b"0123456789")?;
        let blobs = DirBlobs::new(dir.path());

        assert_eq!(blobs.open("song.mp3")?.size, 10);
        assert_eq!(read_all(blobs.open("song.mp3")?.window(3, 4)?)?, "3456");

        // len past the end stops at the end of file
        assert_eq!(read_all(blobs.open("song.mp3")?.window(8, 100)?)?, "89");
        assert_eq!(read_all(blobs.open("song.mp3")?.into_reader()?)?, "0123456789");

        Ok(())
    }

    #[test]
    fn size_describes_the_opened_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"0123456789")?;
        let blobs = DirBlobs::new(dir.path());

        let blob = blobs.open("song.mp3")?;

        // replaced on disk after opening
        let replacement = dir.path().join("new.part");
        std::fs::write(&replacement, b"abc")?;
        std::fs::rename(&replacement, &path)?;

        assert_eq!(blob.size, 10);
        assert_eq!(read_all(blob.into_reader()?)?, "0123456789");
        assert_eq!(blobs.open("song.mp3")?.size, 3);
        Ok(())
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let blobs = DirBlobs::new(dir.path());

        assert!(matches!(blobs.open("nope.mp3"), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn directory_is_not_a_blob() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let blobs = DirBlobs::new(dir.path());

        assert!(matches!(blobs.open("sub"), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn names_escaping_the_directory_are_rejected() {
        let blobs = DirBlobs::new("/srv/songs");
        for name in ["", ".", "..", "../etc/passwd", "a/b.mp3", "a\\b.mp3"] {
            assert!(
                matches!(blobs.path_of(name), Err(BlobError::InvalidName(_))),
                "{name:?}"
            );
        }
        assert_eq!(
            blobs.path_of("Artist - Title.mp3").unwrap(),
            PathBuf::from("/srv/songs/Artist - Title.mp3")
        );
    }

    #[test]
    fn write_creates_directory_and_list_sees_it() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let blobs = DirBlobs::new(dir.path().join("images"));

        assert!(blobs.list()?.is_empty());

        let written = blobs.write("cover.jpg", &b"jpeg"[..])?;
        assert_eq!(written, 4);
        assert!(blobs.exists("cover.jpg"));
        assert_eq!(blobs.list()?, vec!["cover.jpg".to_string()]);

        Ok(())
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_name("../../x.png"), "_.._x.png");
        assert_eq!(sanitize_name("cover.png"), "cover.png");
        assert_eq!(sanitize_name("  "), "upload");
        assert_eq!(sanitize_name(".hidden"), "hidden");
    }
}
