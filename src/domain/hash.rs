use std::{fs::File, path::Path};

use blake3::Hash;

/// Content hash of a media blob.
///
/// Used as the song id when an upload does not carry one, so re-uploading the
/// same audio is reported as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub Hash);

impl ContentHash {
    #[cfg(test)]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(file)?;
        Ok(Self(hasher.finalize()))
    }
}
