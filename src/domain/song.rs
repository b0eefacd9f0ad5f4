use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A song in the catalog.
///
/// Serialized with the camelCase field names of the catalog document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    /// Blob name under the songs directory
    pub file: String,
    pub title: String,
    pub artist: String,
    /// Seconds
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Opaque client value, kept as sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub users: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Song {
    /// Blob name derived from artist and title, e.g. `"Daft Punk - Veridis Quo.mp3"`.
    pub fn derived_file_name(artist: &str, title: &str, ext: &str) -> String {
        format!("{} - {}.{}", artist.trim(), title.trim(), ext)
    }

    pub fn has_user(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }
}
