use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::streaming::range::ChunkPolicy;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub songs_dir: PathBuf,
    pub images_dir: PathBuf,
    pub catalog_path: PathBuf,
}

/// Byte budgets used when answering `Range` requests on the song stream.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamingConfig {
    #[serde(default = "default_seek_chunk")]
    pub seek_chunk: u64,
    #[serde(default = "default_initial_chunk")]
    pub initial_chunk: u64,
}

fn default_seek_chunk() -> u64 {
    ChunkPolicy::DEFAULT_SEEK_CHUNK
}

fn default_initial_chunk() -> u64 {
    ChunkPolicy::DEFAULT_INITIAL_CHUNK
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            seek_chunk: default_seek_chunk(),
            initial_chunk: default_initial_chunk(),
        }
    }
}

impl StreamingConfig {
    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy {
            seek_chunk: self.seek_chunk,
            initial_chunk: self.initial_chunk,
        }
    }
}

/// Shared secret expected in the `authentication` header of mutating requests.
/// No token means the check is disabled.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
        "https://muzikk.vercel.app".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    #[serde(default = "default_yt_dlp_path")]
    pub yt_dlp_path: PathBuf,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_yt_dlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_search_limit() -> usize {
    6
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe_path(),
            yt_dlp_path: default_yt_dlp_path(),
            search_limit: default_search_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_minimal_config_uses_defaults() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[http]
bind_addr = "127.0.0.1"
port = 3000

[storage]
songs_dir = "public/songs"
images_dir = "public/images"
catalog_path = "db.json"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.http.port, 3000);
        assert_eq!(cfg.storage.songs_dir, PathBuf::from("public/songs"));

        // Defaults
        assert_eq!(cfg.streaming.seek_chunk, 10_000);
        assert_eq!(cfg.streaming.initial_chunk, 3_000_000);
        assert!(cfg.auth.token.is_none());
        assert_eq!(cfg.cors.allowed_origins.len(), 3);
        assert_eq!(cfg.ingest.search_limit, 6);
        assert_eq!(cfg.ingest.yt_dlp_path, PathBuf::from("yt-dlp"));

        Ok(())
    }

    #[test]
    fn test_parse_full_config() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[http]
bind_addr = "0.0.0.0"
port = 8080

[storage]
songs_dir = "/srv/muzikk/songs"
images_dir = "/srv/muzikk/images"
catalog_path = "/srv/muzikk/db.json"

[streaming]
seek_chunk = 65536
initial_chunk = 1048576

[auth]
token = "hunter2"

[cors]
allowed_origins = ["https://example.org"]

[ingest]
ffprobe_path = "/usr/local/bin/ffprobe"
search_limit = 3
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        let policy = cfg.streaming.chunk_policy();
        assert_eq!(policy.seek_chunk, 65536);
        assert_eq!(policy.initial_chunk, 1048576);

        assert_eq!(cfg.auth.token.as_deref(), Some("hunter2"));
        assert_eq!(cfg.cors.allowed_origins, vec!["https://example.org"]);
        assert_eq!(
            cfg.ingest.ffprobe_path,
            PathBuf::from("/usr/local/bin/ffprobe")
        );
        assert_eq!(cfg.ingest.search_limit, 3);
        // Not set, falls back to default
        assert_eq!(cfg.ingest.yt_dlp_path, PathBuf::from("yt-dlp"));

        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = Config::load(Path::new("/definitely/not/here/config.toml"));
        assert!(result.is_err());
    }
}
