use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{info, warn};
use serde::Deserialize;

use crate::ingest::{Downloader, Video, VideoSearch, error::IngestError};

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Downloads and searches YouTube through the `yt-dlp` program.
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Downloader for YtDlp {
    fn download_audio(&self, source_id: &str, dest: &Path) -> Result<(), IngestError> {
        // yt-dlp picks the extension itself, hand it the name without one
        let template = format!("{}.%(ext)s", dest.with_extension("").to_string_lossy());
        let url = watch_url(source_id);

        info!("Downloading {url} -> {}", dest.to_string_lossy());

        let output = Command::new(&self.program)
            .args([
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--no-warnings",
                "-x",
                "--audio-format",
                "mp3",
                "-o",
                template.as_str(),
                "--",
                url.as_str(),
            ])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| IngestError::upstream(self.name(), format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} exited with {}: {}", self.name(), output.status, stderr.trim());
            return Err(IngestError::upstream(self.name(), stderr.trim()));
        }

        if !dest.is_file() {
            return Err(IngestError::upstream(
                self.name(),
                format!("finished but {} was not written", dest.to_string_lossy()),
            ));
        }

        Ok(())
    }
}

impl VideoSearch for YtDlp {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Video>, IngestError> {
        let output = Command::new(&self.program)
            .args(["--dump-json", "--flat-playlist", "--no-warnings"])
            .arg(format!("ytsearch{limit}:{query}"))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| IngestError::upstream(self.name(), format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::upstream(self.name(), stderr.trim()));
        }

        let mut videos = parse_search_output(&String::from_utf8_lossy(&output.stdout));
        videos.truncate(limit);
        Ok(videos)
    }
}

/// One line of `yt-dlp --dump-json --flat-playlist`.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    channel: Option<String>,
    uploader: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Parses newline separated JSON entries, skipping lines that do not parse.
pub fn parse_search_output(stdout: &str) -> Vec<Video> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unparsable search entry: {e}");
                None
            }
        })
        .map(|entry| Video {
            url: entry.url.unwrap_or_else(|| watch_url(&entry.id)),
            title: entry.title.unwrap_or_default(),
            duration: entry
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| d.round() as u64),
            author: entry.channel.or(entry.uploader),
            thumbnail: entry.thumbnails.into_iter().last().map(|t| t.url),
            id: entry.id,
        })
        .collect()
}
