//! Translates a `Range` request header into the byte window served for a song.
//!
//! Only the start offset of the first byte-range-spec is honoured. The end of
//! the window is chosen by the [`ChunkPolicy`]: a fresh playback start
//! (`bytes=0-` exactly) gets a large budget so most of the file arrives in one
//! response, any other request gets a small one so seeking stays responsive.

use thiserror::Error;

/// Header value browsers send when playback starts from the beginning.
pub const INITIAL_PLAYBACK_RANGE: &str = "bytes=0-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub seek_chunk: u64,
    pub initial_chunk: u64,
}

impl ChunkPolicy {
    pub const DEFAULT_SEEK_CHUNK: u64 = 10_000;
    pub const DEFAULT_INITIAL_CHUNK: u64 = 3_000_000;

    /// Budget for a request carrying the given raw header value.
    pub fn budget_for(&self, header: &str) -> u64 {
        if header == INITIAL_PLAYBACK_RANGE {
            self.initial_chunk
        } else {
            self.seek_chunk
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            seek_chunk: Self::DEFAULT_SEEK_CHUNK,
            initial_chunk: Self::DEFAULT_INITIAL_CHUNK,
        }
    }
}

/// Half-open byte span `[start, end)` of a blob.
///
/// Always satisfies `start <= end <= size` for the size it was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: u64,
    pub end: u64,
}

impl RangeWindow {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Value of the `Content-Range` header for this window.
    ///
    /// `end` is written as the exclusive offset; players in the field rely on
    /// exactly this framing.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No `Range` header, the whole blob is served with `200 OK`.
    FullFile,
    /// Partial content, served with `206`.
    Window(RangeWindow),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header: {0:?}")]
    Malformed(String),
}

/// Resolves the window to serve for `header` against a blob of `size` bytes.
///
/// A header that does not carry a numeric start offset (`bytes=abc-`, `bytes=-500`,
/// `items=0-`) is rejected so the caller can answer `416`.
pub fn resolve(
    header: Option<&str>,
    size: u64,
    policy: &ChunkPolicy,
) -> Result<Resolution, RangeError> {
    let Some(header) = header else {
        return Ok(Resolution::FullFile);
    };

    let start = parse_start(header)?;
    let budget = policy.budget_for(header);

    // start past the end yields an empty window at the end of the blob
    let start = start.min(size);
    let end = start.saturating_add(budget).min(size);

    Ok(Resolution::Window(RangeWindow { start, end }))
}

fn parse_start(header: &str) -> Result<u64, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());

    let (unit, specs) = header.trim().split_once('=').ok_or_else(malformed)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(malformed());
    }

    let first = specs.split(',').next().ok_or_else(malformed)?;
    let (start, _) = first.split_once('-').ok_or_else(malformed)?;
    let start = start.trim();

    if start.is_empty() || !start.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    start.parse::<u64>().map_err(|_| malformed())
}
