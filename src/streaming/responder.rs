//! Builds the HTTP response carrying song audio.
//!
//! The body is handed to the server as a reader limited to the served window.
//! The server copies it to the socket in small buffers, blocking on the socket
//! between reads, so neither a large file nor a slow client makes us hold more
//! than one buffer of audio in memory. When the client goes away the server
//! drops the body, which closes the file.

use std::borrow::Cow;

use log::debug;
use rouille::{Response, ResponseBody};
use thiserror::Error;

use crate::{
    storage::{blobs::BlobSource, error::BlobError},
    streaming::range::{self, ChunkPolicy, RangeError, Resolution},
};

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("{source} for blob of {size} bytes")]
    Range { source: RangeError, size: u64 },
}

/// Answers a stream request for blob `name`, honouring the raw `Range` header if given.
pub fn respond(
    blobs: &dyn BlobSource,
    name: &str,
    range_header: Option<&str>,
    policy: &ChunkPolicy,
) -> Result<Response, StreamError> {
    let blob = blobs.open(name)?;
    let size = blob.size;

    let resolution = range::resolve(range_header, size, policy)
        .map_err(|source| StreamError::Range { source, size })?;

    match resolution {
        Resolution::FullFile => {
            let body = blob.into_reader()?;
            debug!("STREAM {name} -> 200 OK, {size} bytes");

            Ok(audio_response(
                200,
                vec![(
                    "Content-Length".into(),
                    Cow::Owned(size.to_string()),
                )],
                body,
                size,
            ))
        }

        Resolution::Window(window) => {
            let body = blob.window(window.start, window.len())?;
            if window.is_empty() {
                debug!("STREAM {name}: range starts at or past the end of {size} bytes");
            }
            debug!(
                "STREAM {name} -> 206 Partial Content, {}",
                window.content_range(size)
            );

            Ok(audio_response(
                206,
                vec![
                    ("Content-Range".into(), window.content_range(size).into()),
                    ("Accept-Ranges".into(), "bytes".into()),
                    ("Content-Length".into(), window.len().to_string().into()),
                ],
                body,
                window.len(),
            ))
        }
    }
}

fn audio_response(
    status_code: u16,
    mut headers: Vec<(Cow<'static, str>, Cow<'static, str>)>,
    body: Box<dyn std::io::Read + Send>,
    len: u64,
) -> Response {
    headers.push(("Content-Type".into(), AUDIO_CONTENT_TYPE.into()));

    Response {
        status_code,
        headers,
        data: ResponseBody::from_reader_and_size(body, len as usize),
        upgrade: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blobs::{DirBlobs, OpenBlob};
    use std::{
        io::{Read, Seek, SeekFrom},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tempfile::tempdir;

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    fn body(response: Response) -> Vec<u8> {
        let mut buf = Vec::new();
        response
            .data
            .into_reader_and_size()
            .0
            .read_to_end(&mut buf)
            .unwrap();
        buf
    }

    fn blobs_with(content: &[u8]) -> (tempfile::TempDir, DirBlobs) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("song.mp3"), content).unwrap();
        let blobs = DirBlobs::new(dir.path());
        (dir, blobs)
    }

    #[test]
    fn full_file_without_range() {
        let content: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let (_dir, blobs) = blobs_with(&content);

        let response = respond(&blobs, "song.mp3", None, &ChunkPolicy::default()).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Content-Length"), Some("5000"));
        assert_eq!(header(&response, "Content-Type"), Some("audio/mpeg"));
        assert_eq!(header(&response, "Content-Range"), None);
        assert_eq!(body(response), content);
    }

    #[test]
    fn empty_file_without_range() {
        let (_dir, blobs) = blobs_with(b"");

        let response = respond(&blobs, "song.mp3", None, &ChunkPolicy::default()).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Content-Length"), Some("0"));
        assert!(body(response).is_empty());
    }

    #[test]
    fn seek_range_serves_only_the_window() {
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (_dir, blobs) = blobs_with(&content);
        let policy = ChunkPolicy {
            seek_chunk: 100,
            initial_chunk: 10_000,
        };

        let response = respond(&blobs, "song.mp3", Some("bytes=250-"), &policy).unwrap();

        assert_eq!(response.status_code, 206);
        assert_eq!(
            header(&response, "Content-Range"),
            Some("bytes 250-350/1000")
        );
        assert_eq!(header(&response, "Accept-Ranges"), Some("bytes"));
        assert_eq!(header(&response, "Content-Length"), Some("100"));
        assert_eq!(header(&response, "Content-Type"), Some("audio/mpeg"));
        assert_eq!(body(response), &content[250..350]);
    }

    #[test]
    fn initial_range_on_small_file_serves_everything() {
        let content = vec![7u8; 1_000_000];
        let (_dir, blobs) = blobs_with(&content);

        let response =
            respond(&blobs, "song.mp3", Some("bytes=0-"), &ChunkPolicy::default()).unwrap();

        assert_eq!(response.status_code, 206);
        assert_eq!(
            header(&response, "Content-Range"),
            Some("bytes 0-1000000/1000000")
        );
        assert_eq!(header(&response, "Content-Length"), Some("1000000"));
        assert_eq!(body(response).len(), 1_000_000);
    }

    #[test]
    fn seek_on_large_file_uses_small_chunk() {
        let content = vec![1u8; 1_000_000];
        let (_dir, blobs) = blobs_with(&content);

        let response = respond(
            &blobs,
            "song.mp3",
            Some("bytes=500000-"),
            &ChunkPolicy::default(),
        )
        .unwrap();

        assert_eq!(response.status_code, 206);
        assert_eq!(
            header(&response, "Content-Range"),
            Some("bytes 500000-510000/1000000")
        );
        assert_eq!(header(&response, "Content-Length"), Some("10000"));
        assert_eq!(body(response).len(), 10_000);
    }

    #[test]
    fn range_at_end_of_file_is_empty_206() {
        let (_dir, blobs) = blobs_with(b"0123456789");

        let response =
            respond(&blobs, "song.mp3", Some("bytes=10-"), &ChunkPolicy::default()).unwrap();

        assert_eq!(response.status_code, 206);
        assert_eq!(header(&response, "Content-Range"), Some("bytes 10-10/10"));
        assert_eq!(header(&response, "Content-Length"), Some("0"));
        assert!(body(response).is_empty());
    }

    #[test]
    fn malformed_range_is_an_error() {
        let (_dir, blobs) = blobs_with(b"0123456789");

        let result = respond(
            &blobs,
            "song.mp3",
            Some("bytes=abc-"),
            &ChunkPolicy::default(),
        );

        assert!(matches!(result, Err(StreamError::Range { size: 10, .. })));
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let blobs = DirBlobs::new(dir.path());

        let result = respond(&blobs, "missing.mp3", None, &ChunkPolicy::default());

        assert!(matches!(
            result,
            Err(StreamError::Blob(BlobError::NotFound(_)))
        ));
    }

    /// Blob source counting readers that are still alive.
    struct TrackedBlobs {
        content: Vec<u8>,
        open: Arc<AtomicUsize>,
    }

    struct TrackedReader {
        inner: std::io::Cursor<Vec<u8>>,
        open: Arc<AtomicUsize>,
    }

    impl Read for TrackedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for TrackedReader {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl BlobSource for TrackedBlobs {
        fn open(&self, _name: &str) -> Result<OpenBlob, BlobError> {
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(OpenBlob::new(
                self.content.len() as u64,
                TrackedReader {
                    inner: std::io::Cursor::new(self.content.clone()),
                    open: Arc::clone(&self.open),
                },
            ))
        }
    }

    #[test]
    fn aborted_stream_releases_reader() {
        let open = Arc::new(AtomicUsize::new(0));
        let blobs = TrackedBlobs {
            content: vec![9u8; 50_000],
            open: Arc::clone(&open),
        };
        let policy = ChunkPolicy::default();

        let response = respond(&blobs, "song.mp3", Some("bytes=100-"), &policy).unwrap();
        assert_eq!(open.load(Ordering::SeqCst), 1);

        // client reads a bit then disconnects; the server drops the body
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut partial = [0u8; 512];
        reader.read_exact(&mut partial).unwrap();
        drop(reader);
        assert_eq!(open.load(Ordering::SeqCst), 0);

        // the next request is unaffected
        let response = respond(&blobs, "song.mp3", Some("bytes=100-"), &policy).unwrap();
        assert_eq!(response.status_code, 206);
        assert_eq!(body(response).len(), 10_000);
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }
}
