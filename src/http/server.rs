use log::{info, warn};
use rouille::{Request, Response, ResponseBody, input::multipart::get_multipart_input};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashMap,
    io::Read,
    sync::{Arc, Mutex},
};

use crate::{
    config::{AuthConfig, Config, HttpConfig},
    domain::song::Song,
    http::{cors::Cors, error::ApiError},
    ingest::{
        Video, VideoSearch,
        error::IngestError,
        probe::Ffprobe,
        upload::{ExternalSong, Ingest, StagedBlob, UploadForm},
        youtube::YtDlp,
    },
    storage::{
        blobs::{BlobSource, DirBlobs},
        catalog::{self, Catalog, SharedCatalog},
        error::CatalogError,
    },
    streaming::{range::ChunkPolicy, responder},
};

pub struct HttpServer {
    catalog: SharedCatalog,
    ingest: Ingest,
    search: Box<dyn VideoSearch>,
    search_limit: usize,
    chunk_policy: ChunkPolicy,
    auth: AuthConfig,
    cors: Cors,
    pub config: HttpConfig,
}

impl HttpServer {
    pub fn new(config: Config, catalog: Catalog) -> Self {
        let yt_dlp = config.ingest.yt_dlp_path.clone();

        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            ingest: Ingest::new(
                DirBlobs::new(&config.storage.songs_dir),
                DirBlobs::new(&config.storage.images_dir),
                Box::new(Ffprobe::new(config.ingest.ffprobe_path.clone())),
                Box::new(YtDlp::new(yt_dlp.clone())),
            ),
            search: Box::new(YtDlp::new(yt_dlp)),
            search_limit: config.ingest.search_limit,
            chunk_policy: config.streaming.chunk_policy(),
            auth: config.auth,
            cors: Cors::new(&config.cors),
            config: config.http,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = if request.method() == "OPTIONS" {
            self.cors.preflight(request)
        } else if let Err(e) = self.authorize(request) {
            e.into_response()
        } else {
            self.route(request)
        };
        let response = self.cors.apply(request, response);

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn route(&self, request: &Request) -> Response {
        rouille::router!(request,
            (GET) (/) => {
                Response::json(&json!({ "response": "Success" }))
            },

            (GET) (/songs) => {
                Self::into_response(self.handle_list_songs())
            },

            (GET) (/songs/{id: String}) => {
                Self::into_response(self.handle_stream_song(request, &id))
            },

            (GET) (/images/{name: String}) => {
                Self::into_response(self.handle_get_image(&name))
            },

            (POST) (/upload) => {
                Self::into_response(self.handle_upload(request))
            },

            (POST) (/img-upload) => {
                Self::into_response(self.handle_image_upload(request))
            },

            (POST) (/user-to-song) => {
                Self::into_response(self.handle_user_to_song(request))
            },

            (POST) (/yt-add) => {
                Self::into_response(self.handle_yt_add(request))
            },

            (GET) (/yt-search) => {
                Self::into_response(self.handle_yt_search(request))
            },

            _ => ApiError::NotFound("no such route".into()).into_response()
        )
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.raw_url());
    }

    fn into_response(result: Result<Response, ApiError>) -> Response {
        result.unwrap_or_else(|e| e.into_response())
    }

    /// Mutating requests must carry the shared secret when one is configured.
    fn authorize(&self, request: &Request) -> Result<(), ApiError> {
        let Some(token) = &self.auth.token else {
            return Ok(());
        };
        if request.method() != "POST" {
            return Ok(());
        }

        match request.header("authentication") {
            Some(given) if given == token => Ok(()),
            _ => {
                warn!("Rejected unauthenticated {} {}", request.method(), request.url());
                Err(ApiError::Unauthorized)
            }
        }
    }

    fn handle_list_songs(&self) -> Result<Response, ApiError> {
        let catalog = catalog::lock(&self.catalog)?;
        Ok(Response::json(&SongsResponse {
            data: catalog.list_all(),
        }))
    }

    /// Streams a song. `id` is either a catalog id or the blob's file name.
    fn handle_stream_song(&self, request: &Request, id: &str) -> Result<Response, ApiError> {
        let file = {
            let catalog = catalog::lock(&self.catalog)?;
            catalog
                .find_by_id(id)
                .map(|song| song.file.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let blobs: &dyn BlobSource = &self.ingest.songs;
        Ok(responder::respond(
            blobs,
            &file,
            request.header("Range"),
            &self.chunk_policy,
        )?)
    }

    fn handle_get_image(&self, name: &str) -> Result<Response, ApiError> {
        let blob = self.ingest.images.open(name)?;
        let size = blob.size;
        let mime = mime_guess::from_path(name).first_or_octet_stream();

        Ok(Response {
            status_code: 200,
            headers: vec![("Content-Type".into(), mime.to_string().into())],
            data: ResponseBody::from_reader_and_size(blob.into_reader()?, size as usize),
            upgrade: None,
        })
    }

    fn handle_upload(&self, request: &Request) -> Result<Response, ApiError> {
        let mut multipart = get_multipart_input(request)
            .map_err(|e| ApiError::BadRequest(format!("expected a multipart form: {e}")))?;

        let mut fields = HashMap::new();
        let mut staged: Option<StagedBlob> = None;

        let read = (|| -> Result<(), IngestError> {
            while let Some(mut field) = multipart.next() {
                let name = field.headers.name.to_string();

                if name == "file" && staged.is_none() {
                    let original = field.headers.filename.clone();
                    staged = Some(self.ingest.stage_audio(original, &mut field.data)?);
                } else {
                    let mut raw = Vec::new();
                    field.data.read_to_end(&mut raw)?;
                    let value =
                        String::from_utf8(raw).map_err(|_| IngestError::NotUtf8(name.clone()))?;
                    fields.insert(name, value);
                }
            }
            Ok(())
        })();

        let form = read.and_then(|_| UploadForm::from_fields(&fields));
        let (staged, form) = match (staged, form) {
            (Some(staged), Ok(form)) => (staged, form),
            (Some(staged), Err(e)) => {
                self.ingest.discard(staged);
                return Err(e.into());
            }
            (None, Err(e)) => return Err(e.into()),
            (None, Ok(_)) => return Err(IngestError::MissingField("file").into()),
        };

        let song = self.ingest.finish_upload(staged, form, &self.catalog)?;

        Ok(Response::json(&json!({
            "message": "File uploaded successfully!",
            "song": song,
        })))
    }

    fn handle_image_upload(&self, request: &Request) -> Result<Response, ApiError> {
        let mut multipart = get_multipart_input(request)
            .map_err(|e| ApiError::BadRequest(format!("expected a multipart form: {e}")))?;

        let mut stored = None;
        while let Some(mut field) = multipart.next() {
            if &*field.headers.name == "file" && stored.is_none() {
                let original = field.headers.filename.clone();
                stored = Some(
                    self.ingest
                        .store_image(original.as_deref(), &mut field.data)?,
                );
            }
        }

        let name = stored.ok_or(IngestError::MissingField("file"))?;
        Ok(Response::json(&json!({
            "message": "File uploaded successfully!",
            "file": name,
        })))
    }

    fn handle_user_to_song(&self, request: &Request) -> Result<Response, ApiError> {
        let body: UserToSongRequest = rouille::input::json_input(request)
            .map_err(|e| ApiError::BadRequest(format!("invalid json body: {e}")))?;

        catalog::lock(&self.catalog)?.append_user_to_song(&body.id, &body.user)?;

        Ok(Response::json(&json!({ "message": "Added successfully" })))
    }

    fn handle_yt_add(&self, request: &Request) -> Result<Response, ApiError> {
        let body: ExternalSong = rouille::input::json_input(request)
            .map_err(|e| ApiError::BadRequest(format!("invalid json body: {e}")))?;

        match self.ingest.add_external(body, &self.catalog) {
            Ok(_) => Ok(Response::json(
                &json!({ "message": "Successfully added to library" }),
            )),

            Err(IngestError::Catalog(
                CatalogError::Io(_) | CatalogError::Json(_) | CatalogError::Poisoned,
            )) => Err(ApiError::Soft("ERROR adding song - writing to db".into())),

            Err(e) => Err(e.into()),
        }
    }

    fn handle_yt_search(&self, request: &Request) -> Result<Response, ApiError> {
        let query = request
            .get_param("q")
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing search query `q`".into()))?;

        let videos = self.search.search(&query, self.search_limit)?;
        Ok(Response::json(&SearchResponse { videos }))
    }
}

#[derive(Serialize)]
struct SongsResponse<'a> {
    data: &'a [Song],
}

#[derive(Serialize, Deserialize)]
struct SearchResponse {
    videos: Vec<Video>,
}

#[derive(Deserialize)]
struct UserToSongRequest {
    id: String,
    user: String,
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
