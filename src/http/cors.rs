use rouille::{Request, Response};

use crate::config::CorsConfig;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Range, Authentication";
/// Players read these to drive seeking, browsers hide them unless exposed.
const EXPOSED_HEADERS: &str = "Content-Range, Accept-Ranges, Content-Length";

/// Cross-origin policy for the browser clients of the library.
#[derive(Debug, Clone)]
pub struct Cors {
    allowed_origins: Vec<String>,
}

impl Cors {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// The request's `Origin` if it may read our responses.
    pub fn allowed_origin<'r>(&self, request: &'r Request) -> Option<&'r str> {
        let origin = request.header("Origin")?;
        self.allowed_origins
            .iter()
            .any(|o| o == "*" || o == origin)
            .then_some(origin)
    }

    pub fn apply(&self, request: &Request, response: Response) -> Response {
        match self.allowed_origin(request) {
            Some(origin) => response
                .with_additional_header("Access-Control-Allow-Origin", origin.to_string())
                .with_additional_header("Access-Control-Expose-Headers", EXPOSED_HEADERS)
                .with_additional_header("Vary", "Origin"),
            None => response,
        }
    }

    /// Answer to an `OPTIONS` preflight request.
    pub fn preflight(&self, request: &Request) -> Response {
        let response = Response::empty_204();
        match self.allowed_origin(request) {
            Some(_) => self
                .apply(request, response)
                .with_additional_header("Access-Control-Allow-Methods", ALLOWED_METHODS)
                .with_additional_header("Access-Control-Allow-Headers", ALLOWED_HEADERS),
            None => response,
        }
    }
}
