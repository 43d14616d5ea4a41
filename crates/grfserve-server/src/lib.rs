//! HTTP front end for grfserve.
//!
//! Serves the virtual client namespace under `/client/`: file lookups go
//! through the [`ResourceResolver`](grfserve_core::ResourceResolver) (overlay
//! first, then archives by priority), plus listing, regex search, the web
//! client's `index.html`, and `/health` with the startup validation snapshot.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

pub mod content_type;

use grfserve_core::{ClientContext, CoreError, StatusSnapshot};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info};

pub const NOT_FOUND: &str = "File not found";
pub const SEARCH_REJECTED: &str = "Search feature is disabled or invalid filter";

/// Shared, read-only state for request handlers.
pub struct AppState {
    context: ClientContext,
    status: StatusSnapshot,
}

impl AppState {
    pub fn new(context: ClientContext, status: StatusSnapshot) -> Self {
        Self { context, status }
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }

    fn allowed_origin(&self) -> &str {
        self.context.config().public_url.as_deref().unwrap_or("*")
    }
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("valid header")
}

fn cors_headers(state: &AppState) -> [Header; 3] {
    [
        header("Access-Control-Allow-Origin", state.allowed_origin()),
        header("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
        header("Access-Control-Allow-Headers", "Content-Type"),
    ]
}

fn respond<R: std::io::Read>(state: &AppState, req: Request, mut resp: Response<R>) {
    for h in cors_headers(state) {
        resp.add_header(h);
    }
    let _ = req.respond(resp);
}

fn respond_err(state: &AppState, req: Request, code: u16, msg: &str) {
    respond(
        state,
        req,
        Response::from_string(msg).with_status_code(StatusCode(code)),
    );
}

fn respond_json(state: &AppState, req: Request, json: impl Into<Vec<u8>>) {
    let resp = Response::from_data(json.into()).with_header(header("Content-Type", "application/json"));
    respond(state, req, resp);
}

fn respond_file(state: &AppState, req: Request, data: Vec<u8>, content_type: &str) {
    let resp = Response::from_data(data).with_header(header("Content-Type", content_type));
    respond(state, req, resp);
}

fn read_body(req: &mut Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn request_content_type(req: &Request) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_ascii_lowercase())
}

#[derive(Deserialize)]
struct SearchBody {
    filter: Option<String>,
}

fn decode_form_value(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Extract `filter` from a JSON or url-encoded body.
pub fn parse_search_filter(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    let is_json = content_type.is_some_and(|c| c.starts_with("application/json"));
    let filter = if is_json {
        serde_json::from_slice::<SearchBody>(body).ok()?.filter
    } else {
        let text = std::str::from_utf8(body).ok()?;
        text.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "filter")
            .map(|(_, v)| decode_form_value(v))
    };
    filter.filter(|f| !f.is_empty())
}

/// Strip the query string and percent-decode a request path.
pub fn decode_request_path(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}

fn serve_index(state: &AppState, req: Request) {
    let index = state.context.config().root.join("index.html");
    match std::fs::read(&index) {
        Ok(data) => respond_file(state, req, data, &content_type::for_extension(Some("html"))),
        Err(e) => {
            debug!("{}: {e}", index.display());
            respond_err(state, req, 404, NOT_FOUND);
        }
    }
}

fn serve_file(state: &AppState, req: Request, raw: &str) {
    match state.context.resolver().resolve(raw) {
        Ok(Some(file)) => {
            let ct = content_type::for_extension(file.path.extension().as_deref());
            respond_file(state, req, file.bytes, &ct);
        }
        Ok(None) => respond_err(state, req, 404, NOT_FOUND),
        Err(CoreError::Path(e)) => {
            debug!("rejected path '{raw}': {e}");
            respond_err(state, req, 404, NOT_FOUND);
        }
        Err(e) => {
            error!("{raw}: {e}");
            respond_err(state, req, 500, "Internal server error");
        }
    }
}

fn handle_search(state: &AppState, mut req: Request) {
    let Some(body) = read_body(&mut req) else {
        respond_err(state, req, 400, "read error");
        return;
    };
    let ct = request_content_type(&req);
    let filter = parse_search_filter(ct.as_deref(), &body);

    let Some(filter) = filter.filter(|_| state.context.config().enable_search) else {
        respond_err(state, req, 400, SEARCH_REJECTED);
        return;
    };
    match state.context.resolver().search(&filter) {
        Ok(hits) => {
            let resp = Response::from_string(hits.join("\n"))
                .with_header(header("Content-Type", "text/plain; charset=utf-8"));
            respond(state, req, resp);
        }
        Err(e) => {
            debug!("search '{filter}': {e}");
            respond_err(state, req, 400, SEARCH_REJECTED);
        }
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(state: &AppState, req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    if state.context.config().debug {
        debug!("Request: {method} {url}");
    }

    if method == Method::Options {
        respond(state, req, Response::empty(204));
        return;
    }

    let Some(path) = decode_request_path(&url) else {
        respond_err(state, req, 400, "Bad request");
        return;
    };

    match (&method, path.as_str()) {
        (Method::Get, "/health") => {
            let json = serde_json::to_vec(&state.status).unwrap_or_else(|_| b"{}".to_vec());
            respond_json(state, req, json);
        }
        (Method::Get, "/client/list-files") => {
            let files = state.context.resolver().list_files();
            let json = serde_json::to_vec(&files).unwrap_or_else(|_| b"[]".to_vec());
            respond_json(state, req, json);
        }
        (Method::Post, "/client/search") => handle_search(state, req),
        (Method::Get, "/" | "/client" | "/client/") => serve_index(state, req),
        (Method::Get, p) if p.starts_with("/client/") => {
            serve_file(state, req, &p["/client/".len()..]);
        }
        (_, "/client/search" | "/client/list-files" | "/health") => {
            respond_err(state, req, 405, "method not allowed");
        }
        _ => respond_err(state, req, 404, "not found"),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(state: &Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let server = Server::http(addr).map_err(|e| std::io::Error::other(e.to_string()))?;
    info!("listening on http://{addr}");
    for request in server.incoming_requests() {
        handle_request(state, request);
    }
    Ok(())
}

/// A test helper that serves an [`AppState`] on a random port in a background thread.
///
/// Drop the `TestServer` to stop the server (via `Server::unblock`).
pub struct TestServer {
    pub url: String,
    pub port: u16,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(state: AppState) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let state = Arc::new(state);
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&state, request);
            }
        });

        Self {
            url,
            port,
            server,
            _handle: handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
