//! HTTP end-to-end tests.
//!
//! Each test starts a real server in-process on a random port, backed by the
//! in-memory archive engine, and talks to it with a real HTTP client.

use grfserve_archive::mock::write_stub_archive;
use grfserve_archive::{ArchiveRegistry, MemoryEngineFactory, SUPPORTED_VERSION};
use grfserve_core::{ClientContext, ServerConfig, ValidationDetails, ValidationResult};
use grfserve_server::{AppState, TestServer};
use std::io::Read;
use std::path::Path;

struct Reply {
    status: u16,
    content_type: Option<String>,
    allow_origin: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn into_reply(result: Result<ureq::http::Response<ureq::Body>, ureq::Error>) -> Reply {
    match result {
        Ok(resp) => {
            let header = |name: &str| {
                resp.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            };
            let content_type = header("content-type");
            let allow_origin = header("access-control-allow-origin");
            let status = resp.status().as_u16();
            let mut body = Vec::new();
            resp.into_body()
                .into_reader()
                .read_to_end(&mut body)
                .unwrap();
            Reply {
                status,
                content_type,
                allow_origin,
                body,
            }
        }
        Err(ureq::Error::StatusCode(code)) => Reply {
            status: code,
            content_type: None,
            allow_origin: None,
            body: Vec::new(),
        },
        Err(e) => panic!("request failed: {e}"),
    }
}

fn get(url: &str) -> Reply {
    into_reply(ureq::get(url).call())
}

fn post(url: &str, content_type: &str, body: &str) -> Reply {
    into_reply(ureq::post(url).header("Content-Type", content_type).send(body))
}

fn healthy_result() -> ValidationResult {
    ValidationResult {
        success: true,
        errors: Vec::new(),
        warnings: vec!["PORT not set, using default: 3338".to_owned()],
        info: vec!["Valid GRF: data.grf".to_owned()],
        details: ValidationDetails::default(),
    }
}

fn start(root: &Path, config: ServerConfig, factory: &MemoryEngineFactory) -> TestServer {
    let resources = config.resources_path();
    let archives = ["patch.grf".to_owned(), "data.grf".to_owned()];
    for a in &archives {
        write_stub_archive(&resources.join(a), SUPPORTED_VERSION, [0; 14]).unwrap();
    }
    let registry = ArchiveRegistry::open(&resources, &archives, factory);
    assert_eq!(registry.loaded_count(), 2, "root: {}", root.display());
    let context = ClientContext::with_registry(config, registry);
    TestServer::start(AppState::new(context, healthy_result().status_snapshot()))
}

fn factory() -> MemoryEngineFactory {
    MemoryEngineFactory::new()
        .with_entry("patch.grf", "data\\clientinfo.xml", b"<clientinfo/>")
        .with_entry("data.grf", "data\\clientinfo.xml", b"<old/>")
        .with_entry("data.grf", "data\\texture\\\u{c0}\u{af}\u{c0}\u{fa}.bmp", b"BM")
        .with_entry("data.grf", "data\\sprite\\poring.spr", b"SP")
        .with_entry("data.grf", "data\\sprite\\poring.act", b"AC")
}

fn default_server() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path(), ServerConfig::with_root(dir.path()), &factory());
    (server, dir)
}

#[test]
fn serves_highest_priority_archive_file() {
    let (server, dir) = default_server();
    let reply = get(&format!("{}/client/data/clientinfo.xml", server.url));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, b"<clientinfo/>");
    assert_eq!(reply.content_type.as_deref(), Some("text/xml"));
    assert_eq!(
        std::fs::read(dir.path().join("data").join("clientinfo.xml")).unwrap(),
        b"<clientinfo/>"
    );
}

#[test]
fn serves_overlay_file_first() {
    let (server, dir) = default_server();
    std::fs::create_dir_all(dir.path().join("data").join("sprite")).unwrap();
    std::fs::write(dir.path().join("data").join("sprite").join("poring.spr"), b"LOCAL").unwrap();

    let reply = get(&format!("{}/client/data/sprite/poring.spr", server.url));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, b"LOCAL");
    assert_eq!(reply.content_type.as_deref(), Some("application/octet-stream"));
}

#[test]
fn percent_encoded_names_resolve() {
    let (server, _dir) = default_server();
    // U+00C0 U+00AF U+00C0 U+00FA, UTF-8 percent-encoded as a browser would send them.
    let reply = get(&format!(
        "{}/client/data/texture/%C3%80%C2%AF%C3%80%C3%BA.bmp",
        server.url
    ));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, b"BM");
    assert_eq!(reply.content_type.as_deref(), Some("image/bmp"));
}

#[test]
fn missing_file_is_404() {
    let (server, _dir) = default_server();
    let reply = get(&format!("{}/client/data/none.txt", server.url));
    assert_eq!(reply.status, 404);
}

#[test]
fn traversal_is_404() {
    let (server, _dir) = default_server();
    let reply = get(&format!("{}/client/data/%2E%2E/%2E%2E/etc/passwd", server.url));
    assert_eq!(reply.status, 404);
}

#[test]
fn list_files_is_deduplicated_json() {
    let (server, _dir) = default_server();
    let reply = get(&format!("{}/client/list-files", server.url));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    let files: Vec<String> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(files.len(), 4);
    assert_eq!(files.iter().filter(|f| *f == "data\\clientinfo.xml").count(), 1);
    assert!(files.contains(&"data\\sprite\\poring.spr".to_owned()));
}

#[test]
fn search_with_form_body() {
    let (server, _dir) = default_server();
    let reply = post(
        &format!("{}/client/search", server.url),
        "application/x-www-form-urlencoded",
        "filter=PORING",
    );
    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.text(),
        "data\\sprite\\poring.act\ndata\\sprite\\poring.spr"
    );
}

#[test]
fn search_with_json_body() {
    let (server, _dir) = default_server();
    let reply = post(
        &format!("{}/client/search", server.url),
        "application/json",
        r#"{"filter":"\\.xml$"}"#,
    );
    assert_eq!(reply.status, 200);
    assert_eq!(reply.text(), "data\\clientinfo.xml");
}

#[test]
fn search_without_filter_is_400() {
    let (server, _dir) = default_server();
    let reply = post(
        &format!("{}/client/search", server.url),
        "application/x-www-form-urlencoded",
        "filter=",
    );
    assert_eq!(reply.status, 400);
}

#[test]
fn search_disabled_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::with_root(dir.path());
    config.enable_search = false;
    let server = start(dir.path(), config, &factory());
    let reply = post(
        &format!("{}/client/search", server.url),
        "application/x-www-form-urlencoded",
        "filter=poring",
    );
    assert_eq!(reply.status, 400);
}

#[test]
fn index_is_served_from_root() {
    let (server, dir) = default_server();
    std::fs::write(dir.path().join("index.html"), "<html>client</html>").unwrap();
    for path in ["/", "/client/"] {
        let reply = get(&format!("{}{path}", server.url));
        assert_eq!(reply.status, 200, "{path}");
        assert_eq!(reply.text(), "<html>client</html>");
        assert_eq!(
            reply.content_type.as_deref(),
            Some("text/html; charset=utf-8")
        );
    }
}

#[test]
fn health_reports_snapshot() {
    let (server, _dir) = default_server();
    let reply = get(&format!("{}/health", server.url));
    assert_eq!(reply.status, 200);
    let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["hasWarnings"], true);
    assert_eq!(json["summary"]["warnings"], 1);
}

#[test]
fn cors_uses_public_url() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::with_root(dir.path());
    config.public_url = Some("http://127.0.0.1:8000".to_owned());
    let server = start(dir.path(), config, &factory());
    let reply = get(&format!("{}/client/list-files", server.url));
    assert_eq!(reply.allow_origin.as_deref(), Some("http://127.0.0.1:8000"));

    let (server, _dir) = default_server();
    let reply = get(&format!("{}/client/list-files", server.url));
    assert_eq!(reply.allow_origin.as_deref(), Some("*"));
}

#[test]
fn wrong_method_is_405() {
    let (server, _dir) = default_server();
    let reply = post(&format!("{}/health", server.url), "text/plain", "x");
    assert_eq!(reply.status, 405);
}
