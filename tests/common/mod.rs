//! Shared helpers for integration tests.
//!
//! `StubApi` serves canned JSON responses by method and path with hyper on
//! its own thread and runtime, so both async and blocking tests can use it.
//! Every request is recorded.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;
use std::thread;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;

/// A canned response.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: &'static str,
    pub path: String,
    pub status: u16,
    pub body: String,
}

impl Route {
    pub fn new(method: &'static str, path: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self { method, path: path.into(), status, body: body.into() }
    }

    /// `200 {"data": <data>}`
    pub fn ok(method: &'static str, path: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(method, path, 200, serde_json::json!({ "data": data }).to_string())
    }
}

/// A request the stub received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub body: String,
}

type Requests = Arc<Mutex<Vec<Recorded>>>;

/// Stub workflow API.
pub struct StubApi {
    pub base_url: String,
    requests: Requests,
}

impl StubApi {
    /// Start serving `routes`. Unmatched requests get a 404.
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let routes = Arc::new(routes);
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(serve(listener, routes, recorded));
        });

        Self { base_url: format!("http://{addr}/api"), requests }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    /// `METHOD path` of every request received so far.
    pub fn calls(&self) -> Vec<String> {
        self.requests().iter().map(|r| format!("{} {}", r.method, r.path)).collect()
    }
}

async fn serve(listener: std::net::TcpListener, routes: Arc<Vec<Route>>, recorded: Requests) {
    let listener = TcpListener::from_std(listener).unwrap();
    loop {
        let Ok((stream, _)) = listener.accept().await else { break };
        let routes = routes.clone();
        let recorded = recorded.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| respond(req, routes.clone(), recorded.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                eprintln!("stub connection error: {e}");
            }
        });
    }
}

async fn respond(
    req: Request<Incoming>,
    routes: Arc<Vec<Route>>,
    recorded: Requests,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().to_string();
    let path = req.uri().path_and_query().map_or_else(|| req.uri().path().to_string(), |p| p.to_string());
    let authorization = header(&req, AUTHORIZATION);
    let user_agent = header(&req, USER_AGENT);
    let body = match req.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).to_string(),
        Err(_) => String::new(),
    };

    let (status, response) = routes
        .iter()
        .find(|r| r.method == method && r.path == path)
        .map_or_else(
            || (404, r#"{"message":"Not found"}"#.to_string()),
            |r| (r.status, r.body.clone()),
        );

    recorded.lock().push(Recorded { method, path, authorization, user_agent, body });

    let response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(response)))
        .unwrap();
    Ok(response)
}

fn header(req: &Request<Incoming>, name: HeaderName) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Write a config file pointing at `base_url` with session memory off.
pub fn write_config(dir: &std::path::Path, base_url: &str) -> std::path::PathBuf {
    write_config_with(dir, base_url, "[session]\nremember_phase = false\n")
}

/// Write a config file pointing at `base_url` followed by `extra` TOML.
pub fn write_config_with(dir: &std::path::Path, base_url: &str, extra: &str) -> std::path::PathBuf {
    let path = dir.join("phaseflow.toml");
    let content = format!(
        r#"
[api]
base_url = "{base_url}"
timeout_secs = 5

{extra}"#
    );
    std::fs::write(&path, content).unwrap();
    path
}
