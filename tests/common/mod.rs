// Each integration test file is a separate binary; helpers not used in every
// binary would otherwise trigger dead_code warnings from clippy.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use page_summary_server::fetch::{FetchError, FetchedPage, Fetcher};
use page_summary_server::state::AppState;

pub const PAGE_URL: &str = "https://a.com/p";

// ── Fake fetcher ─────────────────────────────────────────────────────────────

/// In-memory [`Fetcher`] keyed by absolute URL. Unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    pages: HashMap<String, Result<String, FetchError>>,
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(normalize(url), Ok(html.to_string()));
        self
    }

    pub fn with_error(mut self, url: &str, error: FetchError) -> Self {
        self.pages.insert(normalize(url), Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url).unwrap().to_string()
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url.as_str()) {
            Some(Ok(html)) => Ok(FetchedPage::new(
                "text/html; charset=utf-8",
                Box::pin(Cursor::new(html.clone().into_bytes())),
            )),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::BadStatus(404)),
        }
    }
}

/// Build the application router around `fetcher`.
pub fn create_test_app(fetcher: FakeFetcher) -> Router {
    page_summary_server::app(AppState::new(fetcher))
}

// ── Request helpers ──────────────────────────────────────────────────────────

pub async fn get(app: Router, uri: &str) -> (StatusCode, HeaderMap, String) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

/// `/v1/summary` URI for `page_url`, percent-encoded.
pub fn summary_uri(page_url: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", page_url)
        .finish();
    format!("/v1/summary?{query}")
}

// ── Readers ──────────────────────────────────────────────────────────────────

/// Yields `chunks` one per read, then fails every later read.
pub struct ChunksThenFail {
    chunks: Vec<Vec<u8>>,
}

impl ChunksThenFail {
    pub fn new(chunks: &[&str]) -> Self {
        let mut chunks: Vec<Vec<u8>> = chunks.iter().map(|c| c.as_bytes().to_vec()).collect();
        chunks.reverse();
        Self { chunks }
    }
}

impl Read for ChunksThenFail {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.pop() else {
            return Err(io::Error::new(io::ErrorKind::Other, "read past the end"));
        };
        assert!(chunk.len() <= buf.len(), "test chunk larger than read buffer");
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

/// Wraps a reader and raises a flag when it is dropped.
pub struct DropFlag<R> {
    inner: R,
    dropped: Arc<AtomicBool>,
}

impl<R> DropFlag<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }
}

impl<R: Read> Read for DropFlag<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R> Drop for DropFlag<R> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}
