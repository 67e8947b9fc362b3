//! In-memory stand-in for the remote archive
//!
//! Serves the item API, IIIF `info.json` probes and page images through the
//! [`HttpTransport`] seam, so tests drive the production fetcher, prober and
//! image fetcher without a network.

use super::constants::*;
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use quilt_harvester::fetcher::{HttpResponse, HttpTransport, TransportError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

/// One request seen by the fake archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Item(String),
    Probe(String, String),
    Image(String, String),
}

#[derive(Default)]
struct ArchiveState {
    items: HashMap<String, Value>,
    /// Pages served by the tile service, per item.
    pages: HashMap<String, HashSet<u32>>,
    /// Remaining 429 responses before an item is served.
    throttled: HashMap<String, u32>,
    /// Items whose API always answers 503.
    broken: HashSet<String>,
    requests: Vec<Request>,
}

#[derive(Default)]
pub struct FakeArchive {
    state: Mutex<ArchiveState>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `payload` under `item_id` with `page_count` pages on the tile service.
    pub fn publish(&self, item_id: &str, payload: Value, page_count: u32) {
        let mut state = self.state.lock().unwrap();
        state.items.insert(item_id.to_string(), payload);
        state
            .pages
            .insert(item_id.to_string(), (1..=page_count).collect());
    }

    pub fn throttle(&self, item_id: &str, times: u32) {
        let mut state = self.state.lock().unwrap();
        state.throttled.insert(item_id.to_string(), times);
    }

    pub fn break_item(&self, item_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.broken.insert(item_id.to_string());
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Request) -> bool) -> usize {
        self.requests().iter().filter(|r| predicate(r)).count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    fn serve_item(&self, item_id: &str) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        state.requests.push(Request::Item(item_id.to_string()));

        if state.broken.contains(item_id) {
            return status(503);
        }
        if let Some(remaining) = state.throttled.get_mut(item_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return status(429);
            }
        }
        match state.items.get(item_id) {
            Some(payload) => HttpResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: serde_json::to_vec(payload).unwrap(),
            },
            None => status(404),
        }
    }

    fn has_page(&self, item_id: &str, page_id: &str) -> bool {
        let number: Option<u32> = page_id.strip_prefix("ms").and_then(|n| n.parse().ok());
        let state = self.state.lock().unwrap();
        match (state.pages.get(item_id), number) {
            (Some(pages), Some(n)) => pages.contains(&n),
            _ => false,
        }
    }

    fn record(&self, request: Request) {
        self.state.lock().unwrap().requests.push(request);
    }
}

fn status(code: u16) -> HttpResponse {
    HttpResponse {
        status: code,
        content_type: None,
        body: Vec::new(),
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Splits `{TILE_BASE_URL}/{SERVICE_PATH}:{item}:{page}/{rest}` into its parts.
fn parse_tile_url(url: &str) -> Option<(String, String, String)> {
    let identifier_and_rest = url
        .strip_prefix(TILE_BASE_URL)?
        .strip_prefix('/')?
        .strip_prefix(SERVICE_PATH)?
        .strip_prefix(':')?;
    let (identifier, rest) = identifier_and_rest.split_once('/')?;
    let (item_id, page_id) = identifier.split_once(':')?;
    Some((item_id.to_string(), page_id.to_string(), rest.to_string()))
}

#[async_trait]
impl HttpTransport for FakeArchive {
    async fn get(
        &self,
        url: &str,
        _query: &[(&str, &str)],
        _max_body_bytes: Option<u64>,
    ) -> Result<HttpResponse, TransportError> {
        if let Some(path) = url.strip_prefix(ARCHIVE_BASE_URL) {
            let item_id = path
                .trim_start_matches("/item/")
                .trim_end_matches('/')
                .to_string();
            return Ok(self.serve_item(&item_id));
        }

        match parse_tile_url(url) {
            Some((item_id, page_id, _)) => {
                self.record(Request::Image(item_id.clone(), page_id.clone()));
                if self.has_page(&item_id, &page_id) {
                    Ok(HttpResponse {
                        status: 200,
                        content_type: Some("image/png".to_string()),
                        body: png_bytes(32, 32),
                    })
                } else {
                    Ok(status(404))
                }
            }
            None => Err(TransportError::Connection(format!("unknown host: {}", url))),
        }
    }

    async fn head(&self, url: &str) -> Result<u16, TransportError> {
        match parse_tile_url(url) {
            Some((item_id, page_id, rest)) if rest == "info.json" => {
                self.record(Request::Probe(item_id.clone(), page_id.clone()));
                Ok(if self.has_page(&item_id, &page_id) {
                    200
                } else {
                    404
                })
            }
            _ => Err(TransportError::Connection(format!("unknown host: {}", url))),
        }
    }
}
