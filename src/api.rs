use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::error::{FinsyncError, Result};
use crate::models::Record;

/// One response body worth of records. `next_cursor` is set only when the
/// API explicitly reports more results remaining.
#[derive(Debug, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub next_cursor: Option<u64>,
}

pub struct ApiClient {
    http: Client,
    url: String,
    token: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }

    /// GET every transaction record. Fails on the first transport error or
    /// non-success status; nothing is retried.
    pub fn fetch_records(&self) -> Result<Vec<Record>> {
        info!(url = %self.url, "fetching records from API");
        let mut records = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.fetch_page(cursor)?;
            records.extend(page.records);
            match page.next_cursor {
                Some(next) => {
                    debug!(cursor = next, fetched = records.len(), "more records remaining");
                    cursor = Some(next);
                }
                None => break,
            }
        }
        info!(count = records.len(), "records fetched");
        Ok(records)
    }

    fn fetch_page(&self, cursor: Option<u64>) -> Result<Page> {
        let mut request = self.http.get(&self.url).bearer_auth(&self.token);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = request.send()?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FinsyncError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FinsyncError::HttpStatus(status.as_u16()));
        }
        let body = response.text()?;
        let json: Json = serde_json::from_str(&body)
            .map_err(|e| FinsyncError::Decode(format!("response is not JSON: {e}")))?;
        parse_page(json)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Body {
    Bare(Vec<Record>),
    Wrapped { response: Envelope },
}

#[derive(Deserialize)]
struct Envelope {
    results: Vec<Record>,
    #[serde(default)]
    cursor: u64,
    #[serde(default)]
    remaining: u64,
}

/// Accepts either a bare array of records or the platform envelope
/// `{"response": {"results": [...], "cursor": n, "remaining": m}}`.
pub fn parse_page(body: Json) -> Result<Page> {
    let body: Body = serde_json::from_value(body).map_err(|_| {
        FinsyncError::Decode(
            "expected an array of objects or a `response` envelope with `results`".to_string(),
        )
    })?;
    match body {
        Body::Bare(records) => Ok(Page {
            records,
            next_cursor: None,
        }),
        Body::Wrapped { response } => {
            let next_cursor = (response.remaining > 0 && !response.results.is_empty())
                .then(|| response.cursor + response.results.len() as u64);
            Ok(Page {
                records: response.results,
                next_cursor,
            })
        }
    }
}
