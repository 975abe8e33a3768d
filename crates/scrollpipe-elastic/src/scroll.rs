//! Scroll search as a page source
//!
//! The first page comes from a search that opens a scroll context; later pages
//! continue it by scroll id. An empty hit list ends the scroll.
//!
//! The cluster advances a scroll on every continuation it receives, so a
//! continuation is only resent when the connection failed before the request
//! went out. Resending after a timeout would skip the page that was lost.

use anyhow::Result;
use reqwest::Method;
use scrollpipe_core::{
    Cursor, Page, PageSource, Record, RetryPolicy, SourceError, retry_when, retry_with_backoff,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::EsClient;
use crate::config::{ElasticConfig, HttpSettings};

#[derive(Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    #[serde(default)]
    timed_out: bool,
    #[serde(rename = "_shards")]
    shards: Option<Shards>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Shards {
    #[serde(default)]
    failed: u64,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

/// Decode one search/scroll response body into a page.
///
/// Empty `hits.hits` yields an empty last page carrying the reply's scroll id,
/// so the context can still be cleared; without an id it is
/// [`SourceError::Exhausted`]. A hit without an object `_source`, or a
/// non-empty page without `_scroll_id`, is a decode error.
///
/// A page the cluster marks `timed_out`, or that has failed shards, is logged
/// as a warning and still delivered; the run does not fail on partial results.
pub fn parse_scroll_response(body: &str) -> Result<Page, SourceError> {
    let response: ScrollResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;

    if response.timed_out {
        log::warn!("Scroll page timed out on the cluster; results may be partial");
    }
    if let Some(shards) = &response.shards {
        if shards.failed > 0 {
            log::warn!("{} shards failed for this page", shards.failed);
        }
    }
    if response.hits.hits.is_empty() {
        return match response.scroll_id {
            Some(id) => Ok(Page::new(Vec::new(), Cursor::new(id)).last()),
            None => Err(SourceError::Exhausted),
        };
    }

    let scroll_id = response
        .scroll_id
        .ok_or_else(|| SourceError::Decode("response has hits but no _scroll_id".into()))?;

    let records = response
        .hits
        .hits
        .into_iter()
        .map(|hit| {
            let id = hit.id.as_deref().unwrap_or("?").to_string();
            hit.source
                .and_then(Record::from_value)
                .ok_or_else(|| SourceError::Decode(format!("hit {id}: _source is not an object")))
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    Ok(Page::new(records, Cursor::new(scroll_id)))
}

/// [`PageSource`] over the Elasticsearch scroll API
pub struct ScrollSource {
    client: EsClient,
    index: String,
    query: Value,
    page_size: usize,
    keepalive: String,
    retry: RetryPolicy,
}

impl ScrollSource {
    pub fn new(config: &ElasticConfig, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: EsClient::new(config, http)?,
            index: config.index.clone(),
            query: config.query_body()?,
            page_size: config.page_size,
            keepalive: config.scroll.clone(),
            retry: RetryPolicy {
                max_retries: http.max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Path and body of the request that fetches the page after `cursor`
    fn request(&self, cursor: &Cursor) -> (String, Value) {
        match cursor.token() {
            None => (
                format!(
                    "/{}/_search?scroll={}&size={}",
                    self.index, self.keepalive, self.page_size
                ),
                self.query.clone(),
            ),
            Some(scroll_id) => (
                "/_search/scroll".to_string(),
                json!({ "scroll": self.keepalive, "scroll_id": scroll_id }),
            ),
        }
    }
}

impl PageSource for ScrollSource {
    async fn next(&self, cursor: &Cursor) -> Result<Page, SourceError> {
        let (path, body) = self.request(cursor);
        let send = |attempt| self.client.send(attempt, Method::POST, &path, &body);
        let text = if cursor.is_initial() {
            retry_with_backoff("search", self.retry, send).await?
        } else {
            retry_when("scroll", self.retry, SourceError::is_unsent, send).await?
        };
        let page = parse_scroll_response(&text)?;
        log::debug!("scroll page: {} hits", page.len());
        Ok(page)
    }

    async fn release(&self, cursor: &Cursor) {
        let Some(scroll_id) = cursor.token() else {
            return;
        };
        let body = json!({ "scroll_id": [scroll_id] });
        match self
            .client
            .send(0, Method::DELETE, "/_search/scroll", &body)
            .await
        {
            Ok(_) => log::debug!("scroll context cleared"),
            Err(e) => log::warn!("Failed to clear scroll context: {e}"),
        }
    }
}
