//! Thin reqwest wrapper: TLS, auth, timeouts, host rotation, error mapping

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, ensure};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use scrollpipe_core::SourceError;
use serde_json::Value;

use crate::config::{ElasticConfig, HttpSettings};

/// Longest error body excerpt kept in a [`SourceError::Http`] message
const MAX_ERROR_BODY: usize = 200;

/// HTTP access to one cluster through any of its configured hosts
pub struct EsClient {
    http: reqwest::Client,
    hosts: Vec<String>,
    /// Host that answered last; retries start from here and rotate
    active: AtomicUsize,
    auth: Option<(String, Option<String>)>,
}

impl EsClient {
    /// Build the client. Fails on unreadable or malformed `certfile`.
    pub fn new(config: &ElasticConfig, http: &HttpSettings) -> Result<Self> {
        ensure!(!config.hosts.is_empty(), "no hosts configured");
        let mut builder = reqwest::Client::builder()
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .gzip(true)
            .pool_max_idle_per_host(8);

        if let Some(path) = &config.certfile {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read certfile: {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid PEM certificate: {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        if config.ssl {
            builder = builder.https_only(true);
        }

        let http = builder.build().context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            hosts: config
                .hosts
                .iter()
                .map(|h| h.trim_end_matches('/').to_string())
                .collect(),
            active: AtomicUsize::new(0),
            auth: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    /// Host for the given 0-based retry attempt
    fn host(&self, attempt: u32) -> (usize, &str) {
        let idx = (self.active.load(Ordering::Relaxed) + attempt as usize) % self.hosts.len();
        (idx, &self.hosts[idx])
    }

    /// Send a JSON request to `path` on the attempt's host and return the body text.
    ///
    /// Non-2xx statuses become [`SourceError::Http`] carrying the cluster's reason.
    pub async fn send(
        &self,
        attempt: u32,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<String, SourceError> {
        let (idx, host) = self.host(attempt);
        let url = format!("{host}{path}");
        log::debug!("{method} {url}");

        let mut request = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, password.as_deref());
        }

        let response = request.send().await.map_err(|e| from_reqwest(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| from_reqwest(&e))?;
        if !status.is_success() {
            return Err(http_error(status, &text));
        }

        self.active.store(idx, Ordering::Relaxed);
        Ok(text)
    }
}

/// Map a transport error, dropping the URL (it may carry credentials)
fn from_reqwest(e: &reqwest::Error) -> SourceError {
    if e.is_connect() {
        return SourceError::Connect(root_cause(e));
    }
    let status = e.status().map(|s| s.as_u16());
    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        root_cause(e)
    };
    SourceError::Http { status, message }
}

fn root_cause(e: &(dyn std::error::Error + 'static)) -> String {
    let mut cause = e;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause.to_string()
}

/// Error for a non-2xx answer, preferring the cluster's `error.reason`
fn http_error(status: StatusCode, body: &str) -> SourceError {
    let reason = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        let error = v.get("error")?;
        error
            .get("reason")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
    });
    let message = reason.unwrap_or_else(|| {
        let mut excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
        if excerpt.is_empty() {
            excerpt = status.canonical_reason().unwrap_or("no body").to_string();
        }
        excerpt
    });
    SourceError::Http {
        status: Some(status.as_u16()),
        message,
    }
}
