//! `[elastic]` and `[http]` configuration sections

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;

/// Cluster, index and query to scroll through
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    pub hosts: Vec<String>,
    pub index: String,
    /// Search request body as a JSON string
    pub query: String,
    /// Source fields printed per document, in order
    pub fields: Vec<String>,
    pub ssl: bool,
    /// Extra PEM root certificate
    pub certfile: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: Option<String>,
    pub page_size: usize,
    /// Scroll context keep-alive, e.g. `1m`
    pub scroll: String,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            index: String::new(),
            query: String::new(),
            fields: Vec::new(),
            ssl: false,
            certfile: None,
            username: None,
            password: None,
            page_size: 100,
            scroll: "1m".to_string(),
        }
    }
}

/// HTTP client tuning
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds, whole request including body
    pub request_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            request_timeout: 60,
            max_retries: 3,
        }
    }
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl ElasticConfig {
    /// Check everything a scroll needs before any request goes out
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.index.trim().is_empty(), "elastic.index is empty");
        self.query_body()?;

        if self.hosts.is_empty() {
            bail!("no hosts configured (elastic.hosts)");
        }
        for host in &self.hosts {
            let scheme = host.split_once("://").map(|(scheme, _)| scheme);
            match scheme {
                Some("https") => {}
                Some("http") if !self.ssl => {}
                Some("http") => bail!("elastic.ssl is set but host {host} is not https"),
                _ => bail!("host {host} is not an http(s):// URI"),
            }
        }

        if let Some(path) = &self.certfile {
            std::fs::metadata(path)
                .with_context(|| format!("certfile not readable: {}", path.display()))?;
        }

        ensure!(!self.fields.is_empty(), "elastic.fields is empty");
        ensure!(self.page_size > 0, "elastic.page_size must be positive");
        ensure!(
            is_valid_keepalive(&self.scroll),
            "elastic.scroll is not a time value: {:?}",
            self.scroll
        );
        ensure!(
            self.password.is_none() || self.username.is_some(),
            "elastic.password set without elastic.username"
        );
        Ok(())
    }

    /// Parsed query, required to be a JSON object
    pub fn query_body(&self) -> Result<serde_json::Value> {
        ensure!(!self.query.trim().is_empty(), "elastic.query is empty");
        let body: serde_json::Value =
            serde_json::from_str(&self.query).context("elastic.query is not valid JSON")?;
        ensure!(body.is_object(), "elastic.query must be a JSON object");
        Ok(body)
    }
}

/// `<digits><unit>` as accepted by the scroll parameter
fn is_valid_keepalive(s: &str) -> bool {
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    !num.is_empty() && matches!(unit, "d" | "h" | "m" | "s" | "ms" | "micros" | "nanos")
}
