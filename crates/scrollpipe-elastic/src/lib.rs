//! Elasticsearch scroll API as a [`scrollpipe_core::PageSource`]

pub mod client;
pub mod config;
pub mod scroll;

pub use client::EsClient;
pub use config::{ElasticConfig, HttpSettings};
pub use scroll::{ScrollSource, parse_scroll_response};
