use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;

pub const USER_AGENT: &str = concat!("newsdesk/", env!("CARGO_PKG_VERSION"));
pub const ACCEPT_FEED: &str = "application/rss+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_LANG: &str = "en-US,en;q=0.9";

/// Documented defaults for every batch command.
pub mod defaults {
    pub const INGEST_LIMIT: i64 = 50;
    pub const INGEST_CONCURRENCY: usize = 4;
    pub const INGEST_TIMEOUT_SECS: u64 = 30;

    pub const EXTRACT_LIMIT: i64 = 50;
    pub const EXTRACT_CONCURRENCY: usize = 10;
    pub const EXTRACT_RETRIES: u32 = 2;
    pub const EXTRACT_TIMEOUT_SECS: u64 = 40;

    pub const CLUSTER_HOURS: i64 = 24;
    pub const CLUSTER_LIMIT: i64 = 500;
    pub const CLUSTER_MAX_DISTANCE: u32 = 3;

    pub const SUMMARY_HOURS: i64 = 168;
    pub const SUMMARY_MIN_CLEAN_LEN: usize = 140;
    pub const SUMMARY_MIN_TOKENS: usize = 30;

    pub const BRIEF_HOURS: i64 = 72;
    pub const BRIEF_MIN_EVIDENCE: i16 = 1;
}

/// `--dsn` wins over `DATABASE_URL` (which may come from `.env`).
pub fn database_url(dsn: Option<String>) -> Result<String> {
    dsn.or_else(|| env::var("DATABASE_URL").ok())
        .context("Please provide --dsn or set DATABASE_URL in .env")
}

/// Shared HTTP client: timeout, user agent, redirects followed.
pub fn http_client(timeout_secs: u64, accept: &'static str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANG));
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?;
    Ok(client)
}
