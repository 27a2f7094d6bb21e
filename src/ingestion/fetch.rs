use anyhow::Result;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::Client;

use crate::model::Validators;

pub struct FeedResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub validators: Validators,
}

/// GET `url`, sending the cached validators as conditional headers.
pub async fn conditional_get(client: &Client, url: &str, cached: &Validators) -> Result<FeedResponse> {
    let mut req = client.get(url);
    if let Some(etag) = cached.etag.as_deref() { req = req.header(IF_NONE_MATCH, etag); }
    if let Some(lm) = cached.last_modified.as_deref() { req = req.header(IF_MODIFIED_SINCE, lm); }

    let resp = req.send().await?;
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let body = resp.bytes().await?;
    Ok(FeedResponse {
        status,
        body,
        content_type: header_str(&headers, CONTENT_TYPE.as_str()),
        validators: Validators {
            etag: header_str(&headers, ETAG.as_str()),
            last_modified: header_str(&headers, LAST_MODIFIED.as_str()),
        },
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
