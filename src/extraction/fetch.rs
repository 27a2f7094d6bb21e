use reqwest::Client;

use super::error::ExtractError;

pub struct Page {
    pub final_url: String,
    pub html: String,
}

/// GET following redirects. Any status >= 400 is a failure.
pub async fn fetch_page(client: &Client, url: &str) -> Result<Page, ExtractError> {
    let resp = client.get(url).send().await?;
    let status = resp.status().as_u16();
    if status >= 400 {
        return Err(ExtractError::Status(status));
    }
    let final_url = resp.url().to_string();
    let body = resp.bytes().await?;
    Ok(Page { final_url, html: String::from_utf8_lossy(&body).into_owned() })
}
