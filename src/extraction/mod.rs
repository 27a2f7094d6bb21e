use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use sqlx::PgPool;
use tracing::Instrument;

use crate::config::{self, defaults};
use crate::model::{ArticleRecord, PendingItem};
use crate::store::{PgStore, Repository};
use crate::telemetry;
use crate::telemetry::ops::extract::Phase as ExtractPhase;
use crate::text::truncate_chars;
use crate::util::gate::Gate;
use crate::util::time::elapsed_ms;

pub mod error;
pub mod fetch;
pub mod html;
pub mod types;

use self::error::ExtractError;
use self::fetch::Page;
use self::html::{ArticleExtractor, Extracted, ScraperExtractor};
use self::types::{ExtractReport, ItemOutcome};

pub const MIN_HTML_BYTES: usize = 200;
pub const MIN_TEXT_CHARS: usize = 200;

/// Download pending articles and store their main text.
#[derive(Args)]
pub struct ExtractCmd {
    /// Maximum number of items processed in this batch
    #[arg(long, default_value_t = defaults::EXTRACT_LIMIT, value_parser = clap::value_parser!(i64).range(0..))]
    pub limit: i64,
    /// Simultaneous page requests
    #[arg(long, default_value_t = defaults::EXTRACT_CONCURRENCY)] pub concurrency: usize,
    /// Extra attempts after a transient failure
    #[arg(long, default_value_t = defaults::EXTRACT_RETRIES)] pub retries: u32,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = defaults::EXTRACT_TIMEOUT_SECS)] pub timeout: u64,
    /// Also retry items whose previous extraction failed
    #[arg(long, default_value_t = false)] pub retry_failed: bool,
}

/// Exponential backoff between attempts: doubled after each wait, capped.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self { Backoff { base: Duration::from_secs(1), cap: Duration::from_secs(10) } }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExtractOpts {
    pub retries: u32,
    pub backoff: Backoff,
}

pub async fn run(pool: &PgPool, args: ExtractCmd) -> Result<()> {
    let log = telemetry::extract();
    let _g = log.root_span_kv([
        ("limit", args.limit.to_string()),
        ("concurrency", args.concurrency.to_string()),
        ("retries", args.retries.to_string()),
        ("retry_failed", args.retry_failed.to_string()),
    ]).entered();

    let store = PgStore::new(pool.clone());
    let client = config::http_client(args.timeout, config::ACCEPT_HTML)?;
    let opts = ExtractOpts { retries: args.retries, backoff: Backoff::default() };
    let report = extract_batch(
        &store,
        &client,
        &ScraperExtractor,
        args.limit,
        args.retry_failed,
        &Gate::new(args.concurrency),
        opts,
    )
    .await?;

    if telemetry::config::json_mode() {
        log.result(&report)?;
    }
    Ok(())
}

pub async fn extract_batch<R, E>(
    repo: &R,
    client: &Client,
    extractor: &E,
    limit: i64,
    retry_failed: bool,
    gate: &Gate,
    opts: ExtractOpts,
) -> Result<ExtractReport>
where
    R: Repository,
    E: ArticleExtractor,
{
    let log = telemetry::extract();
    let items = {
        let _s = log.span(&ExtractPhase::SelectItems).entered();
        repo.items_for_extraction(limit, retry_failed).await?
    };
    if items.is_empty() {
        log.info("ℹ️  No items to extract");
        return Ok(ExtractReport::default());
    }
    log.info(format!("🧾 Extracting {} items (concurrency={}, retries={})", items.len(), gate.size(), opts.retries));

    let outcomes: Vec<ItemOutcome> = stream::iter(items.iter())
        .map(|item| {
            let span = log.span_kv(&ExtractPhase::Item, [("item_id", item.item_id.to_string())]);
            extract_item(repo, client, extractor, gate, opts, item).instrument(span)
        })
        .buffer_unordered(gate.queue_depth())
        .collect()
        .await;

    let ok = outcomes.iter().filter(|o| o.ok).count();
    let report = ExtractReport { items: outcomes.len(), ok, failed: outcomes.len() - ok, outcomes };
    log.totals(report.ok, report.failed);
    Ok(report)
}

async fn extract_item<R, E>(repo: &R, client: &Client, extractor: &E, gate: &Gate, opts: ExtractOpts, item: &PendingItem) -> ItemOutcome
where
    R: Repository,
    E: ArticleExtractor,
{
    let log = telemetry::extract();
    let started = Instant::now();
    let (result, attempts) = fetch_and_extract(client, extractor, gate, opts, &item.url).await;

    let record = match result {
        Ok((final_url, ex)) => ArticleRecord { final_url, title: ex.title, text: ex.text, lang: ex.lang, error: String::new() },
        Err((final_url, e)) => ArticleRecord { final_url, error: e.to_string(), ..empty_record() },
    };

    let mut ok = record.error.is_empty();
    let mut error = (!ok).then(|| record.error.clone());
    if let Err(e) = repo.upsert_article(item.item_id, &record).instrument(log.span(&ExtractPhase::WriteArticle)).await {
        log.warn_kv("⚠️ write failed", [("item_id", item.item_id.to_string()), ("error", format!("{e:#}"))]);
        ok = false;
        error = Some(format!("{e:#}"));
    }

    let elapsed = elapsed_ms(started);
    let shown = if record.title.is_empty() { item.title.as_str() } else { record.title.as_str() };
    let title = truncate_chars(shown, 80).to_string();
    log.item_outcome(item.item_id, ok, elapsed, &title, truncate_chars(error.as_deref().unwrap_or(""), 140));
    ItemOutcome { item_id: item.item_id, ok, attempts, elapsed_ms: elapsed, title, error }
}

/// Fetch with retries on transient failures, then extract once. The failure
/// side carries the url to record alongside the error.
async fn fetch_and_extract<E: ArticleExtractor>(
    client: &Client,
    extractor: &E,
    gate: &Gate,
    opts: ExtractOpts,
    url: &str,
) -> (Result<(String, Extracted), (String, ExtractError)>, u32) {
    let log = telemetry::extract();
    let mut attempt = 0u32;
    loop {
        let fetched = gate.run(fetch::fetch_page(client, url)).instrument(log.span(&ExtractPhase::FetchPage)).await;
        attempt += 1;
        match fetched {
            Ok(page) => {
                let final_url = page.final_url.clone();
                let _s = log.span(&ExtractPhase::ExtractText).entered();
                let result = extract_page(extractor, &page).map(|ex| (page.final_url, ex)).map_err(|e| (final_url, e));
                return (result, attempt);
            }
            Err(e) if e.is_transient() && attempt <= opts.retries => {
                log.debug(format!("retrying {url} after {e} (attempt {attempt})"));
                tokio::time::sleep(opts.backoff.delay(attempt - 1)).await;
            }
            Err(e) => return (Err((url.to_string(), e)), attempt),
        }
    }
}

/// Content checks around the extractor. None of these failures are retried.
pub fn extract_page<E: ArticleExtractor>(extractor: &E, page: &Page) -> Result<Extracted, ExtractError> {
    if page.html.len() < MIN_HTML_BYTES {
        return Err(ExtractError::TooShortHtml(page.html.len()));
    }
    let ex = extractor.extract(&page.html, &page.final_url)?;
    let text = ex.text.trim().to_string();
    let len = text.chars().count();
    if len < MIN_TEXT_CHARS {
        return Err(ExtractError::TooShortText(len));
    }
    Ok(Extracted { title: ex.title.trim().to_string(), text, lang: ex.lang.trim().to_string() })
}

fn empty_record() -> ArticleRecord {
    ArticleRecord { final_url: String::new(), title: String::new(), text: String::new(), lang: String::new(), error: String::new() }
}
