use anyhow::Result;
use clap::Args;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use sqlx::PgPool;
use std::time::Instant;
use tracing::Instrument;

use crate::config::{self, defaults};
use crate::model::{FetchCommit, FetchLogEntry, Source, Validators};
use crate::store::{PgStore, Repository};
use crate::telemetry::{self};
use crate::telemetry::ops::ingest::Phase as IngestPhase;
use crate::util::gate::Gate;
use crate::util::time::elapsed_ms;

pub mod fetch;
pub mod parse;
pub mod types;

use self::fetch::FeedResponse;
use self::parse::{AnyFeedParser, FeedParser};
use self::types::{FetchStatus, IngestReport, SourceSummary};

/// Fetch the least recently serviced enabled sources and store new items.
#[derive(Args)]
pub struct IngestCmd {
    /// Maximum number of sources fetched in this batch
    #[arg(long, default_value_t = defaults::INGEST_LIMIT, value_parser = clap::value_parser!(i64).range(0..))]
    pub limit: i64,
    /// Simultaneous feed requests
    #[arg(long, default_value_t = defaults::INGEST_CONCURRENCY)] pub concurrency: usize,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = defaults::INGEST_TIMEOUT_SECS)] pub timeout: u64,
}

pub async fn run(pool: &PgPool, args: IngestCmd) -> Result<()> {
    let log = telemetry::ingest();
    let _g = log.root_span_kv([
        ("limit", args.limit.to_string()),
        ("concurrency", args.concurrency.to_string()),
        ("timeout", args.timeout.to_string()),
    ]).entered();

    let store = PgStore::new(pool.clone());
    let client = config::http_client(args.timeout, config::ACCEPT_FEED)?;
    let report = ingest_batch(&store, &client, &AnyFeedParser, args.limit, &Gate::new(args.concurrency)).await?;

    if telemetry::config::json_mode() {
        log.result(&report)?;
    }
    Ok(())
}

pub async fn ingest_batch<R, P>(repo: &R, client: &Client, parser: &P, limit: i64, gate: &Gate) -> Result<IngestReport>
where
    R: Repository,
    P: FeedParser,
{
    let log = telemetry::ingest();
    let sources = {
        let _s = log.span(&IngestPhase::SelectSources).entered();
        repo.sources_for_fetch(limit).await?
    };
    if sources.is_empty() {
        log.info("ℹ️  No enabled sources to fetch");
        return Ok(IngestReport::default());
    }

    let per_source: Vec<SourceSummary> = stream::iter(sources.iter())
        .map(|src| {
            let span = log.span_kv(&IngestPhase::Source, [("source_id", src.source_id.to_string())]);
            fetch_source(repo, client, parser, gate, src).instrument(span)
        })
        .buffer_unordered(gate.queue_depth())
        .collect()
        .await;

    let mut report = IngestReport { sources: per_source.len(), ..Default::default() };
    for s in &per_source {
        report.created += s.created;
        match s.status {
            FetchStatus::NotModified => report.not_modified += 1,
            FetchStatus::Failed => report.failed += 1,
            FetchStatus::Fetched => {}
        }
    }
    report.per_source = per_source;
    log.totals(report.sources, report.created, report.not_modified, report.failed);
    Ok(report)
}

/// One unit of work: network under the gate, then a single storage commit.
async fn fetch_source<R, P>(repo: &R, client: &Client, parser: &P, gate: &Gate, src: &Source) -> SourceSummary
where
    R: Repository,
    P: FeedParser,
{
    let log = telemetry::ingest();
    let cached = Validators { etag: src.etag.clone(), last_modified: src.last_modified.clone() };

    let started = Instant::now();
    let resp = gate
        .run(fetch::conditional_get(client, &src.url, &cached))
        .instrument(log.span(&IngestPhase::FetchFeed))
        .await;
    let elapsed = elapsed_ms(started);

    let (commit, status) = {
        let _s = log.span(&IngestPhase::ParseFeed).entered();
        build_commit(src.source_id, resp, parser, elapsed)
    };

    let mut summary = SourceSummary {
        source_id: src.source_id,
        url: src.url.clone(),
        status,
        http_status: commit.log.status_code,
        created: 0,
        elapsed_ms: elapsed,
        error: commit.log.error.clone(),
    };

    match repo.commit_fetch(&commit).instrument(log.span(&IngestPhase::WriteItems)).await {
        Ok(created) => summary.created = created,
        Err(e) => {
            // isolated: the next batch picks this source up again
            log.warn_kv("⚠️ commit failed", [("source_id", src.source_id.to_string()), ("error", format!("{e:#}"))]);
            summary.status = FetchStatus::Failed;
            summary.error = Some(format!("{e:#}"));
        }
    }

    if let Some(err) = &summary.error {
        log.warn_kv("⚠️ fetch failed", [("source_id", src.source_id.to_string()), ("url", src.url.clone()), ("error", err.clone())]);
    }
    log.source_summary(src.source_id, summary.http_status, summary.created, elapsed);
    summary
}

/// Translate one fetch attempt into the storage commit it implies.
fn build_commit<P: FeedParser>(
    source_id: i64,
    resp: Result<FeedResponse>,
    parser: &P,
    elapsed_ms: i64,
) -> (FetchCommit, FetchStatus) {
    let mut commit = FetchCommit {
        source_id,
        log: FetchLogEntry { status_code: None, elapsed_ms, bytes_received: 0, error: None },
        validators: None,
        items: Vec::new(),
    };

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            commit.log.error = Some(format!("{e:#}"));
            return (commit, FetchStatus::Failed);
        }
    };
    commit.log.status_code = Some(resp.status as i32);

    if resp.status == 304 {
        return (commit, FetchStatus::NotModified);
    }

    commit.log.bytes_received = resp.body.len() as i64;
    if !(200..300).contains(&resp.status) {
        commit.log.error = Some(format!("HTTP {}", resp.status));
        return (commit, FetchStatus::Failed);
    }

    match parser.parse(&resp.body, resp.content_type.as_deref()) {
        Ok(entries) => {
            commit.items = entries.iter().map(parse::to_new_item).collect();
            commit.validators = Some(resp.validators);
            (commit, FetchStatus::Fetched)
        }
        Err(e) => {
            commit.log.error = Some(format!("{e:#}"));
            (commit, FetchStatus::Failed)
        }
    }
}
