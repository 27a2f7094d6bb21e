use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::defaults;
use crate::model::SummarySource;
use crate::store::{PgStore, Repository};
use crate::telemetry;
use crate::telemetry::ops::summaries::Phase as SummaryPhase;
use crate::util::time::hours_ago;

pub mod pick;

use self::pick::{best_candidate, pick_summary, Thresholds};

/// Rebuild event summaries from the best text among their linked items.
#[derive(Args)]
pub struct RebuildSummariesCmd {
    /// Window over event updated_at, in hours
    #[arg(long, default_value_t = defaults::SUMMARY_HOURS)] pub hours: i64,
    /// Also bump updated_at on rewritten events
    #[arg(long, default_value_t = false)] pub touch_updated_at: bool,
    /// Shortest sanitized text accepted as a candidate
    #[arg(long, default_value_t = defaults::SUMMARY_MIN_CLEAN_LEN)] pub min_clean_len: usize,
    /// Fewest word tokens accepted in a candidate
    #[arg(long, default_value_t = defaults::SUMMARY_MIN_TOKENS)] pub min_tokens: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SummaryReport {
    pub events: usize,
    pub updated: usize,
    pub no_text: usize,
    pub unchanged: usize,
    pub failed: usize,
}

pub async fn run(pool: &PgPool, args: RebuildSummariesCmd) -> Result<()> {
    let log = telemetry::summaries();
    let _g = log.root_span_kv([
        ("hours", args.hours.to_string()),
        ("touch_updated_at", args.touch_updated_at.to_string()),
    ]).entered();

    let store = PgStore::new(pool.clone());
    let th = Thresholds { min_clean_len: args.min_clean_len, min_tokens: args.min_tokens };
    let report = rebuild_batch(&store, hours_ago(args.hours), th, args.touch_updated_at).await?;

    if telemetry::config::json_mode() {
        log.result(&report)?;
    }
    Ok(())
}

pub async fn rebuild_batch<R: Repository>(repo: &R, since: DateTime<Utc>, th: Thresholds, touch_updated_at: bool) -> Result<SummaryReport> {
    let log = telemetry::summaries();
    let events = {
        let _s = log.span(&SummaryPhase::SelectEvents).entered();
        repo.events_updated_since(since).await?
    };
    let mut report = SummaryReport { events: events.len(), ..Default::default() };
    if events.is_empty() {
        log.totals(0, 0, 0, 0);
        return Ok(report);
    }

    let by_event = {
        let _s = log.span(&SummaryPhase::LoadTexts).entered();
        let ids: Vec<i64> = events.iter().map(|e| e.event_id).collect();
        group_by_event(repo.summary_sources(&ids).await?)
    };

    let _s = log.span(&SummaryPhase::Write).entered();
    for ev in &events {
        let texts = by_event.get(&ev.event_id).map(Vec::as_slice).unwrap_or(&[]);
        let summary = best_candidate(candidate_texts(texts), th).map(|best| pick_summary(&best, &ev.title)).unwrap_or_default();

        if summary.is_empty() {
            report.no_text += 1;
            log.debug(format!("event {}: no usable text", ev.event_id));
            continue;
        }
        if summary == ev.summary {
            report.unchanged += 1;
            continue;
        }
        match repo.store_summary(ev.event_id, &summary, touch_updated_at).await {
            Ok(()) => report.updated += 1,
            Err(e) => {
                report.failed += 1;
                log.warn_kv("⚠️ summary write failed", [("event_id", ev.event_id.to_string()), ("error", format!("{e:#}"))]);
            }
        }
    }

    log.totals(report.updated, report.no_text, report.unchanged, report.failed);
    Ok(report)
}

fn group_by_event(rows: Vec<SummarySource>) -> BTreeMap<i64, Vec<SummarySource>> {
    let mut out: BTreeMap<i64, Vec<SummarySource>> = BTreeMap::new();
    for row in rows {
        out.entry(row.event_id).or_default().push(row);
    }
    out
}

/// Per item, in fallback order: article text, feed summary, feed title.
fn candidate_texts(items: &[SummarySource]) -> impl Iterator<Item = &str> {
    items.iter().flat_map(|s| [s.article_text.as_deref().unwrap_or(""), s.raw_summary.as_str(), s.raw_title.as_str()])
}
