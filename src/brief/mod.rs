use std::io::{self, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::defaults;
use crate::model::EvidenceTier;
use crate::store::{PgStore, Repository};
use crate::telemetry;
use crate::telemetry::ops::brief::Phase as BriefPhase;
use crate::util::time::hours_ago;

pub mod render;

use self::render::BriefEntry;

/// Print a Markdown digest of recent corroborated events.
#[derive(Args)]
pub struct BriefCmd {
    /// Window over event updated_at, in hours
    #[arg(long, default_value_t = defaults::BRIEF_HOURS)] pub hours: i64,
    /// Lowest evidence tier shown (0-3)
    #[arg(long, default_value_t = defaults::BRIEF_MIN_EVIDENCE, value_parser = clap::value_parser!(i16).range(0..=3))]
    pub min_evidence: i16,
}

#[derive(Debug, Serialize)]
pub struct BriefReport {
    pub hours: i64,
    pub min_evidence: i16,
    pub entries: Vec<BriefEntry>,
    pub markdown: String,
}

pub async fn run(pool: &PgPool, args: BriefCmd) -> Result<()> {
    let log = telemetry::brief();
    let _g = log.root_span_kv([
        ("hours", args.hours.to_string()),
        ("min_evidence", args.min_evidence.to_string()),
    ]).entered();

    let store = PgStore::new(pool.clone());
    let report = build_brief(&store, hours_ago(args.hours), args.hours, EvidenceTier::from_level(args.min_evidence)).await?;

    if telemetry::config::json_mode() {
        log.result(&report)?;
    } else {
        let mut out = io::stdout().lock();
        out.write_all(report.markdown.as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

pub async fn build_brief<R: Repository>(repo: &R, since: DateTime<Utc>, hours: i64, min: EvidenceTier) -> Result<BriefReport> {
    let log = telemetry::brief();
    let events = {
        let _s = log.span(&BriefPhase::SelectEvents).entered();
        repo.brief_events(since, min).await?
    };

    let _s = log.span(&BriefPhase::Render).entered();
    let entries = render::entries(&events);
    log.info_kv("📰 brief", [("events", events.len().to_string()), ("shown", entries.len().to_string())]);
    let markdown = render::markdown(hours, &entries);
    Ok(BriefReport { hours, min_evidence: min.level(), entries, markdown })
}
