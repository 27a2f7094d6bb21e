use anyhow::{bail, Result};
use clap::{ArgAction, Args, Subcommand};
use sqlx::PgPool;
use url::Url;

use crate::model::{Cadence, NewSource, SourceClass};
use crate::store::{PgStore, Repository};
use crate::telemetry::{self};
use crate::telemetry::ops::source::Phase as SourcePhase;

pub mod types;

/// newsdesk source add/ls
#[derive(Args)]
pub struct SourceCmd {
    #[command(subcommand)]
    pub cmd: SourceSub,
}

#[derive(Subcommand)]
pub enum SourceSub {
    /// Register a feed, or update the one already registered under this url
    Add(SourceAddArgs),
    /// List registered feeds
    Ls {
        /// Filter by enabled status: true/false. Omit to show all.
        #[arg(long)]
        enabled: Option<bool>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct SourceAddArgs {
    pub url: String,
    /// Display name; defaults to the feed host
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "")]
    pub region: String,
    #[arg(long, default_value = "")]
    pub topic: String,
    #[arg(long, value_enum, default_value_t = SourceClass::Agency)]
    pub class: SourceClass,
    #[arg(long, value_enum, default_value_t = Cadence::Medium)]
    pub cadence: Cadence,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enabled: bool,
}

pub async fn run(pool: &PgPool, args: SourceCmd) -> Result<()> {
    let log = telemetry::source();
    let _g = log.root_span().entered();
    let store = PgStore::new(pool.clone());
    match args.cmd {
        SourceSub::Add(add) => {
            let result = add_source(&store, add).await?;
            if telemetry::config::json_mode() { log.result(&result)?; }
        }
        SourceSub::Ls { enabled } => {
            let list = list_sources(&store, enabled).await?;
            if telemetry::config::json_mode() { log.result(&list)?; }
        }
    }
    Ok(())
}

pub async fn add_source<R: Repository>(repo: &R, args: SourceAddArgs) -> Result<types::SourceAddResult> {
    let log = telemetry::source();
    let _s = log.span_kv(&SourcePhase::Add, [
        ("url", args.url.clone()),
        ("class", args.class.to_string()),
        ("enabled", args.enabled.to_string()),
    ]).entered();

    let src = to_new_source(args)?;
    let inserted = repo.upsert_source(&src).await?;
    if inserted { log.info(format!("➕ Source added: {}", src.url)); } else { log.info(format!("♻️ Source updated: {}", src.url)); }
    Ok(types::SourceAddResult { inserted, url: src.url, name: src.name })
}

pub async fn list_sources<R: Repository>(repo: &R, enabled: Option<bool>) -> Result<types::SourceList> {
    let log = telemetry::source();
    let _s = log.span_kv(&SourcePhase::List, [("enabled", format!("{:?}", enabled))]).entered();
    let sources = repo.list_sources(enabled).await?;
    log.info(format!("📡 Sources: {}", sources.len()));
    for s in &sources {
        log.info(format!(
            "[{}] {} ({}) class={} cadence={} enabled={} last_fetch={:?}",
            s.source_id, s.url, s.name, s.source_class, s.cadence.as_str(), s.is_enabled, s.last_fetch_at
        ));
    }
    Ok(types::SourceList { sources })
}

fn to_new_source(args: SourceAddArgs) -> Result<NewSource> {
    // friendly error before any storage I/O
    let parsed = match Url::parse(args.url.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => bail!("Invalid feed URL: {}", args.url),
    };
    let name = match args.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => parsed.host_str().unwrap_or_default().to_string(),
    };
    Ok(NewSource {
        name,
        url: args.url.trim().to_string(),
        region: args.region.trim().to_string(),
        topic: args.topic.trim().to_string(),
        source_class: args.class,
        cadence: args.cadence,
        is_enabled: args.enabled,
    })
}
