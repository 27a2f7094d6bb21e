use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::defaults;
use crate::evidence;
use crate::fingerprint::{fingerprint_text, Fingerprint, FingerprintOpts};
use crate::model::{CandidateRow, ClusterKey, EvidenceTier};
use crate::store::{LinkOutcome, LinkRequest, LinkTarget, PgStore, Repository};
use crate::telemetry;
use crate::telemetry::ops::cluster::Phase as ClusterPhase;
use crate::text::{sanitize, truncate_chars};
use crate::util::time::hours_ago;

pub mod enrich;
pub mod index;

use self::index::BucketIndex;

pub const MAX_TITLE_CHARS: usize = 300;

/// Group recent items into events by near-identical fingerprints.
#[derive(Args)]
pub struct ClusterCmd {
    /// Lookback window in hours
    #[arg(long, default_value_t = defaults::CLUSTER_HOURS)] pub hours: i64,
    /// Maximum number of candidate items
    #[arg(long, default_value_t = defaults::CLUSTER_LIMIT, value_parser = clap::value_parser!(i64).range(0..))]
    pub limit: i64,
    /// Largest hamming distance that still joins an existing event
    #[arg(long, default_value_t = defaults::CLUSTER_MAX_DISTANCE)] pub max_distance: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ClusterReport {
    pub candidates: usize,
    pub events_created: usize,
    pub items_linked: usize,
    pub low_signal: usize,
    pub already_linked: usize,
    pub events_scored: usize,
    pub tiers_changed: usize,
    /// Link or score writes that errored; the rest of the batch still ran.
    pub failed: usize,
}

/// Result of rescoring a set of events.
#[derive(Debug, Default)]
pub struct Rescored {
    pub changed: HashSet<i64>,
    pub failed: usize,
}

/// An unlinked item with enough text to fingerprint.
struct Prepared {
    item_id: i64,
    fp: Fingerprint,
    title: String,
    region: String,
    topic: String,
}

pub async fn run(pool: &PgPool, args: ClusterCmd) -> Result<()> {
    let log = telemetry::cluster();
    let _g = log.root_span_kv([
        ("hours", args.hours.to_string()),
        ("limit", args.limit.to_string()),
        ("max_distance", args.max_distance.to_string()),
    ]).entered();

    let store = PgStore::new(pool.clone());
    let report = cluster_batch(&store, hours_ago(args.hours), args.limit, args.max_distance).await?;

    if telemetry::config::json_mode() {
        log.result(&report)?;
    }
    Ok(())
}

pub async fn cluster_batch<R: Repository>(repo: &R, since: DateTime<Utc>, limit: i64, max_distance: u32) -> Result<ClusterReport> {
    let log = telemetry::cluster();
    let rows = {
        let _s = log.span(&ClusterPhase::SelectItems).entered();
        repo.cluster_candidates(since, limit).await?
    };
    let mut report = ClusterReport { candidates: rows.len(), ..Default::default() };
    if rows.is_empty() {
        log.info("ℹ️  No items in window");
        return Ok(report);
    }

    let prepared = {
        let _s = log.span_kv(&ClusterPhase::Fingerprint, [("candidates", rows.len().to_string())]).entered();
        let opts = FingerprintOpts::default();
        let mut out = Vec::new();
        for row in &rows {
            if row.linked {
                report.already_linked += 1;
                continue;
            }
            match prepare(row, &opts) {
                Some(p) => out.push(p),
                None => report.low_signal += 1,
            }
        }
        out
    };

    let mut index = {
        let _s = log.span(&ClusterPhase::LoadIndex).entered();
        let buckets: Vec<u16> = prepared.iter().map(|p| p.fp.bucket()).collect::<BTreeSet<_>>().into_iter().collect();
        if buckets.is_empty() { BucketIndex::default() } else { BucketIndex::from_events(repo.events_in_buckets(&buckets).await?) }
    };
    log.debug(format!("indexed {} events", index.len()));

    let mut touched: BTreeSet<i64> = BTreeSet::new();
    {
        let _s = log.span(&ClusterPhase::Assign).entered();
        for p in &prepared {
            let (target, key) = match index.nearest(p.fp, max_distance) {
                Some((event_id, _)) => (LinkTarget::Existing(event_id), None),
                None => {
                    let key = ClusterKey::from_fingerprint(p.fp);
                    (LinkTarget::Create(key.clone()), Some(key))
                }
            };
            let req = LinkRequest {
                item_id: p.item_id,
                target,
                title: p.title.clone(),
                region: p.region.clone(),
                topic: p.topic.clone(),
            };
            match repo.link_item(&req).await {
                Ok(LinkOutcome::Linked { event_id, created }) => {
                    report.items_linked += 1;
                    if created { report.events_created += 1; }
                    if let Some(key) = key { index.insert(event_id, key.fingerprint()); }
                    touched.insert(event_id);
                }
                Ok(LinkOutcome::AlreadyLinked) => report.already_linked += 1,
                Err(e) => {
                    report.failed += 1;
                    log.warn_kv("⚠️ link failed", [("item_id", p.item_id.to_string()), ("error", format!("{e:#}"))]);
                }
            }
        }
    }

    // every event linked in this run is rescored, whatever failed after it
    let scored = {
        let _s = log.span_kv(&ClusterPhase::Score, [("events", touched.len().to_string())]).entered();
        rescore(repo, touched.iter().copied()).await
    };
    report.events_scored = touched.len() - scored.failed;
    report.tiers_changed = scored.changed.len();
    report.failed += scored.failed;

    log.totals(report.events_created, report.items_linked, report.low_signal, report.already_linked, report.failed);
    Ok(report)
}

/// Recompute and store the evidence tier of each event. A failure on one
/// event is logged and counted; the others are still scored.
pub async fn rescore<R: Repository>(repo: &R, event_ids: impl IntoIterator<Item = i64>) -> Rescored {
    let log = telemetry::cluster();
    let mut out = Rescored::default();
    for event_id in event_ids {
        match score_one(repo, event_id).await {
            Ok(true) => { out.changed.insert(event_id); }
            Ok(false) => {}
            Err(e) => {
                out.failed += 1;
                log.warn_kv("⚠️ rescore failed", [("event_id", event_id.to_string()), ("error", format!("{e:#}"))]);
            }
        }
    }
    out
}

async fn score_one<R: Repository>(repo: &R, event_id: i64) -> Result<bool> {
    let members = repo.event_members(event_id).await?;
    let tier: EvidenceTier = evidence::score_members(&members);
    repo.set_evidence(event_id, tier).await
}

fn prepare(row: &CandidateRow, opts: &FingerprintOpts) -> Option<Prepared> {
    let fp = fingerprint_text(&candidate_text(row), opts)?;
    Some(Prepared {
        item_id: row.item_id,
        fp,
        title: candidate_title(row),
        region: row.region.clone(),
        topic: row.topic.clone(),
    })
}

/// Extracted article text, else the feed's title, summary and url.
pub fn candidate_text(row: &CandidateRow) -> String {
    match row.article_text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format!("{} {} {}", row.title, row.summary, row.url),
    }
}

pub fn candidate_title(row: &CandidateRow) -> String {
    let raw = match row.article_title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => row.title.as_str(),
    };
    truncate_chars(&sanitize(raw), MAX_TITLE_CHARS).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArticleRecord, Cadence, NewSource, SourceClass};
    use crate::store::memory::{Hooked, MemStore};

    const STORY: &str = "The harbour authority said container traffic fell sharply in March as a strike by crane \
        operators entered its third week and shipping lines diverted vessels to neighbouring ports while negotiators \
        met again on Friday to discuss pay and overtime rules for the coming year";

    const OTHER: &str = "Wildfire crews in the northern hills were reinforced overnight after shifting winds pushed \
        the flames toward two villages, prompting evacuation orders, road closures and emergency shelters opening in \
        the regional sports hall for displaced families and their animals";

    async fn source(store: &MemStore, url: &str, class: SourceClass, region: &str) -> i64 {
        store
            .upsert_source(&NewSource {
                name: url.into(),
                url: url.into(),
                region: region.into(),
                topic: "transport".into(),
                source_class: class,
                cadence: Cadence::Medium,
                is_enabled: true,
            })
            .await
            .unwrap();
        store.with(|s| s.sources.iter().find(|x| x.url == url).unwrap().source_id)
    }

    async fn with_article(store: &MemStore, source_id: i64, url: &str, title: &str, text: &str) -> i64 {
        let item_id = store.seed_item(source_id, url, "feed", "", None);
        let record = ArticleRecord {
            final_url: url.into(),
            title: title.into(),
            text: text.into(),
            lang: "en".into(),
            error: String::new(),
        };
        store.upsert_article(item_id, &record).await.unwrap();
        item_id
    }

    fn row(article_title: Option<&str>, article_text: Option<&str>) -> CandidateRow {
        CandidateRow {
            item_id: 1,
            url: "https://x.example/a".into(),
            title: "Feed  title".into(),
            summary: "Feed summary".into(),
            article_title: article_title.map(str::to_string),
            article_text: article_text.map(str::to_string),
            region: String::new(),
            topic: String::new(),
            linked: false,
        }
    }

    #[test]
    fn candidate_falls_back_to_feed_fields() {
        assert_eq!(candidate_text(&row(None, None)), "Feed  title Feed summary https://x.example/a");
        assert_eq!(candidate_text(&row(Some(""), Some("  "))), "Feed  title Feed summary https://x.example/a");
        assert_eq!(candidate_text(&row(None, Some("Body"))), "Body");
        assert_eq!(candidate_title(&row(Some(" "), None)), "Feed title");
        assert_eq!(candidate_title(&row(Some("Live: Port strike"), None)), "Port strike");
        assert_eq!(candidate_title(&row(Some(&"x".repeat(400)), None)).len(), MAX_TITLE_CHARS);
    }

    #[tokio::test]
    async fn copies_across_sources_form_one_confirmed_event() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "EU").await;
        let b = source(&store, "https://b.example/rss", SourceClass::Agency, "").await;
        let gov = source(&store, "https://gov.example/rss", SourceClass::Official, "").await;
        with_article(&store, a, "https://a.example/1", "Strike", STORY).await;
        with_article(&store, b, "https://www.b.example/2", "Port strike hits container traffic", STORY).await;
        with_article(&store, gov, "https://gov.example/3", "Statement", STORY).await;
        with_article(&store, a, "https://a.example/4", "Wildfire", OTHER).await;

        let report = cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();
        assert_eq!(report.items_linked, 4);
        assert_eq!(report.events_created, 2);
        assert_eq!(report.low_signal, 0);

        store.with(|s| {
            assert_eq!(s.events.len(), 2);
            let port = s.events.iter().find(|e| e.evidence == EvidenceTier::Confirmed).unwrap();
            assert_eq!(port.region, "EU");
            assert_eq!(port.topic, "transport");
            // a short founding title is upgraded by a longer one
            assert_eq!(port.title, "Port strike hits container traffic");
            assert!(port.cluster_key.starts_with("sh64:"));
            assert_eq!(port.cluster_key.len(), 21);
            let fire = s.events.iter().find(|e| e.event_id != port.event_id).unwrap();
            assert_eq!(fire.evidence, EvidenceTier::Unverified);
        });
    }

    #[tokio::test]
    async fn repeated_runs_link_each_item_once() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "").await;
        for i in 0..3 {
            with_article(&store, a, &format!("https://a.example/{i}"), "Port strike", STORY).await;
        }

        let first = cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();
        let second = cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();

        assert_eq!(first.items_linked, 3);
        assert_eq!(second.items_linked, 0);
        assert_eq!(second.already_linked, 3);
        assert_eq!(second.events_created, 0);
        store.with(|s| {
            assert_eq!(s.events.len(), 1);
            assert_eq!(s.links.len(), 3);
            // one domain, several items
            assert_eq!(s.events[0].evidence, EvidenceTier::Corroborated);
        });
    }

    #[tokio::test]
    async fn later_items_join_events_from_earlier_runs() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "").await;
        let b = source(&store, "https://b.example/rss", SourceClass::Local, "").await;
        with_article(&store, a, "https://a.example/1", "Port strike", STORY).await;
        cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();

        with_article(&store, b, "https://b.example/9", "Port strike", STORY).await;
        let report = cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();
        assert_eq!(report.events_created, 0);
        assert_eq!(report.items_linked, 1);
        assert_eq!(report.tiers_changed, 1);
        store.with(|s| {
            assert_eq!(s.events.len(), 1);
            assert_eq!(s.events[0].evidence, EvidenceTier::Strong);
        });
    }

    fn create_req(item_id: i64, key: &ClusterKey) -> LinkRequest {
        LinkRequest {
            item_id,
            target: LinkTarget::Create(key.clone()),
            title: "Port strike".into(),
            region: String::new(),
            topic: String::new(),
        }
    }

    #[tokio::test]
    async fn failed_link_does_not_stop_the_batch_or_scoring() {
        let store = MemStore::new();
        let gov = source(&store, "https://gov.example/rss", SourceClass::Official, "").await;
        for i in 0..3 {
            with_article(&store, gov, &format!("https://gov.example/{i}"), "Port strike", STORY).await;
        }
        let repo = Hooked::new(&store).failing_link_call(2);

        let report = cluster_batch(&repo, hours_ago(24), 100, 3).await.unwrap();
        assert_eq!(repo.link_calls(), 3);
        assert_eq!(report.items_linked, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.events_created, 1);
        assert_eq!(report.events_scored, 1);
        store.with(|s| {
            assert_eq!(s.links.len(), 2);
            assert_eq!(s.events[0].evidence, EvidenceTier::Strong);
        });

        // the skipped item is picked up by the next run
        let retry = cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();
        assert_eq!((retry.items_linked, retry.already_linked, retry.failed), (1, 2, 0));
        store.with(|s| assert_eq!(s.links.len(), 3));
    }

    #[tokio::test]
    async fn item_linked_after_selection_reports_already_linked() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "").await;
        let item = with_article(&store, a, "https://a.example/1", "Port strike", STORY).await;

        let rows = store.cluster_candidates(hours_ago(24), 10).await.unwrap();
        assert!(!rows[0].linked);

        let first = ClusterKey::from_fingerprint(Fingerprint::new(1));
        let other = ClusterKey::from_fingerprint(Fingerprint::new(2));
        assert!(matches!(store.link_item(&create_req(item, &first)).await.unwrap(), LinkOutcome::Linked { created: true, .. }));
        assert_eq!(store.link_item(&create_req(item, &other)).await.unwrap(), LinkOutcome::AlreadyLinked);
        store.with(|s| {
            assert_eq!(s.events.len(), 1);
            assert_eq!(s.links.len(), 1);
        });
    }

    #[tokio::test]
    async fn create_on_existing_key_joins_that_event() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "").await;
        let x = with_article(&store, a, "https://a.example/1", "Port strike", STORY).await;
        let y = with_article(&store, a, "https://a.example/2", "Port strike", STORY).await;
        let key = ClusterKey::from_fingerprint(Fingerprint::new(0xabcd_0000_0000_0001));

        let LinkOutcome::Linked { event_id, created } = store.link_item(&create_req(x, &key)).await.unwrap() else {
            panic!("first link should succeed");
        };
        assert!(created);
        assert_eq!(
            store.link_item(&create_req(y, &key)).await.unwrap(),
            LinkOutcome::Linked { event_id, created: false }
        );
        store.with(|s| {
            assert_eq!(s.events.len(), 1);
            assert_eq!(s.links.get(&y), Some(&event_id));
        });
    }

    #[tokio::test]
    async fn overlapping_runs_link_each_item_once() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "").await;
        for i in 0..3 {
            with_article(&store, a, &format!("https://a.example/{i}"), "Port strike", STORY).await;
        }
        let left = Hooked::new(&store).yielding();
        let right = Hooked::new(&store).yielding();

        let (l, r) = tokio::join!(
            cluster_batch(&left, hours_ago(24), 100, 3),
            cluster_batch(&right, hours_ago(24), 100, 3),
        );
        let (l, r) = (l.unwrap(), r.unwrap());

        // both runs selected all three items before either linked one
        assert_eq!(l.items_linked + l.already_linked, 3);
        assert_eq!(r.items_linked + r.already_linked, 3);
        assert_eq!(l.items_linked + r.items_linked, 3);
        assert_eq!(l.events_created + r.events_created, 1);
        store.with(|s| {
            assert_eq!(s.links.len(), 3);
            assert_eq!(s.events.len(), 1);
            assert_eq!(s.events[0].evidence, EvidenceTier::Corroborated);
        });
    }

    #[tokio::test]
    async fn thin_items_are_skipped() {
        let store = MemStore::new();
        let a = source(&store, "https://a.example/rss", SourceClass::Agency, "").await;
        store.seed_item(a, "https://a.example/short", "Breaking", "Short teaser", None);

        let report = cluster_batch(&store, hours_ago(24), 100, 3).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.low_signal, 1);
        assert_eq!(report.items_linked, 0);
        store.with(|s| assert!(s.events.is_empty()));
    }
}
