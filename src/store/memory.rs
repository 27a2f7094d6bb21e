//! In-memory repository with the same uniqueness rules as the schema.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};

use crate::cluster::enrich::{enrich, Descriptors};
use crate::model::{
    ArticleRecord, CandidateRow, ClusterKey, EventRow, EvidenceTier, FetchCommit, FetchLogEntry, IndexedEvent,
    MemberRow, NewSource, PendingItem, Source, SummarySource,
};

use super::{LinkOutcome, LinkRequest, LinkTarget, Repository};

#[derive(Clone, Debug)]
pub struct StoredItem {
    pub item_id: i64,
    pub source_id: i64,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub item_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemState {
    pub sources: Vec<Source>,
    pub fetch_logs: Vec<(i64, FetchLogEntry)>,
    pub items: Vec<StoredItem>,
    pub articles: BTreeMap<i64, ArticleRecord>,
    pub events: Vec<EventRow>,
    /// item_id -> event_id
    pub links: BTreeMap<i64, i64>,
    next_id: i64,
}

impl MemState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn event_mut(&mut self, event_id: i64) -> Result<&mut EventRow> {
        self.events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or_else(|| anyhow!("event {event_id} not found"))
    }
}

#[derive(Default)]
pub struct MemStore {
    pub state: Mutex<MemState>,
}

impl MemStore {
    pub fn new() -> Self { MemStore::default() }

    pub fn with<T>(&self, f: impl FnOnce(&mut MemState) -> T) -> T {
        let mut guard = self.state.lock().expect("state mutex poisoned");
        f(&mut guard)
    }

    /// Seed an item directly, bypassing the fetcher.
    pub fn seed_item(&self, source_id: i64, url: &str, title: &str, summary: &str, published_at: Option<DateTime<Utc>>) -> i64 {
        self.with(|s| {
            let item_id = s.next_id();
            s.items.push(StoredItem {
                item_id,
                source_id,
                guid: String::new(),
                url: url.to_string(),
                title: title.to_string(),
                summary: summary.to_string(),
                published_at,
                item_hash: format!("seed-{item_id}"),
                created_at: Utc::now(),
            });
            item_id
        })
    }

    fn in_window(item: &StoredItem, since: DateTime<Utc>) -> bool {
        match item.published_at {
            Some(p) => p >= since,
            None => item.created_at >= since,
        }
    }

    fn newest_first(items: &mut [&StoredItem]) {
        // published DESC NULLS LAST, created DESC
        items.sort_by(|a, b| match (a.published_at, b.published_at) {
            (Some(x), Some(y)) => y.cmp(&x).then(b.created_at.cmp(&a.created_at)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        });
    }
}

impl Repository for MemStore {
    async fn upsert_source(&self, src: &NewSource) -> Result<bool> {
        Ok(self.with(|s| {
            if let Some(existing) = s.sources.iter_mut().find(|x| x.url == src.url) {
                existing.name = src.name.clone();
                existing.region = src.region.clone();
                existing.topic = src.topic.clone();
                existing.source_class = src.source_class;
                existing.cadence = src.cadence;
                existing.is_enabled = src.is_enabled;
                return false;
            }
            let source_id = s.next_id();
            s.sources.push(Source {
                source_id,
                name: src.name.clone(),
                url: src.url.clone(),
                region: src.region.clone(),
                topic: src.topic.clone(),
                source_class: src.source_class,
                cadence: src.cadence,
                is_enabled: src.is_enabled,
                last_fetch_at: None,
                etag: None,
                last_modified: None,
            });
            true
        }))
    }

    async fn list_sources(&self, enabled: Option<bool>) -> Result<Vec<Source>> {
        Ok(self.with(|s| s.sources.iter().filter(|x| enabled.is_none_or(|e| x.is_enabled == e)).cloned().collect()))
    }

    async fn sources_for_fetch(&self, limit: i64) -> Result<Vec<Source>> {
        Ok(self.with(|s| {
            let mut out: Vec<Source> = s.sources.iter().filter(|x| x.is_enabled).cloned().collect();
            // None sorts before Some, matching NULLS FIRST
            out.sort_by_key(|x| (x.last_fetch_at, x.source_id));
            out.truncate(limit.max(0) as usize);
            out
        }))
    }

    async fn commit_fetch(&self, commit: &FetchCommit) -> Result<usize> {
        self.with(|s| {
            let now = Utc::now();
            let mut created = 0usize;
            for it in &commit.items {
                let dup = s.items.iter().any(|x| x.source_id == commit.source_id && x.item_hash == it.item_hash);
                if dup { continue; }
                let item_id = s.next_id();
                s.items.push(StoredItem {
                    item_id,
                    source_id: commit.source_id,
                    guid: it.guid.clone(),
                    url: it.url.clone(),
                    title: it.title.clone(),
                    summary: it.summary.clone(),
                    published_at: it.published_at,
                    item_hash: it.item_hash.clone(),
                    created_at: now,
                });
                created += 1;
            }
            s.fetch_logs.push((commit.source_id, commit.log.clone()));
            let src = s
                .sources
                .iter_mut()
                .find(|x| x.source_id == commit.source_id)
                .ok_or_else(|| anyhow!("source {} not found", commit.source_id))?;
            src.last_fetch_at = Some(now);
            if let Some(v) = &commit.validators {
                src.etag = v.etag.clone();
                src.last_modified = v.last_modified.clone();
            }
            Ok(created)
        })
    }

    async fn items_for_extraction(&self, limit: i64, retry_failed: bool) -> Result<Vec<PendingItem>> {
        Ok(self.with(|s| {
            let mut items: Vec<&StoredItem> = s
                .items
                .iter()
                .filter(|i| !i.url.is_empty())
                .filter(|i| match s.articles.get(&i.item_id) {
                    None => true,
                    Some(a) => retry_failed && !a.error.is_empty() && a.text.is_empty(),
                })
                .collect();
            Self::newest_first(&mut items);
            items
                .into_iter()
                .take(limit.max(0) as usize)
                .map(|i| PendingItem { item_id: i.item_id, url: i.url.clone(), title: i.title.clone() })
                .collect()
        }))
    }

    async fn upsert_article(&self, item_id: i64, article: &ArticleRecord) -> Result<()> {
        self.with(|s| {
            s.articles.insert(item_id, article.clone());
        });
        Ok(())
    }

    async fn cluster_candidates(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CandidateRow>> {
        self.with(|s| {
            let mut items: Vec<&StoredItem> = s.items.iter().filter(|i| Self::in_window(i, since)).collect();
            Self::newest_first(&mut items);
            items
                .into_iter()
                .take(limit.max(0) as usize)
                .map(|i| {
                    let src = s
                        .sources
                        .iter()
                        .find(|x| x.source_id == i.source_id)
                        .ok_or_else(|| anyhow!("source {} not found", i.source_id))?;
                    let art = s.articles.get(&i.item_id);
                    Ok(CandidateRow {
                        item_id: i.item_id,
                        url: i.url.clone(),
                        title: i.title.clone(),
                        summary: i.summary.clone(),
                        article_title: art.map(|a| a.title.clone()),
                        article_text: art.map(|a| a.text.clone()),
                        region: src.region.clone(),
                        topic: src.topic.clone(),
                        linked: s.links.contains_key(&i.item_id),
                    })
                })
                .collect()
        })
    }

    async fn events_in_buckets(&self, buckets: &[u16]) -> Result<Vec<IndexedEvent>> {
        Ok(self.with(|s| {
            s.events
                .iter()
                .filter_map(|e| ClusterKey::parse(&e.cluster_key).map(|key| (e.event_id, key)))
                .filter(|(_, key)| buckets.contains(&key.fingerprint().bucket()))
                .map(|(event_id, key)| IndexedEvent { event_id, key })
                .collect()
        }))
    }

    async fn link_item(&self, req: &LinkRequest) -> Result<LinkOutcome> {
        self.with(|s| {
            if s.links.contains_key(&req.item_id) { return Ok(LinkOutcome::AlreadyLinked); }

            let (event_id, created) = match &req.target {
                LinkTarget::Existing(id) => (*id, false),
                LinkTarget::Create(key) => match s.events.iter().find(|e| e.cluster_key == key.as_str()) {
                    Some(e) => (e.event_id, false),
                    None => {
                        let event_id = s.next_id();
                        s.events.push(EventRow {
                            event_id,
                            cluster_key: key.to_string(),
                            title: String::new(),
                            summary: String::new(),
                            region: String::new(),
                            topic: String::new(),
                            evidence: EvidenceTier::Unverified,
                            updated_at: Utc::now(),
                        });
                        (event_id, true)
                    }
                },
            };

            let ev = s.event_mut(event_id)?;
            let current = Descriptors { title: ev.title.clone(), region: ev.region.clone(), topic: ev.topic.clone() };
            let cand = Descriptors { title: req.title.clone(), region: req.region.clone(), topic: req.topic.clone() };
            if let Some(next) = enrich(&current, &cand) {
                ev.title = next.title;
                ev.region = next.region;
                ev.topic = next.topic;
            }
            ev.updated_at = Utc::now();
            s.links.insert(req.item_id, event_id);
            Ok(LinkOutcome::Linked { event_id, created })
        })
    }

    async fn event_members(&self, event_id: i64) -> Result<Vec<MemberRow>> {
        self.with(|s| {
            s.links
                .iter()
                .filter(|(_, ev)| **ev == event_id)
                .map(|(item_id, _)| {
                    let item = s.items.iter().find(|i| i.item_id == *item_id).ok_or_else(|| anyhow!("item {item_id} not found"))?;
                    let src = s.sources.iter().find(|x| x.source_id == item.source_id).ok_or_else(|| anyhow!("source not found"))?;
                    let final_url = s.articles.get(item_id).map(|a| a.final_url.clone()).filter(|u| !u.is_empty());
                    Ok(MemberRow { url: item.url.clone(), final_url, source_class: src.source_class })
                })
                .collect()
        })
    }

    async fn set_evidence(&self, event_id: i64, tier: EvidenceTier) -> Result<bool> {
        self.with(|s| {
            let ev = s.event_mut(event_id)?;
            if ev.evidence == tier { return Ok(false); }
            ev.evidence = tier;
            Ok(true)
        })
    }

    async fn events_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<EventRow>> {
        Ok(self.with(|s| {
            let mut out: Vec<EventRow> = s.events.iter().cloned().filter(|e| e.updated_at >= since).collect();
            out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            out
        }))
    }

    async fn summary_sources(&self, event_ids: &[i64]) -> Result<Vec<SummarySource>> {
        Ok(self.with(|s| {
            s.links
                .iter()
                .filter(|(_, ev)| event_ids.contains(ev))
                .filter_map(|(item_id, ev)| {
                    let item = s.items.iter().find(|i| i.item_id == *item_id)?;
                    Some(SummarySource {
                        event_id: *ev,
                        item_id: *item_id,
                        article_text: s.articles.get(item_id).map(|a| a.text.clone()),
                        raw_summary: item.summary.clone(),
                        raw_title: item.title.clone(),
                    })
                })
                .collect()
        }))
    }

    async fn store_summary(&self, event_id: i64, summary: &str, touch_updated_at: bool) -> Result<()> {
        self.with(|s| {
            let ev = s.event_mut(event_id)?;
            ev.summary = summary.to_string();
            if touch_updated_at { ev.updated_at = Utc::now(); }
            Ok(())
        })
    }

    async fn brief_events(&self, since: DateTime<Utc>, min: EvidenceTier) -> Result<Vec<EventRow>> {
        Ok(self.with(|s| {
            let mut out: Vec<EventRow> =
                s.events.iter().cloned().filter(|e| e.updated_at >= since && e.evidence >= min).collect();
            out.sort_by(|a, b| b.evidence.cmp(&a.evidence).then(b.updated_at.cmp(&a.updated_at)));
            out
        }))
    }
}

/// Wraps a `MemStore` to inject failures and suspension points into the
/// linking and summary writes.
pub struct Hooked<'a> {
    inner: &'a MemStore,
    /// 1-based `link_item` call that fails.
    fail_link_call: Option<usize>,
    fail_summary_for: Option<i64>,
    yield_before_link: bool,
    link_calls: AtomicUsize,
}

impl<'a> Hooked<'a> {
    pub fn new(inner: &'a MemStore) -> Self {
        Hooked { inner, fail_link_call: None, fail_summary_for: None, yield_before_link: false, link_calls: AtomicUsize::new(0) }
    }

    pub fn failing_link_call(mut self, call: usize) -> Self {
        self.fail_link_call = Some(call);
        self
    }

    pub fn failing_summary_for(mut self, event_id: i64) -> Self {
        self.fail_summary_for = Some(event_id);
        self
    }

    /// Yield to the scheduler before each `link_item`.
    pub fn yielding(mut self) -> Self {
        self.yield_before_link = true;
        self
    }

    pub fn link_calls(&self) -> usize { self.link_calls.load(Ordering::SeqCst) }
}

impl Repository for Hooked<'_> {
    async fn upsert_source(&self, src: &NewSource) -> Result<bool> { self.inner.upsert_source(src).await }
    async fn list_sources(&self, enabled: Option<bool>) -> Result<Vec<Source>> { self.inner.list_sources(enabled).await }
    async fn sources_for_fetch(&self, limit: i64) -> Result<Vec<Source>> { self.inner.sources_for_fetch(limit).await }
    async fn commit_fetch(&self, commit: &FetchCommit) -> Result<usize> { self.inner.commit_fetch(commit).await }

    async fn items_for_extraction(&self, limit: i64, retry_failed: bool) -> Result<Vec<PendingItem>> {
        self.inner.items_for_extraction(limit, retry_failed).await
    }
    async fn upsert_article(&self, item_id: i64, article: &ArticleRecord) -> Result<()> {
        self.inner.upsert_article(item_id, article).await
    }

    async fn cluster_candidates(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CandidateRow>> {
        self.inner.cluster_candidates(since, limit).await
    }
    async fn events_in_buckets(&self, buckets: &[u16]) -> Result<Vec<IndexedEvent>> { self.inner.events_in_buckets(buckets).await }

    async fn link_item(&self, req: &LinkRequest) -> Result<LinkOutcome> {
        if self.yield_before_link { tokio::task::yield_now().await; }
        let call = self.link_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_link_call == Some(call) { bail!("connection reset"); }
        self.inner.link_item(req).await
    }

    async fn event_members(&self, event_id: i64) -> Result<Vec<MemberRow>> { self.inner.event_members(event_id).await }
    async fn set_evidence(&self, event_id: i64, tier: EvidenceTier) -> Result<bool> { self.inner.set_evidence(event_id, tier).await }

    async fn events_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<EventRow>> { self.inner.events_updated_since(since).await }
    async fn summary_sources(&self, event_ids: &[i64]) -> Result<Vec<SummarySource>> { self.inner.summary_sources(event_ids).await }
    async fn store_summary(&self, event_id: i64, summary: &str, touch_updated_at: bool) -> Result<()> {
        if self.fail_summary_for == Some(event_id) { bail!("connection reset"); }
        self.inner.store_summary(event_id, summary, touch_updated_at).await
    }

    async fn brief_events(&self, since: DateTime<Utc>, min: EvidenceTier) -> Result<Vec<EventRow>> { self.inner.brief_events(since, min).await }
}
