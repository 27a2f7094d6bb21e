//! Storage seam for the pipeline. Every mutating method is one atomic unit;
//! uniqueness violations surface as "already handled" outcomes, never errors.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{
    ArticleRecord, CandidateRow, ClusterKey, EventRow, EvidenceTier, FetchCommit, IndexedEvent, MemberRow, NewSource,
    PendingItem, Source, SummarySource,
};

mod pg;
#[cfg(test)]
pub mod memory;

pub use pg::PgStore;

/// Where a candidate item should be linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    Existing(i64),
    /// Create an event under this key, or join the one that already holds it.
    Create(ClusterKey),
}

#[derive(Clone, Debug)]
pub struct LinkRequest {
    pub item_id: i64,
    pub target: LinkTarget,
    pub title: String,
    pub region: String,
    pub topic: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked { event_id: i64, created: bool },
    AlreadyLinked,
}

pub trait Repository {
    /// Insert or update a source by url. Returns true when inserted.
    async fn upsert_source(&self, src: &NewSource) -> Result<bool>;
    async fn list_sources(&self, enabled: Option<bool>) -> Result<Vec<Source>>;
    /// Enabled sources, least recently fetched first.
    async fn sources_for_fetch(&self, limit: i64) -> Result<Vec<Source>>;
    /// Apply one fetch attempt. Returns the number of items created.
    async fn commit_fetch(&self, commit: &FetchCommit) -> Result<usize>;

    /// Items with a url and no article, newest first. With `retry_failed`,
    /// items whose article only recorded an error qualify too.
    async fn items_for_extraction(&self, limit: i64, retry_failed: bool) -> Result<Vec<PendingItem>>;
    async fn upsert_article(&self, item_id: i64, article: &ArticleRecord) -> Result<()>;

    async fn cluster_candidates(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CandidateRow>>;
    /// Events whose cluster key falls in one of `buckets`, in creation order.
    async fn events_in_buckets(&self, buckets: &[u16]) -> Result<Vec<IndexedEvent>>;
    async fn link_item(&self, req: &LinkRequest) -> Result<LinkOutcome>;

    async fn event_members(&self, event_id: i64) -> Result<Vec<MemberRow>>;
    /// Returns true when the stored tier changed.
    async fn set_evidence(&self, event_id: i64, tier: EvidenceTier) -> Result<bool>;

    async fn events_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<EventRow>>;
    async fn summary_sources(&self, event_ids: &[i64]) -> Result<Vec<SummarySource>>;
    async fn store_summary(&self, event_id: i64, summary: &str, touch_updated_at: bool) -> Result<()>;

    /// Events at or above `min` updated since `since`, strongest tier first,
    /// then most recent.
    async fn brief_events(&self, since: DateTime<Utc>, min: EvidenceTier) -> Result<Vec<EventRow>>;
}
