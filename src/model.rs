use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fingerprint::Fingerprint;

/// Editorial class of a source. Drives the evidence tier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceClass {
    Agency,
    Official,
    Stats,
    Industry,
    Commentary,
    Local,
    Independent,
}

impl SourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceClass::Agency => "agency",
            SourceClass::Official => "official",
            SourceClass::Stats => "stats",
            SourceClass::Industry => "industry",
            SourceClass::Commentary => "commentary",
            SourceClass::Local => "local",
            SourceClass::Independent => "independent",
        }
    }
}

impl FromStr for SourceClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "agency" => SourceClass::Agency,
            "official" => SourceClass::Official,
            "stats" => SourceClass::Stats,
            "industry" => SourceClass::Industry,
            "commentary" => SourceClass::Commentary,
            "local" => SourceClass::Local,
            "independent" => SourceClass::Independent,
            other => bail!("unknown source class: {other}"),
        })
    }
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Informational polling cadence. Scheduling is round-robin by last fetch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hot,
    Medium,
    Cold,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Hot => "hot",
            Cadence::Medium => "medium",
            Cadence::Cold => "cold",
        }
    }
}

impl FromStr for Cadence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Cadence::Hot,
            "medium" => Cadence::Medium,
            "cold" => Cadence::Cold,
            other => bail!("unknown cadence: {other}"),
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Source {
    pub source_id: i64,
    pub name: String,
    pub url: String,
    pub region: String,
    pub topic: String,
    pub source_class: SourceClass,
    pub cadence: Cadence,
    pub is_enabled: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub region: String,
    pub topic: String,
    pub source_class: SourceClass,
    pub cadence: Cadence,
    pub is_enabled: bool,
}

/// HTTP cache validators stored on a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchLogEntry {
    pub status_code: Option<i32>,
    pub elapsed_ms: i64,
    pub bytes_received: i64,
    pub error: Option<String>,
}

/// A feed entry ready to be stored under (source, item_hash).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewItem {
    pub item_hash: String,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Everything one fetch attempt writes, committed as a single unit.
#[derive(Clone, Debug)]
pub struct FetchCommit {
    pub source_id: i64,
    pub log: FetchLogEntry,
    /// `Some` replaces the stored validators, `None` keeps them.
    pub validators: Option<Validators>,
    pub items: Vec<NewItem>,
}

#[derive(Clone, Debug)]
pub struct PendingItem {
    pub item_id: i64,
    pub url: String,
    pub title: String,
}

/// Outcome of one extraction, stored idempotently by item id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArticleRecord {
    pub final_url: String,
    pub title: String,
    pub text: String,
    pub lang: String,
    pub error: String,
}

/// A raw item in the clustering window with its article and source context.
#[derive(Clone, Debug)]
pub struct CandidateRow {
    pub item_id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub article_title: Option<String>,
    pub article_text: Option<String>,
    pub region: String,
    pub topic: String,
    pub linked: bool,
}

/// Stable, immutable identifier of an event: `sh64:` + 16 hex digits of the
/// founding fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ClusterKey(String);

impl ClusterKey {
    const PREFIX: &'static str = "sh64:";

    pub fn from_fingerprint(fp: Fingerprint) -> Self { ClusterKey(format!("{}{:016x}", Self::PREFIX, fp.bits())) }

    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix(Self::PREFIX)?;
        if hex.len() != 16 { return None; }
        u64::from_str_radix(hex, 16).ok()?;
        Some(ClusterKey(s.to_string()))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let hex = &self.0[Self::PREFIX.len()..];
        Fingerprint::new(u64::from_str_radix(hex, 16).unwrap_or_default())
    }

    /// The four hex digits encoding the locality bucket.
    pub fn bucket_hex(bucket: u16) -> String { format!("{bucket:04x}") }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Clone, Debug)]
pub struct IndexedEvent {
    pub event_id: i64,
    pub key: ClusterKey,
}

/// Ordinal corroboration confidence of an event.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EvidenceTier {
    /// Single unverified source.
    #[default]
    Unverified = 0,
    /// Repeated coverage or more than one domain.
    Corroborated = 1,
    /// Official source, or several items across domains.
    Strong = 2,
    /// Three or more items across at least two editorial classes.
    Confirmed = 3,
}

impl EvidenceTier {
    pub fn level(self) -> i16 { self as i16 }

    pub fn from_level(level: i16) -> Self {
        match level {
            i16::MIN..=0 => EvidenceTier::Unverified,
            1 => EvidenceTier::Corroborated,
            2 => EvidenceTier::Strong,
            _ => EvidenceTier::Confirmed,
        }
    }
}

/// One linked item as seen by the evidence scorer.
#[derive(Clone, Debug)]
pub struct MemberRow {
    pub url: String,
    pub final_url: Option<String>,
    pub source_class: SourceClass,
}

#[derive(Clone, Debug, Serialize)]
pub struct EventRow {
    pub event_id: i64,
    pub cluster_key: String,
    pub title: String,
    pub summary: String,
    pub region: String,
    pub topic: String,
    pub evidence: EvidenceTier,
    pub updated_at: DateTime<Utc>,
}

/// Texts of one linked item, in fallback order for the summary rebuilder.
#[derive(Clone, Debug)]
pub struct SummarySource {
    pub event_id: i64,
    pub item_id: i64,
    pub article_text: Option<String>,
    pub raw_summary: String,
    pub raw_title: String,
}
