use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use rss::{Channel, Item};
use sha2::{Digest, Sha256};

use crate::model::NewItem;

/// One entry as produced by a feed parser.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    /// Raw date string as published; part of the fallback dedup key.
    pub published: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Feed parsing capability: body bytes (+ content type) to entries.
pub trait FeedParser {
    fn parse(&self, body: &[u8], content_type: Option<&str>) -> Result<Vec<FeedEntry>>;
}

/// RSS 2.0 parser backed by the `rss` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct RssParser;

impl FeedParser for RssParser {
    fn parse(&self, body: &[u8], _content_type: Option<&str>) -> Result<Vec<FeedEntry>> {
        let channel = Channel::read_from(body).context("parse rss channel")?;
        Ok(channel.items().iter().map(entry_from_item).collect())
    }
}

/// Atom (and RSS 1.0 / JSON Feed) parser backed by `feed-rs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomParser;

impl FeedParser for AtomParser {
    fn parse(&self, body: &[u8], _content_type: Option<&str>) -> Result<Vec<FeedEntry>> {
        let feed = feed_rs::parser::parse(body).context("parse atom feed")?;
        Ok(feed.entries.into_iter().map(entry_from_atom).collect())
    }
}

/// RSS 2.0 first, then anything `feed-rs` understands.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyFeedParser;

impl FeedParser for AnyFeedParser {
    fn parse(&self, body: &[u8], content_type: Option<&str>) -> Result<Vec<FeedEntry>> {
        RssParser
            .parse(body, content_type)
            .or_else(|_| AtomParser.parse(body, content_type))
            .context("not an RSS or Atom feed")
    }
}

fn entry_from_atom(entry: Entry) -> FeedEntry {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());
    let published_at = entry.published.or(entry.updated);
    FeedEntry {
        id: Some(entry.id).filter(|id| !id.is_empty()),
        link,
        title: entry.title.map(|t| t.content),
        summary: entry.summary.map(|t| t.content).or_else(|| entry.content.and_then(|c| c.body)),
        published: published_at.map(|d| d.to_rfc3339()),
        published_at,
    }
}

fn entry_from_item(item: &Item) -> FeedEntry {
    let published = item
        .pub_date()
        .map(str::to_string)
        .or_else(|| item.dublin_core_ext().and_then(|dc| dc.dates().first().cloned()));
    FeedEntry {
        id: item.guid().map(|g| g.value().to_string()),
        link: item.link().map(str::to_string),
        title: item.title().map(str::to_string),
        summary: item.description().map(str::to_string),
        published_at: published.as_deref().and_then(parse_published),
        published,
    }
}

/// RFC 2822 (RSS pubDate) or RFC 3339 (Dublin Core date).
pub fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) { return Some(dt.with_timezone(&Utc)); }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.with_timezone(&Utc)); }
    None
}

fn non_empty(s: &Option<String>) -> Option<&str> { s.as_deref().filter(|v| !v.is_empty()) }

/// sha256 hex of the entry id, else of link + published + title.
pub fn item_hash(entry: &FeedEntry) -> String {
    let base = match non_empty(&entry.id) {
        Some(id) => id.to_string(),
        None => [&entry.link, &entry.published, &entry.title].iter().map(|v| v.as_deref().unwrap_or("")).collect(),
    };
    hex::encode(Sha256::digest(base.as_bytes()))
}

pub fn to_new_item(entry: &FeedEntry) -> NewItem {
    NewItem {
        item_hash: item_hash(entry),
        guid: entry.id.clone().unwrap_or_default(),
        url: entry.link.clone().unwrap_or_default().trim().to_string(),
        title: entry.title.clone().unwrap_or_default().trim().to_string(),
        summary: entry.summary.clone().unwrap_or_default(),
        published_at: entry.published_at,
    }
}
