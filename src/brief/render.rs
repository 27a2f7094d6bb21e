use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::model::EventRow;
use crate::text::collapse_whitespace;

static LIVE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*Live:\s*").expect("static regex"));
static LOADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfrom loading(?:\s*\.)*").expect("static regex"));

#[derive(Clone, Debug, Serialize)]
pub struct BriefEntry {
    pub event_id: i64,
    pub level: i16,
    pub title: String,
    pub summary: String,
    pub region: String,
    pub topic: String,
    pub cluster_key: String,
}

pub fn clean_title(t: &str) -> String { collapse_whitespace(&LIVE_PREFIX_RE.replace(t.trim(), "")) }

pub fn clean_summary(s: &str) -> String { collapse_whitespace(&LOADING_RE.replace_all(s.trim(), "")) }

/// Events worth showing. Events without a summary are left out.
pub fn entries(events: &[EventRow]) -> Vec<BriefEntry> {
    events
        .iter()
        .filter_map(|ev| {
            let summary = clean_summary(&ev.summary);
            if summary.is_empty() { return None; }
            let title = match clean_title(&ev.title) {
                t if t.is_empty() => format!("Event {}", ev.event_id),
                t => t,
            };
            Some(BriefEntry {
                event_id: ev.event_id,
                level: ev.evidence.level(),
                title,
                summary,
                region: ev.region.clone(),
                topic: ev.topic.clone(),
                cluster_key: ev.cluster_key.clone(),
            })
        })
        .collect()
}

pub fn header(hours: i64) -> String { format!("# News brief — last {hours}h") }

pub fn markdown(hours: i64, entries: &[BriefEntry]) -> String {
    let mut out = header(hours);
    out.push('\n');
    for e in entries {
        let _ = writeln!(out, "## L{} — {}", e.level, e.title);
        let _ = writeln!(out, "{}", e.summary);
        out.push('\n');
        let _ = writeln!(out, "- Region: `{}`  Topic: `{}`", e.region, e.topic);
        let _ = writeln!(out, "- Cluster: `{}`", e.cluster_key);
        out.push('\n');
    }
    out
}
