use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, Span};

use super::emit;

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span { ph.span() }

    pub fn span_kv<'a, T>(&self, ph: &O::Phase, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.span(ph);
        let details = kv_to_string(fields);
        if details.is_empty() {
            debug!(op = %self.op_name(), phase = ph.name(), "span_start");
        } else {
            debug!(op = %self.op_name(), phase = ph.name(), details = %details, "span_start");
        }
        span
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }
    pub fn debug(&self, msg: impl AsRef<str>) { if self.json { debug!(op = %self.op_name(), "{}", msg.as_ref()); } else { debug!("{}", msg.as_ref()); } }

    pub fn info_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        let details = kv_to_string(kv);
        if self.json { info!(op = %self.op_name(), details = %details, "{}", msg); }
        else { info!("{} {}", msg, details); }
    }

    pub fn warn_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        let details = kv_to_string(kv);
        if self.json { warn!(op = %self.op_name(), details = %details, "{}", msg); }
        else { warn!("{} {}", msg, details); }
    }

    pub fn result<T: Serialize>(&self, result: &T) -> Result<()> { emit::print_result(self.op_name(), result) }
}

impl LogCtx<crate::telemetry::ops::ingest::Ingest> {
    pub fn source_summary(&self, source_id: i64, status: Option<i32>, created: usize, elapsed_ms: i64) {
        let status = status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        if self.json { info!(op = %self.op_name(), source_id, status = %status, created, elapsed_ms, "source_summary"); }
        else { info!("✅ Source {} — status={} created={} {}ms", source_id, status, created, elapsed_ms); }
    }

    pub fn totals(&self, sources: usize, created: usize, not_modified: usize, failed: usize) {
        if self.json { info!(op = %self.op_name(), sources, created, not_modified, failed, "ingest_totals"); }
        else { info!("📊 Ingest totals — sources={} created={} not_modified={} failed={}", sources, created, not_modified, failed); }
    }
}

impl LogCtx<crate::telemetry::ops::extract::Extract> {
    pub fn item_outcome(&self, item_id: i64, ok: bool, elapsed_ms: i64, title: &str, error: &str) {
        let status = if ok { "OK" } else { "FAIL" };
        if self.json {
            info!(op = %self.op_name(), item_id, status, elapsed_ms, title, error, "item_outcome");
        } else if ok {
            info!("[{}] {}ms item={} {}", status, elapsed_ms, item_id, title);
        } else {
            info!("[{}] {}ms item={} {} | {}", status, elapsed_ms, item_id, title, error);
        }
    }

    pub fn totals(&self, ok: usize, failed: usize) {
        if self.json { info!(op = %self.op_name(), ok, failed, "extract_totals"); }
        else { info!("📊 Extract totals — ok={} failed={}", ok, failed); }
    }
}

impl LogCtx<crate::telemetry::ops::cluster::Cluster> {
    pub fn totals(&self, events_created: usize, items_linked: usize, low_signal: usize, already_linked: usize, failed: usize) {
        if self.json { info!(op = %self.op_name(), events_created, items_linked, low_signal, already_linked, failed, "cluster_totals"); }
        else {
            info!(
                "📊 Events upserted: {}, items linked: {} (low_signal={} already_linked={} failed={})",
                events_created, items_linked, low_signal, already_linked, failed
            );
        }
    }
}

impl LogCtx<crate::telemetry::ops::summaries::Summaries> {
    pub fn totals(&self, updated: usize, no_text: usize, unchanged: usize, failed: usize) {
        if self.json { info!(op = %self.op_name(), updated, no_text, unchanged, failed, "summary_totals"); }
        else { info!("📊 Updated summaries: {} (no_text={} unchanged={} failed={})", updated, no_text, unchanged, failed); }
    }
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}
