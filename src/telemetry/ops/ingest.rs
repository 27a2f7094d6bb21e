use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Ingest;

#[derive(Copy, Clone, Debug)]
pub enum Phase { SelectSources, Source, FetchFeed, ParseFeed, WriteItems }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::SelectSources => "select_sources",
        Phase::Source => "source",
        Phase::FetchFeed => "fetch_feed",
        Phase::ParseFeed => "parse_feed",
        Phase::WriteItems => "write_items",
    }}
    fn span(&self) -> Span { match self {
        Phase::SelectSources => info_span!("select_sources"),
        Phase::Source => info_span!("source"),
        Phase::FetchFeed => info_span!("fetch_feed"),
        Phase::ParseFeed => info_span!("parse_feed"),
        Phase::WriteItems => info_span!("write_items"),
    }}
}

impl OpMarker for Ingest {
    const NAME: &'static str = "ingest";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("ingest") }
}
