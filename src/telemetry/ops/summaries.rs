use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Summaries;

#[derive(Copy, Clone, Debug)]
pub enum Phase { SelectEvents, LoadTexts, Write }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::SelectEvents => "select_events",
        Phase::LoadTexts => "load_texts",
        Phase::Write => "write",
    }}
    fn span(&self) -> Span { match self {
        Phase::SelectEvents => info_span!("select_events"),
        Phase::LoadTexts => info_span!("load_texts"),
        Phase::Write => info_span!("write"),
    }}
}

impl OpMarker for Summaries {
    const NAME: &'static str = "rebuild-summaries";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("rebuild_summaries") }
}
