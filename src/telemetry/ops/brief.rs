use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Brief;

#[derive(Copy, Clone, Debug)]
pub enum Phase { SelectEvents, Render }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::SelectEvents => "select_events", Phase::Render => "render" } }
    fn span(&self) -> Span { match self { Phase::SelectEvents => info_span!("select_events"), Phase::Render => info_span!("render") } }
}

impl OpMarker for Brief {
    const NAME: &'static str = "brief";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("brief") }
}
