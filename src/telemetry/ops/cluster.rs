use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Cluster;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    SelectItems,
    Fingerprint,
    LoadIndex,
    Assign,
    Score,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::SelectItems => "select_items",
            Phase::Fingerprint => "fingerprint",
            Phase::LoadIndex => "load_index",
            Phase::Assign => "assign",
            Phase::Score => "score",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::SelectItems => info_span!("select_items"),
            Phase::Fingerprint => info_span!("fingerprint"),
            Phase::LoadIndex => info_span!("load_index"),
            Phase::Assign => info_span!("assign"),
            Phase::Score => info_span!("score"),
        }
    }
}

impl OpMarker for Cluster {
    const NAME: &'static str = "cluster";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("cluster")
    }
}
