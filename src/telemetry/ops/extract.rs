use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Extract;

#[derive(Copy, Clone, Debug)]
pub enum Phase { SelectItems, Item, FetchPage, ExtractText, WriteArticle }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::SelectItems => "select_items",
        Phase::Item => "item",
        Phase::FetchPage => "fetch_page",
        Phase::ExtractText => "extract_text",
        Phase::WriteArticle => "write_article",
    }}
    fn span(&self) -> Span { match self {
        Phase::SelectItems => info_span!("select_items"),
        Phase::Item => info_span!("item"),
        Phase::FetchPage => info_span!("fetch_page"),
        Phase::ExtractText => info_span!("extract_text"),
        Phase::WriteArticle => info_span!("write_article"),
    }}
}

impl OpMarker for Extract {
    const NAME: &'static str = "extract";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("extract") }
}
