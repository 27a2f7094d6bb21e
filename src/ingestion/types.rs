use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Fetched,
    NotModified,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceSummary {
    pub source_id: i64,
    pub url: String,
    pub status: FetchStatus,
    pub http_status: Option<i32>,
    pub created: usize,
    pub elapsed_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IngestReport {
    pub sources: usize,
    pub created: usize,
    pub not_modified: usize,
    pub failed: usize,
    pub per_source: Vec<SourceSummary>,
}
