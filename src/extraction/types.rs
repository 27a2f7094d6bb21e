use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ItemOutcome {
    pub item_id: i64,
    pub ok: bool,
    pub attempts: u32,
    pub elapsed_ms: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ExtractReport {
    pub items: usize,
    pub ok: usize,
    pub failed: usize,
    pub outcomes: Vec<ItemOutcome>,
}
