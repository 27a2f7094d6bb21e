use serde::Serialize;

use crate::model::Source;

#[derive(Serialize)]
pub struct SourceAddResult {
    pub inserted: bool,
    pub url: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct SourceList {
    pub sources: Vec<Source>,
}
