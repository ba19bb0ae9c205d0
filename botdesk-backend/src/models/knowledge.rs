use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AgentId;

pub type DocumentId = i64;

/// Metadata for a knowledge-base document. The file itself lives in external
/// storage; `file_ref` is the opaque handle to it.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeDocument {
    pub id: DocumentId,
    pub agent_id: AgentId,
    pub title: String,
    pub file_ref: String,
    pub file_type: String,
    pub content_extracted: String,
    pub extracted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeDocument {
    pub fn is_extracted(&self) -> bool {
        self.extracted_at.is_some()
    }
}

/// Lower-cased trailing extension of `filename`, or "" when there is none.
///
/// "guide.PDF" -> "pdf", "archive.tar.GZ" -> "gz", "README" -> "", ".env" -> ""
pub fn file_type_from_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

/// Document title derived from the uploaded filename (extension stripped)
pub fn title_from_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim();
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}
