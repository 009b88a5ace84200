//! Data models shared across the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A loaded markdown document, cleaned and ready for chunking.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document ID: repository-relative path without the `.md` extension
    pub doc_id: String,
    /// Repository-relative source file path
    pub file_path: String,
    /// Cleaned text content
    pub text: String,
}

/// A chunk of document text with its metadata.
///
/// Chunk indices for one document are always a dense 0-based sequence;
/// the chunker assigns them in emission order and the store replaces the
/// whole set on every reindex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique chunk ID: `{doc_id with / replaced by _}_chunk_{index:03}`
    pub chunk_id: String,
    /// Parent document ID
    pub doc_id: String,
    /// 0-based position within the document
    pub chunk_index: i32,
    /// Nearest preceding section heading, if any
    pub heading: Option<String>,
    /// Chunk text content
    pub text: String,
    /// Word count (CJK characters + latin words)
    pub word_count: i32,
}

/// Classified change for one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Add,
    Modify,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Add => write!(f, "ADD"),
            ActionKind::Modify => write!(f, "MODIFY"),
            ActionKind::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADD" => Ok(ActionKind::Add),
            "MODIFY" => Ok(ActionKind::Modify),
            "DELETE" => Ok(ActionKind::Delete),
            _ => Err(Error::Other(format!("Unknown action kind: {s}"))),
        }
    }
}

/// One entry in the action list produced by change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repository-relative file path
    pub file_path: String,
    pub kind: ActionKind,
    /// Current content hash; `None` for deletions
    pub content_hash: Option<String>,
}

impl FileChange {
    /// Document ID for this file (path without extension).
    pub fn doc_id(&self) -> String {
        doc_id_for_path(&self.file_path)
    }
}

/// Convert a repository-relative markdown path into a document ID.
///
/// Only the extension of the final path component is stripped.
pub fn doc_id_for_path(file_path: &str) -> String {
    let name_start = file_path.rfind('/').map_or(0, |i| i + 1);
    match file_path[name_start..].rfind('.') {
        Some(dot) => file_path[..name_start + dot].to_string(),
        None => file_path.to_string(),
    }
}

/// Persisted indexing history for one file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub file_path: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Append-only audit entry for one classified action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileActionRecord {
    pub id: i64,
    pub file_path: String,
    pub action_type: ActionKind,
    pub content_hash: Option<String>,
    pub run_timestamp: DateTime<Utc>,
    /// Set once the file's reconciliation commits; `None` for failed attempts
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_strips_extension() {
        assert_eq!(doc_id_for_path("main/901-1000/960.md"), "main/901-1000/960");
        assert_eq!(doc_id_for_path("intro.md"), "intro");
        assert_eq!(doc_id_for_path("no_extension"), "no_extension");
        assert_eq!(doc_id_for_path("v1.2/intro.md"), "v1.2/intro");
    }

    #[test]
    fn test_action_kind_roundtrip() {
        for kind in [ActionKind::Add, ActionKind::Modify, ActionKind::Delete] {
            let parsed: ActionKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("UPSERT".parse::<ActionKind>().is_err());
    }
}
