//! Change detection between the corpus snapshot and persisted history

use crate::models::{ActionKind, FileChange};
use crate::scan::ScanOutcome;
use std::collections::BTreeMap;
use tracing::info;

/// Persisted view used for classification: file path -> last indexed hash.
pub type HistorySnapshot = BTreeMap<String, String>;

/// Classify every file as ADD, MODIFY, or DELETE against the indexing
/// history. Unchanged files produce no entry. Both inputs are fixed
/// snapshots, and the output is ordered lexicographically by path so
/// repeated runs over identical input produce identical action lists.
///
/// A file the scanner skipped (glob or size rules) is still present in the
/// corpus, so its indexed state is left alone rather than deleted.
pub fn detect_changes(current: &ScanOutcome, history: &HistorySnapshot) -> Vec<FileChange> {
    let mut changes = Vec::new();

    for (path, hash) in &current.files {
        match history.get(path) {
            None => changes.push(FileChange {
                file_path: path.clone(),
                kind: ActionKind::Add,
                content_hash: Some(hash.clone()),
            }),
            Some(old_hash) if old_hash != hash => changes.push(FileChange {
                file_path: path.clone(),
                kind: ActionKind::Modify,
                content_hash: Some(hash.clone()),
            }),
            Some(_) => {}
        }
    }

    for path in history.keys() {
        if !current.files.contains_key(path) && !current.skipped.contains(path) {
            changes.push(FileChange {
                file_path: path.clone(),
                kind: ActionKind::Delete,
                content_hash: None,
            });
        }
    }

    changes.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let (added, modified, deleted) = count_kinds(&changes);
    info!(added, modified, deleted, "Change detection complete");

    changes
}

fn count_kinds(changes: &[FileChange]) -> (usize, usize, usize) {
    let mut counts = (0, 0, 0);
    for change in changes {
        match change.kind {
            ActionKind::Add => counts.0 += 1,
            ActionKind::Modify => counts.1 += 1,
            ActionKind::Delete => counts.2 += 1,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn scanned(entries: &[(&str, &str)]) -> ScanOutcome {
        ScanOutcome {
            files: snapshot(entries),
            skipped: Default::default(),
        }
    }

    #[test]
    fn test_classifies_add_modify_delete() {
        let current = scanned(&[("a.md", "h1"), ("b.md", "h2-new"), ("c.md", "h3")]);
        let history = snapshot(&[("b.md", "h2-old"), ("c.md", "h3"), ("d.md", "h4")]);

        let changes = detect_changes(&current, &history);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].file_path, "a.md");
        assert_eq!(changes[0].kind, ActionKind::Add);
        assert_eq!(changes[0].content_hash.as_deref(), Some("h1"));
        assert_eq!(changes[1].file_path, "b.md");
        assert_eq!(changes[1].kind, ActionKind::Modify);
        assert_eq!(changes[2].file_path, "d.md");
        assert_eq!(changes[2].kind, ActionKind::Delete);
        assert_eq!(changes[2].content_hash, None);
    }

    #[test]
    fn test_unchanged_files_are_silent() {
        let current = scanned(&[("a.md", "same"), ("b.md", "same2")]);
        let history = snapshot(&[("a.md", "same"), ("b.md", "same2")]);
        assert!(detect_changes(&current, &history).is_empty());
    }

    #[test]
    fn test_skipped_files_are_not_deleted() {
        // d.md is indexed but now fails the scanner's rules. It still exists,
        // so no DELETE is produced for it.
        let mut current = scanned(&[("a.md", "h1")]);
        current.skipped.insert("d.md".to_string());
        let history = snapshot(&[("a.md", "h1"), ("d.md", "h4")]);

        assert!(detect_changes(&current, &history).is_empty());
    }

    #[test]
    fn test_deterministic_lexicographic_order() {
        let current = scanned(&[("z.md", "h"), ("a.md", "h"), ("m/nested.md", "h")]);
        let history = snapshot(&[("b.md", "gone")]);

        let first = detect_changes(&current, &history);
        let second = detect_changes(&current, &history);
        assert_eq!(first, second);

        let paths: Vec<_> = first.iter().map(|c| c.file_path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md", "m/nested.md", "z.md"]);
    }

    #[test]
    fn test_empty_inputs() {
        let empty = ScanOutcome::default();
        assert!(detect_changes(&empty, &BTreeMap::new()).is_empty());

        let only_history = snapshot(&[("a.md", "h")]);
        let changes = detect_changes(&empty, &only_history);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ActionKind::Delete);
    }
}
