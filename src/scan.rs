//! Corpus scanning: file discovery, filtering, and content hashing
//!
//! Produces one consistent snapshot of the corpus (path -> content hash)
//! per run; change detection never re-reads files mid-comparison.

use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Hex blake3 digest over raw file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Snapshot of the corpus at scan time: repo-relative path -> content hash.
pub type CorpusSnapshot = BTreeMap<String, String>;

/// Result of one corpus scan.
///
/// Files rejected by glob or size rules are listed separately: they still
/// exist in the corpus, so change detection must not treat them as deleted.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// path -> hash for files that passed every rule
    pub files: CorpusSnapshot,
    /// markdown files present on disk but rejected by the filter
    pub skipped: BTreeSet<String>,
}

/// Compiled include/exclude rules plus size bounds.
struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    min_size: u64,
    max_size: u64,
}

impl FileFilter {
    fn compile(config: &IndexerConfig) -> Result<Self> {
        Ok(Self {
            include: build_globset(&config.include_patterns)?,
            exclude: build_globset(&config.exclude_patterns)?,
            min_size: config.min_file_size,
            max_size: config.max_file_size,
        })
    }

    fn accepts(&self, rel_path: &str, size: u64) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(rel_path) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        size >= self.min_size && size <= self.max_size
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("Invalid glob pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| Error::Config(format!("Failed to compile glob patterns: {e}")))?;
    Ok(Some(set))
}

/// Walk the content directory and hash every markdown file that passes the
/// configured include/exclude/size rules.
pub fn scan_corpus(config: &IndexerConfig) -> Result<ScanOutcome> {
    let root = &config.content_dir;
    if !root.is_dir() {
        return Err(Error::InvalidPath(format!(
            "Content directory does not exist: {}",
            root.display()
        )));
    }

    let filter = FileFilter::compile(config)?;
    let mut outcome = ScanOutcome::default();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) if e.file_type().map(|t| t.is_file()).unwrap_or(false) => e,
            _ => continue,
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let rel_path = relative_path(root, path)?;
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if !filter.accepts(&rel_path, size) {
            debug!(path = %rel_path, size, "Filtered out");
            outcome.skipped.insert(rel_path);
            continue;
        }

        let bytes = std::fs::read(path)?;
        outcome.files.insert(rel_path, content_hash(&bytes));
    }

    info!(
        accepted = outcome.files.len(),
        skipped = outcome.skipped.len(),
        "Corpus scan complete"
    );
    Ok(outcome)
}

fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| Error::InvalidPath(format!("{} escapes content dir", path.display())))?;
    // Stored paths always use forward slashes, matching the persisted history.
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
