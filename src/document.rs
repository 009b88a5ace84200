//! Document loading and text cleaning

use crate::error::Result;
use crate::models::{doc_id_for_path, Document};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static FRONT_MATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\s*\n.*?\n---\s*\n").unwrap());
static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static HTML_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<(div|iframe|span)[^>]*>.*?</(div|iframe|span)>").unwrap());
static HTML_SELF_CLOSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(div|iframe|span)[^>]*/?>").unwrap());
static FONT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<font[^>]*>(.*?)</font>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static IMAGE_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

/// Load a markdown document by repo-relative path, cleaning its text.
pub fn load_document(content_dir: &Path, file_path: &str) -> Result<Document> {
    let raw = std::fs::read_to_string(content_dir.join(file_path))?;
    Ok(Document {
        doc_id: doc_id_for_path(file_path),
        file_path: file_path.to_string(),
        text: clean_text(&raw),
    })
}

/// Strip YAML front matter, HTML, and image syntax; normalize whitespace.
pub fn clean_text(text: &str) -> String {
    let text = FRONT_MATTER.replace(text, "");
    let text = HTML_COMMENT.replace_all(&text, "");
    let text = HTML_BLOCK.replace_all(&text, "");
    let text = HTML_SELF_CLOSING.replace_all(&text, "");
    let text = FONT_TAG.replace_all(&text, "$1");
    let text = ANY_TAG.replace_all(&text, "");
    let text = IMAGE_SYNTAX.replace_all(&text, "");

    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_front_matter_removed() {
        let raw = "---\ntitle: Episode 960\ndate: 2024-01-01\n---\n# Heading\n\nBody text.";
        let cleaned = clean_text(raw);
        assert!(cleaned.starts_with("# Heading"));
        assert!(!cleaned.contains("title:"));
    }

    #[test]
    fn test_html_stripped_font_text_kept() {
        let raw = "Before\n\n<!-- hidden -->\n<div class=\"embed\"><iframe src=\"x\"></iframe></div>\n\n<font color=\"red\">kept</font>\n\nAfter";
        let cleaned = clean_text(raw);
        assert!(!cleaned.contains("hidden"));
        assert!(!cleaned.contains("iframe"));
        assert!(cleaned.contains("kept"));
        assert!(cleaned.contains("Before"));
        assert!(cleaned.contains("After"));
    }

    #[test]
    fn test_images_and_blank_runs_normalized() {
        let raw = "Line one\n\n\n\n![alt text](https://example.com/x.png)\n\n\nLine two\r\nLine three";
        let cleaned = clean_text(raw);
        assert!(!cleaned.contains("example.com"));
        assert!(!cleaned.contains("\n\n\n"));
        assert!(cleaned.contains("Line two\nLine three"));
    }

    #[test]
    fn test_load_document_sets_doc_id() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("main")).unwrap();
        std::fs::write(dir.path().join("main/960.md"), "# Title\n\nText.").unwrap();

        let doc = load_document(dir.path(), "main/960.md").unwrap();
        assert_eq!(doc.doc_id, "main/960");
        assert_eq!(doc.file_path, "main/960.md");
        assert_eq!(doc.text, "# Title\n\nText.");
    }
}
