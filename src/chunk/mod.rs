//! Document chunking with overlap and section awareness
//!
//! Documents are split at markdown heading boundaries first; oversized
//! sections are then split at paragraph boundaries, carrying a word
//! overlap between adjacent chunks. Chunks below the minimum word count
//! are dropped, and indices are assigned densely (0..n-1) to the chunks
//! that survive.

use crate::config::ChunkConfig;
use crate::models::{Document, DocumentChunk};
use regex::Regex;
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+?)\s*$").unwrap());
static PARAGRAPH_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static CJK_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]").unwrap());
static LATIN_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z]+").unwrap());

/// A heading-delimited span of the document.
#[derive(Debug)]
struct Section {
    heading: Option<String>,
    content: String,
}

/// Chunk a document into bounded pieces with heading metadata.
pub fn chunk_document(document: &Document, config: &ChunkConfig) -> Vec<DocumentChunk> {
    let sections = split_into_sections(&document.text);

    let mut chunks = Vec::new();
    let mut chunk_index = 0i32;
    let mut previous_overlap = String::new();

    for section in &sections {
        let pieces = chunk_section(section, &previous_overlap, config);

        for (text, heading) in &pieces {
            let word_count = count_words(text);
            if word_count < config.min_words {
                continue;
            }
            chunks.push(DocumentChunk {
                chunk_id: chunk_id(&document.doc_id, chunk_index),
                doc_id: document.doc_id.clone(),
                chunk_index,
                heading: heading.clone(),
                text: text.clone(),
                word_count: word_count as i32,
            });
            chunk_index += 1;
        }

        // Carry overlap from this section's last chunk into the next section.
        if let Some((last_text, _)) = pieces.last() {
            previous_overlap = extract_last_words(last_text, config.overlap_words);
        }
    }

    chunks
}

fn chunk_id(doc_id: &str, index: i32) -> String {
    // Persisted id scheme: path separators flatten to underscores, so doc
    // ids differing only in '/' vs '_' (e.g. "a/b" and "a_b") produce the
    // same chunk id and the store's uniqueness constraint rejects the
    // second insert.
    format!("{}_chunk_{:03}", doc_id.replace('/', "_"), index)
}

/// Count words in text: CJK characters count individually, latin words as one.
pub fn count_words(text: &str) -> usize {
    CJK_CHAR.find_iter(text).count() + LATIN_WORD.find_iter(text).count()
}

/// Split text into heading-delimited sections. Text without headings is a
/// single anonymous section.
fn split_into_sections(text: &str) -> Vec<Section> {
    let headings: Vec<(usize, String)> = HEADING
        .captures_iter(text)
        .map(|cap| {
            let pos = cap.get(0).unwrap().start();
            (pos, cap[2].trim().to_string())
        })
        .collect();

    if headings.is_empty() {
        return vec![Section {
            heading: None,
            content: text.to_string(),
        }];
    }

    let mut sections = Vec::with_capacity(headings.len());
    for (i, (pos, heading)) in headings.iter().enumerate() {
        let end = headings.get(i + 1).map_or(text.len(), |(next, _)| *next);
        sections.push(Section {
            heading: Some(heading.clone()),
            content: text[*pos..end].trim().to_string(),
        });
    }
    sections
}

/// Chunk one section, splitting at paragraph boundaries when it exceeds the
/// maximum size. Returns (text, heading) pairs in order.
fn chunk_section(
    section: &Section,
    previous_overlap: &str,
    config: &ChunkConfig,
) -> Vec<(String, Option<String>)> {
    let content = &section.content;

    if count_words(content) <= config.max_words {
        let text = if previous_overlap.is_empty() {
            content.clone()
        } else {
            format!("{previous_overlap}\n\n{content}").trim().to_string()
        };
        return vec![(text, section.heading.clone())];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_size = 0usize;

    if !previous_overlap.is_empty() {
        current_size = count_words(previous_overlap);
        current.push(previous_overlap.to_string());
    }

    for para in split_by_paragraphs(content) {
        let para_size = count_words(&para);

        if current_size + para_size > config.target_words && !current.is_empty() {
            let chunk_text = current.join("\n\n");
            let overlap = extract_last_words(&chunk_text, config.overlap_words);
            chunks.push((chunk_text, section.heading.clone()));

            current_size = count_words(&overlap) + para_size;
            current = if overlap.is_empty() {
                vec![para]
            } else {
                vec![overlap, para]
            };
        } else {
            current.push(para);
            current_size += para_size;
        }
    }

    if !current.is_empty() {
        chunks.push((current.join("\n\n"), section.heading.clone()));
    }

    chunks
}

fn split_by_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Take roughly the last `num_words` words of `text` for chunk overlap,
/// preferring to restart at a sentence or paragraph break.
fn extract_last_words(text: &str, num_words: usize) -> String {
    if num_words == 0 {
        return String::new();
    }

    let token_count = count_words(text);
    if token_count <= num_words {
        return text.to_string();
    }

    // Approximate the cut by character ratio, then look for a nearby break.
    let ratio = num_words as f64 / token_count as f64;
    let mut start = (text.len() as f64 * (1.0 - ratio)) as usize;
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }

    let mut window_start = start.saturating_sub(50);
    while window_start > 0 && !text.is_char_boundary(window_start) {
        window_start -= 1;
    }
    let mut window_end = (start + 50).min(text.len());
    while window_end < text.len() && !text.is_char_boundary(window_end) {
        window_end += 1;
    }

    let window = &text[window_start..window_end];
    let break_marks = ["。", "！", "？", "；", ".", "!", "?", ";", "\n\n"];

    let mut cut = start;
    for mark in break_marks {
        if let Some(pos) = window.rfind(mark) {
            cut = window_start + pos + mark.len();
            break;
        }
    }

    text[cut..].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            doc_id: "main/960".to_string(),
            file_path: "main/960.md".to_string(),
            text: text.to_string(),
        }
    }

    fn small_config() -> ChunkConfig {
        ChunkConfig {
            target_words: 40,
            max_words: 60,
            min_words: 5,
            overlap_words: 8,
        }
    }

    #[test]
    fn test_count_words_mixed_scripts() {
        assert_eq!(count_words("hello world"), 2);
        assert_eq!(count_words("你好世界"), 4);
        assert_eq!(count_words("新闻 episode 960 回顾"), 5);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("!!! ---"), 0);
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        assert!(chunk_document(&doc(""), &small_config()).is_empty());
    }

    #[test]
    fn test_tiny_document_filtered_by_min_words() {
        let chunks = chunk_document(&doc("too short"), &small_config());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_single_section_single_chunk() {
        let text = format!("# Intro\n\n{}", "word ".repeat(20));
        let chunks = chunk_document(&doc(&text), &small_config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_id, "main_960_chunk_000");
        assert_eq!(chunks[0].heading.as_deref(), Some("Intro"));
        assert!(chunks[0].word_count >= 20);
    }

    #[test]
    fn test_headings_delimit_sections() {
        let text = format!(
            "# First\n\n{}\n\n## Second\n\n{}",
            "alpha ".repeat(20),
            "beta ".repeat(20)
        );
        let chunks = chunk_document(&doc(&text), &small_config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading.as_deref(), Some("First"));
        assert_eq!(chunks[1].heading.as_deref(), Some("Second"));
    }

    #[test]
    fn test_oversized_section_splits_at_paragraphs() {
        let paragraphs: Vec<String> = (0..6)
            .map(|i| format!("{} paragraph", format!("word{i} ").repeat(25)))
            .collect();
        let text = format!("# Big\n\n{}", paragraphs.join("\n\n"));

        let chunks = chunk_document(&doc(&text), &small_config());
        assert!(chunks.len() > 1, "expected multiple chunks");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
            assert_eq!(chunk.heading.as_deref(), Some("Big"));
        }
    }

    #[test]
    fn test_indices_dense_despite_filtering() {
        // The middle section is below min_words and gets dropped; indices of
        // the surviving chunks must still be contiguous from zero.
        let text = format!(
            "# A\n\n{}\n\n# B\n\nshort\n\n# C\n\n{}",
            "alpha ".repeat(20),
            "gamma ".repeat(20)
        );
        let config = ChunkConfig {
            overlap_words: 0,
            ..small_config()
        };
        let chunks = chunk_document(&doc(&text), &config);
        let indices: Vec<i32> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_overlap_carried_between_chunks() {
        let paragraphs: Vec<String> = (0..4)
            .map(|i| format!("{}end{i}.", format!("word{i} ").repeat(38)))
            .collect();
        let text = paragraphs.join("\n\n");

        let chunks = chunk_document(&doc(&text), &small_config());
        assert!(chunks.len() >= 2);
        // Each later chunk starts with text carried from its predecessor.
        let first_tail = extract_last_words(&chunks[0].text, 8);
        assert!(!first_tail.is_empty());
        assert!(chunks[1].text.starts_with(first_tail.as_str()));
    }

    #[test]
    fn test_extract_last_words_short_text_returned_whole() {
        assert_eq!(extract_last_words("one two three", 10), "one two three");
        assert_eq!(extract_last_words("anything", 0), "");
    }

    #[test]
    fn test_extract_last_words_prefers_sentence_break() {
        let text = format!("{}. {}", "front ".repeat(60).trim(), "tail ".repeat(10).trim());
        let overlap = extract_last_words(&text, 10);
        assert!(overlap.starts_with("tail") || overlap.contains("tail"));
        assert!(overlap.len() < text.len());
    }

    #[test]
    fn test_extract_last_words_cjk_safe() {
        let text = format!("{}。{}", "词".repeat(200), "尾".repeat(20));
        let overlap = extract_last_words(&text, 20);
        assert!(!overlap.is_empty());
        assert!(overlap.chars().all(|c| c == '尾'));
    }
}
