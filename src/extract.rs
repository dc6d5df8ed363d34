//! PDF text extraction and fragment mining.
//!
//! A document is mined for self-contained fragments in three passes, each a
//! fallback for the one before it:
//!
//! 1. labeled items ("Problem 3:", "Exercise 1.", "Problema 2") sliced from
//!    heading to heading,
//! 2. substantial paragraphs,
//! 3. fixed-size chunks of whatever text the pages carry.
//!
//! A document that yields nothing from all three passes is still a valid,
//! empty extraction.

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

const CHUNK_SIZE: usize = 1000;
const PREVIEW_LEN: usize = 500;

/// A candidate unit of content pulled out of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// 1-based page the fragment starts on.
    pub page: usize,
    pub text: String,
    pub preview: String,
}

impl Fragment {
    fn new(page: usize, text: String) -> Self {
        let preview = truncate_chars(&text, PREVIEW_LEN);
        Self {
            page,
            text,
            preview,
        }
    }
}

/// Truncate at a char boundary, never mid-codepoint.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // English and Romanian labels, with or without diacritics
        Regex::new(r"(?i)(problem|exercise|problema|exerci[țt]iu)\s*[\d.]+\s*[:\-]?").unwrap()
    })
}

/// Per-page text of a PDF, in page order.
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| anyhow::anyhow!("Failed to extract text from PDF: {}", e))
}

/// Slice a page's text into labeled items. Each item runs from the start of
/// its heading to the start of the next, or the end of the page.
fn labeled_items(page: usize, text: &str) -> Vec<Fragment> {
    let starts: Vec<usize> = heading_regex().find_iter(text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let item = text[start..end].trim();
        if item.len() > 20 && !item.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
            out.push(Fragment::new(page, item.to_string()));
        }
    }
    out
}

fn is_heading_like(paragraph: &str) -> bool {
    paragraph.len() < 100
        && paragraph
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

/// Paragraphs substantial enough to stand alone. Pages without blank-line
/// separators fall back to splitting on single newlines.
fn paragraphs(page: usize, text: &str) -> Vec<Fragment> {
    let blocks: Vec<&str> = if text.contains("\n\n") {
        text.split("\n\n").collect()
    } else {
        text.split('\n').collect()
    };

    blocks
        .into_iter()
        .map(str::trim)
        .filter(|p| p.len() > 50 && !is_heading_like(p))
        .map(|p| Fragment::new(page, p.to_string()))
        .collect()
}

/// Fixed-size chunks of a page, split at char boundaries.
fn chunks(page: usize, text: &str) -> Vec<Fragment> {
    let trimmed = text.trim();
    if trimmed.len() <= 100 {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    chars
        .chunks(CHUNK_SIZE)
        .map(|c| Fragment::new(page, c.iter().collect::<String>().trim().to_string()))
        .filter(|f| !f.text.is_empty())
        .collect()
}

/// Mine a document's pages for fragments, falling back through the cascade
/// until one pass produces anything.
pub fn extract_fragments(pages: &[String]) -> Vec<Fragment> {
    let labeled: Vec<Fragment> = pages
        .iter()
        .enumerate()
        .flat_map(|(i, text)| labeled_items(i + 1, text))
        .collect();
    if !labeled.is_empty() {
        tracing::debug!(count = labeled.len(), "Extracted labeled items");
        return labeled;
    }

    let paras: Vec<Fragment> = pages
        .iter()
        .enumerate()
        .flat_map(|(i, text)| paragraphs(i + 1, text))
        .collect();
    if !paras.is_empty() {
        tracing::debug!(count = paras.len(), "Extracted paragraphs");
        return paras;
    }

    let chunked: Vec<Fragment> = pages
        .iter()
        .enumerate()
        .flat_map(|(i, text)| chunks(i + 1, text))
        .collect();
    tracing::debug!(count = chunked.len(), "Extracted raw chunks");
    chunked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_items_sliced_between_headings() {
        let page = "Problem 1: Compute the derivative of x^2 at x = 3.\n\
                    Problem 2: Find the area under the curve y = x from 0 to 4.";
        let frags = labeled_items(1, page);
        assert_eq!(frags.len(), 2);
        assert!(frags[0].text.starts_with("Problem 1"));
        assert!(frags[0].text.contains("derivative"));
        assert!(!frags[0].text.contains("area"));
        assert!(frags[1].text.starts_with("Problem 2"));
    }

    #[test]
    fn test_labeled_items_skip_short() {
        let page = "Problem 1: x\nProblem 2: Evaluate the integral of sin(x) over one period.";
        let frags = labeled_items(1, page);
        assert_eq!(frags.len(), 1);
        assert!(frags[0].text.starts_with("Problem 2"));
    }

    #[test]
    fn test_paragraphs_reject_headings_and_short_lines() {
        let page = "CHAPTER ONE REVIEW\n\n\
                    This paragraph runs long enough to count as substantial content for mining.\n\n\
                    short";
        let frags = paragraphs(1, page);
        assert_eq!(frags.len(), 1);
        assert!(frags[0].text.starts_with("This paragraph"));
    }

    #[test]
    fn test_paragraphs_single_newline_fallback() {
        let page = "First line with plenty of words to clear the minimum length threshold here.\n\
                    Second line also long enough to clear the minimum length threshold easily.";
        let frags = paragraphs(1, page);
        assert_eq!(frags.len(), 2);
    }

    #[test]
    fn test_chunks_split_long_page() {
        let page = "word ".repeat(500);
        let frags = chunks(1, &page);
        assert!(frags.len() >= 2);
        assert!(frags.iter().all(|f| f.text.chars().count() <= CHUNK_SIZE));
    }

    #[test]
    fn test_chunks_skip_thin_page() {
        assert!(chunks(1, "just a little text").is_empty());
    }

    #[test]
    fn test_cascade_prefers_labeled() {
        let pages = vec![
            "Problem 1: A long enough labeled problem statement to keep.\n\n\
             A paragraph that would otherwise qualify on its own merits as a fragment."
                .to_string(),
        ];
        let frags = extract_fragments(&pages);
        assert_eq!(frags.len(), 1);
        assert!(frags[0].text.starts_with("Problem 1"));
    }

    #[test]
    fn test_cascade_empty_document() {
        let pages = vec!["".to_string(), "  \n ".to_string()];
        assert!(extract_fragments(&pages).is_empty());
    }

    #[test]
    fn test_preview_truncated_at_char_boundary() {
        let text = "é".repeat(600);
        let frag = Fragment::new(1, text);
        assert_eq!(frag.preview.chars().count(), 500);
    }

    #[test]
    fn test_page_numbers_are_one_based() {
        let pages = vec![
            "".to_string(),
            "Problem 1: Something long enough to keep around for the test.".to_string(),
        ];
        let frags = extract_fragments(&pages);
        assert_eq!(frags[0].page, 2);
    }
}
