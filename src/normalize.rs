//! Conversion of raw sources into [`ContentUnit`]s ready for embedding.

use crate::extract::Fragment;
use crate::models::ContentUnit;
use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// Parse CSV bytes into one unit per row.
///
/// A row's text is its cells rendered as `header: value` lines; every cell
/// also lands in the metadata, along with a 1-based `row_id`. Rows whose
/// field count disagrees with the header are skipped, not fatal.
pub fn units_from_csv(bytes: &[u8]) -> Result<Vec<ContentUnit>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut units = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", i + 1))?;
        if record.len() != headers.len() {
            tracing::warn!(
                row = i + 1,
                fields = record.len(),
                expected = headers.len(),
                "Skipping CSV row with mismatched field count"
            );
            continue;
        }

        let mut lines = Vec::with_capacity(headers.len());
        let mut metadata = BTreeMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            let value = value.trim();
            lines.push(format!("{}: {}", header, value));
            metadata.insert(header.clone(), value.to_string());
        }
        metadata.insert("row_id".to_string(), (i + 1).to_string());

        units.push(ContentUnit::new(lines.join("\n"), metadata));
    }

    Ok(units)
}

/// Wrap document fragments as units, carrying page and preview in metadata.
pub fn units_from_fragments(fragments: Vec<Fragment>) -> Vec<ContentUnit> {
    fragments
        .into_iter()
        .map(|frag| {
            let mut metadata = BTreeMap::new();
            metadata.insert("page".to_string(), frag.page.to_string());
            metadata.insert("preview".to_string(), frag.preview);
            metadata.insert("type".to_string(), "problem".to_string());
            ContentUnit::new(frag.text, metadata)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_id;

    #[test]
    fn test_csv_basic() {
        let csv = b"name,age\nAlice,30\nBob,25\n";
        let units = units_from_csv(csv).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "name: Alice\nage: 30");
        assert_eq!(units[0].metadata["name"], "Alice");
        assert_eq!(units[0].metadata["row_id"], "1");
        assert_eq!(units[1].metadata["row_id"], "2");
    }

    #[test]
    fn test_csv_id_is_content_addressed() {
        let csv = b"name,age\nAlice,30\n";
        let units = units_from_csv(csv).unwrap();
        assert_eq!(units[0].id, content_id("name: Alice\nage: 30"));
    }

    #[test]
    fn test_csv_skips_mismatched_rows() {
        let csv = b"a,b\n1,2\n1,2,3\n4,5\n";
        let units = units_from_csv(csv).unwrap();
        assert_eq!(units.len(), 2);
        // row_id counts source rows, including the skipped one
        assert_eq!(units[1].metadata["row_id"], "3");
    }

    #[test]
    fn test_csv_trims_whitespace() {
        let csv = b"name , city\n  Alice ,  Oslo \n";
        let units = units_from_csv(csv).unwrap();
        assert_eq!(units[0].text, "name: Alice\ncity: Oslo");
    }

    #[test]
    fn test_csv_empty_body() {
        let csv = b"name,age\n";
        let units = units_from_csv(csv).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_fragment_units_carry_page_and_preview() {
        let frags = crate::extract::extract_fragments(&[
            "Problem 1: Solve for x in the equation 2x + 4 = 10.".to_string()
        ]);
        let units = units_from_fragments(frags);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata["page"], "1");
        assert_eq!(units[0].metadata["type"], "problem");
        assert!(units[0].metadata["preview"].starts_with("Problem 1"));
    }
}
