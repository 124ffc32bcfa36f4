//! Text locator boundary: OCR word elements and the id/text table handed
//! to the text-locator model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeskPilotResult;

/// One recognised word. `id` is a 0-based index that is stable within a
/// single OCR call only; duplicate texts are told apart by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrElement {
    pub id: usize,
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl OcrElement {
    pub fn left_mid(&self) -> (i32, i32) {
        (self.left, self.top + self.height / 2)
    }

    pub fn right_mid(&self) -> (i32, i32) {
        (self.left + self.width, self.top + self.height / 2)
    }

    pub fn center(&self) -> (i32, i32) {
        (self.left + self.width / 2, self.top + self.height / 2)
    }
}

/// Abstract OCR engine. Returns elements left-to-right, top-to-bottom.
#[async_trait]
pub trait TextLocator: Send + Sync {
    async fn ocr(&self, png: &[u8]) -> DeskPilotResult<Vec<OcrElement>>;
}

/// A locator with no OCR engine behind it. Text-anchored actions degrade
/// through the grounding error path when this is wired in.
pub struct NullLocator;

#[async_trait]
impl TextLocator for NullLocator {
    async fn ocr(&self, _png: &[u8]) -> DeskPilotResult<Vec<OcrElement>> {
        Ok(Vec::new())
    }
}

/// Strips leading and trailing characters that are neither alphabetic nor
/// in `keep` (the punctuation whitelist from configuration).
pub fn clean_text(raw: &str, keep: &str) -> String {
    let ok = |c: char| c.is_alphabetic() || keep.contains(c);
    raw.trim_matches(|c: char| !ok(c)).to_string()
}

/// Two-column `id \t text` table consumed by the text-locator model.
pub fn render_ocr_table(elements: &[OcrElement], keep: &str) -> String {
    let mut table = String::from("ID\tText\n");
    for element in elements {
        table.push_str(&format!("{}\t{}\n", element.id, clean_text(&element.text, keep)));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEEP: &str = " .,!?;:-+";

    #[test]
    fn clean_strips_edge_symbols_only() {
        assert_eq!(clean_text("\u{2022}File*", KEEP), "File");
        assert_eq!(clean_text("read-only.", KEEP), "read-only.");
        assert_eq!(clean_text("(inner)ok(", KEEP), "inner)ok");
    }

    #[test]
    fn table_has_header_and_one_row_per_element() {
        let elements = vec![
            OcrElement {
                id: 0,
                text: "*Open*".into(),
                left: 0,
                top: 0,
                width: 40,
                height: 12,
            },
            OcrElement {
                id: 1,
                text: "Open".into(),
                left: 50,
                top: 0,
                width: 40,
                height: 12,
            },
        ];
        let table = render_ocr_table(&elements, KEEP);
        assert_eq!(table, "ID\tText\n0\tOpen\n1\tOpen\n");
    }

    #[test]
    fn word_anchor_points() {
        let word = OcrElement {
            id: 3,
            text: "dog".into(),
            left: 100,
            top: 20,
            width: 30,
            height: 10,
        };
        assert_eq!(word.left_mid(), (100, 25));
        assert_eq!(word.right_mid(), (130, 25));
        assert_eq!(word.center(), (115, 25));
    }
}
