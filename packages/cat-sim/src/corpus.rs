//! JSON corpus loading
//!
//! Rows follow the task CSV headers (`item_id`, `trial_type`,
//! `assessment_stage`, `d`/`difficulty`, `chance_level`, `block_index`).
//! Numeric cells may arrive as numbers or strings; an empty or unparseable
//! difficulty becomes NaN so the item lands in the unnormed pool. Every other
//! column is kept in the item payload. `block_index` must be a whole number;
//! it is carried on the item but blocks are grouped by trial type.

use std::path::Path;

use serde::Deserialize;

use cat_engine::{AssessmentStage, Item};

use crate::error::{SimError, SimResult};

/// Number or numeric text, as found in exported spreadsheets
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    fn to_f64(&self) -> f64 {
        match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn cell(value: &Option<Cell>) -> Option<f64> {
    value.as_ref().map(Cell::to_f64)
}

#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(alias = "itemId")]
    item_id: Option<String>,
    #[serde(alias = "itemUid")]
    item_uid: Option<String>,
    #[serde(default, alias = "trialType")]
    trial_type: String,
    #[serde(default, alias = "assessmentStage")]
    assessment_stage: String,
    #[serde(alias = "blockIndex")]
    block_index: Option<Cell>,
    d: Option<Cell>,
    difficulty: Option<Cell>,
    #[serde(alias = "a")]
    discrimination: Option<Cell>,
    #[serde(alias = "chanceLevel", alias = "guessing")]
    chance_level: Option<Cell>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl CorpusRow {
    fn into_item(self, row: usize) -> SimResult<Item> {
        let id = self.item_id.unwrap_or_else(|| format!("row-{row}"));
        let mut item = Item::new(id, AssessmentStage::from(self.assessment_stage));
        if let Some(uid) = self.item_uid {
            item.uid = uid;
        }
        item.trial_type = self.trial_type;
        item.block_index = match cell(&self.block_index) {
            None => None,
            Some(b) if b.is_nan() => None,
            Some(b) if b.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&b) => {
                Some(b as u32)
            }
            Some(b) => {
                return Err(SimError::Corpus {
                    row,
                    message: format!("block_index must be a non-negative integer, got {b}"),
                })
            }
        };
        item.difficulty = cell(&self.d).or_else(|| cell(&self.difficulty));
        if let Some(a) = cell(&self.discrimination) {
            item.discrimination = a;
        }
        if let Some(c) = cell(&self.chance_level).filter(|c| !c.is_nan()) {
            item.guessing = c;
        }
        item.payload = serde_json::Value::Object(self.extra);
        Ok(item)
    }
}

/// Parse a JSON array of corpus rows, preserving order
pub fn parse_corpus(json: &str) -> SimResult<Vec<Item>> {
    let rows: Vec<CorpusRow> = serde_json::from_str(json)?;
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| row.into_item(idx))
        .collect()
}

pub fn load_corpus(path: &Path) -> SimResult<Vec<Item>> {
    let raw = std::fs::read_to_string(path)?;
    let items = parse_corpus(&raw)?;
    tracing::info!(path = %path.display(), items = items.len(), "corpus loaded");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_with_mixed_cells() {
        let json = r#"[
            {"item_id": "i1", "trial_type": "instructions", "assessment_stage": "instructions", "prompt": "Listen"},
            {"item_id": "p1", "trial_type": "vocab", "assessment_stage": "practice_response", "d": "-1.2"},
            {"item_id": "t1", "trial_type": "vocab", "assessment_stage": "test_response", "difficulty": 0.4, "chance_level": "0.25", "block_index": "2"},
            {"item_id": "t2", "trial_type": "vocab", "assessment_stage": "test_response", "d": "NA", "answer": "cat"}
        ]"#;
        let items = parse_corpus(json).unwrap();

        assert_eq!(items.len(), 4);
        assert_eq!(items[0].assessment_stage, AssessmentStage::Instructions);
        assert_eq!(items[0].payload["prompt"], "Listen");
        assert_eq!(items[1].difficulty, Some(-1.2));
        assert_eq!(items[2].difficulty, Some(0.4));
        assert_eq!(items[2].guessing, 0.25);
        assert_eq!(items[2].block_index, Some(2));
        assert!(items[3].difficulty.is_some_and(f64::is_nan));
        assert!(!items[3].has_usable_params());
        assert_eq!(items[3].payload["answer"], "cat");
    }

    #[test]
    fn test_missing_id_falls_back_to_row_number() {
        let items = parse_corpus(r#"[{"assessment_stage": "test_response"}]"#).unwrap();
        assert_eq!(items[0].id, "row-0");
        assert_eq!(items[0].difficulty, None);
    }

    #[test]
    fn test_rejects_fractional_block_index() {
        let json = r#"[{"item_id": "a", "block_index": 1}, {"item_id": "b", "block_index": "2.7"}]"#;
        let err = parse_corpus(json).unwrap_err();
        assert!(matches!(err, SimError::Corpus { row: 1, .. }), "{err}");

        assert!(parse_corpus(r#"[{"item_id": "c", "block_index": -1}]"#).is_err());
        assert!(parse_corpus(r#"[{"item_id": "d", "block_index": 1e12}]"#).is_err());
    }

    #[test]
    fn test_blank_block_index_is_none() {
        let items = parse_corpus(r#"[{"item_id": "a", "block_index": ""}]"#).unwrap();
        assert_eq!(items[0].block_index, None);
    }

    #[test]
    fn test_rejects_non_array() {
        assert!(parse_corpus(r#"{"item_id": "x"}"#).is_err());
    }
}
