//! One-shot normalization of legacy wire fields into the canonical
//! [`qs_types::Item`] shape, per the design note that "legacy field"
//! aliases belong in an ingestion step, not as an ongoing runtime branch.

use qs_types::{CategoryId, ContentHash, Item, ItemId};
use serde::Deserialize;
use serde_json::Value;

/// Wire shape accepted by the ingestion endpoint. Carries both the
/// current and a superseded field name for the item's correct-answer
/// index; [`RawItem::into_item`] folds both into a single canonical key
/// before the item ever reaches the store.
#[derive(Debug, Deserialize)]
pub struct RawItem {
    id: ItemId,
    hash: ContentHash,
    category_id: CategoryId,
    #[serde(alias = "correct-answer-idx")]
    correct_answer_index: Option<u32>,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

impl RawItem {
    /// Normalizes the legacy alias into a single `correct_answer_index`
    /// key in the stored payload and drops the alternate spelling for
    /// good, so nothing downstream of ingestion ever has to check both.
    pub fn into_item(self) -> Item {
        let mut payload = self.rest;
        payload.remove("correct-answer-idx");
        if let Some(idx) = self.correct_answer_index {
            payload.insert("correct_answer_index".to_string(), Value::from(idx));
        }
        Item {
            id: self.id,
            hash: self.hash,
            category_id: self.category_id,
            payload: Value::Object(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_alias_normalizes_to_canonical_field() {
        let raw: RawItem = serde_json::from_str(
            r#"{"id":"i1","hash":"h1","category_id":"c1","correct-answer-idx":2,"prompt":"2+2?"}"#,
        )
        .unwrap();
        let item = raw.into_item();
        assert_eq!(item.payload["correct_answer_index"], 2);
        assert!(item.payload.get("correct-answer-idx").is_none());
    }

    #[test]
    fn canonical_field_name_also_accepted_directly() {
        let raw: RawItem = serde_json::from_str(
            r#"{"id":"i1","hash":"h1","category_id":"c1","correct_answer_index":3}"#,
        )
        .unwrap();
        let item = raw.into_item();
        assert_eq!(item.payload["correct_answer_index"], 3);
    }
}
