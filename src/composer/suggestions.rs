//! Suggestion merge
//!
//! Analysis results arrive whenever the analysis task finishes, often after
//! the cursor has moved on. Entries are therefore tagged by the slot they
//! target, never by cursor position: the displayed slot sees entries tagged
//! with its own name or [`GENERAL_TAG`].

use composer_types::{AnalysisSuggestion, Capability};
use serde::Serialize;

/// Tag for suggestions that do not name a declared slot.
pub const GENERAL_TAG: &str = "general";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSuggestion {
    pub id: u64,
    /// Declared slot name, or `general`.
    pub tag: String,
    /// The file slot whose upload produced this suggestion.
    pub origin_slot: String,
    pub suggestion: AnalysisSuggestion,
}

impl PendingSuggestion {
    pub fn is_general(&self) -> bool {
        self.tag == GENERAL_TAG
    }

    pub fn offered_on(&self, slot: &str) -> bool {
        self.is_general() || self.tag == slot
    }
}

/// The running suggestion list: appended by analysis, pruned on apply.
#[derive(Debug, Clone, Default)]
pub struct SuggestionList {
    entries: Vec<PendingSuggestion>,
    next_id: u64,
}

impl SuggestionList {
    /// Append a batch from one analysis run. Returns how many were kept.
    pub fn merge(
        &mut self,
        capability: &Capability,
        origin_slot: &str,
        batch: Vec<AnalysisSuggestion>,
        min_confidence: f64,
    ) -> usize {
        let before = self.entries.len();
        for mut suggestion in batch {
            // NaN never clears the floor.
            if suggestion.confidence.is_nan() || suggestion.confidence < min_confidence {
                tracing::debug!(
                    slot = %suggestion.slot_name,
                    confidence = suggestion.confidence,
                    "dropping low-confidence suggestion"
                );
                continue;
            }
            suggestion.confidence = suggestion.confidence.clamp(0.0, 1.0);
            let tag = tag_for(capability, &suggestion.slot_name);
            self.next_id += 1;
            self.entries.push(PendingSuggestion {
                id: self.next_id,
                tag,
                origin_slot: origin_slot.to_string(),
                suggestion,
            });
        }
        self.entries.len() - before
    }

    /// Entries offered while `slot` is displayed, highest confidence first.
    pub fn visible_for(&self, slot: &str) -> Vec<&PendingSuggestion> {
        let mut visible: Vec<_> = self.entries.iter().filter(|e| e.offered_on(slot)).collect();
        visible.sort_by(|a, b| {
            b.suggestion
                .confidence
                .partial_cmp(&a.suggestion.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        visible
    }

    pub fn get(&self, id: u64) -> Option<&PendingSuggestion> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Remove and return an entry.
    pub fn take(&mut self, id: u64) -> Option<PendingSuggestion> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingSuggestion> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn tag_for(capability: &Capability, slot_name: &str) -> String {
    if capability.declares_slot(slot_name) {
        slot_name.to_string()
    } else {
        GENERAL_TAG.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_types::{SlotSchema, SlotUiType};
    use serde_json::json;

    fn installment() -> Capability {
        Capability::new("Taksit Oluştur")
            .with_slot(SlotSchema::new("amount", "Tutar?", SlotUiType::Number))
            .with_slot(SlotSchema::new("due_date", "Vade?", SlotUiType::Date))
            .with_slot(SlotSchema::new("invoice", "Fatura", SlotUiType::File))
    }

    #[test]
    fn merge_tags_by_declared_slot() {
        let cap = installment();
        let mut list = SuggestionList::default();
        let kept = list.merge(
            &cap,
            "invoice",
            vec![
                AnalysisSuggestion::new("due_date", json!("2025-01-01"), 0.9),
                AnalysisSuggestion::new("notes", json!("kontrol"), 0.5),
            ],
            0.0,
        );
        assert_eq!(kept, 2);
        let tags: Vec<_> = list.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["due_date", GENERAL_TAG]);
        assert!(list.iter().all(|e| e.origin_slot == "invoice"));
    }

    #[test]
    fn due_date_suggestion_only_offered_on_due_date() {
        let cap = installment();
        let mut list = SuggestionList::default();
        list.merge(
            &cap,
            "invoice",
            vec![AnalysisSuggestion::new("due_date", json!("2025-01-01"), 0.9)],
            0.0,
        );
        assert!(list.visible_for("amount").is_empty());
        assert!(list.visible_for("invoice").is_empty());
        assert_eq!(list.visible_for("due_date").len(), 1);
    }

    #[test]
    fn general_entries_are_offered_everywhere_sorted_by_confidence() {
        let cap = installment();
        let mut list = SuggestionList::default();
        list.merge(
            &cap,
            "invoice",
            vec![
                AnalysisSuggestion::new("misc", json!("a"), 0.2),
                AnalysisSuggestion::new("amount", json!(500), 0.8),
            ],
            0.0,
        );
        let visible = list.visible_for("amount");
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].tag, "amount");
        assert_eq!(list.visible_for("due_date").len(), 1);
    }

    #[test]
    fn low_confidence_is_dropped() {
        let cap = installment();
        let mut list = SuggestionList::default();
        let kept = list.merge(
            &cap,
            "invoice",
            vec![AnalysisSuggestion::new("amount", json!(500), 0.3)],
            0.5,
        );
        assert_eq!(kept, 0);
        assert!(list.is_empty());
    }

    #[test]
    fn wire_confidence_is_clamped_and_nan_dropped() {
        let cap = installment();
        let mut list = SuggestionList::default();
        let decoded: Vec<AnalysisSuggestion> = serde_json::from_value(json!([
            {"slot_name": "amount", "value": 500, "confidence": 1.7},
            {"slot_name": "amount", "value": 400, "confidence": 0.6}
        ]))
        .unwrap();
        let mut nan = AnalysisSuggestion::new("amount", json!(300), 0.5);
        nan.confidence = f64::NAN;

        let mut batch = decoded;
        batch.push(nan);
        assert_eq!(list.merge(&cap, "invoice", batch, 0.0), 2);

        let visible = list.visible_for("amount");
        assert_eq!(visible[0].suggestion.confidence, 1.0);
        assert_eq!(visible[1].suggestion.confidence, 0.6);
        assert!(list.iter().all(|e| !e.suggestion.confidence.is_nan()));
    }

    #[test]
    fn take_removes_entry_and_ids_stay_unique() {
        let cap = installment();
        let mut list = SuggestionList::default();
        list.merge(&cap, "invoice", vec![AnalysisSuggestion::new("amount", json!(1), 1.0)], 0.0);
        let id = list.iter().next().unwrap().id;
        assert!(list.take(id).is_some());
        assert!(list.take(id).is_none());
        list.merge(&cap, "invoice", vec![AnalysisSuggestion::new("amount", json!(2), 1.0)], 0.0);
        assert_ne!(list.iter().next().unwrap().id, id);
    }
}
