//! Composer value types
//!
//! Slot values are a tagged union keyed by the slot's ui type, so the
//! concrete type is known wherever a slot is resolved. The wire view
//! (`SlotValues::to_wire`) adds the `_<slot>_label` shadow keys the UI
//! displays for entity and file selections.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use composer_types::{EntityItem, ExecutionResult, SlotUiType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ComposerMode
// ---------------------------------------------------------------------------

/// Where the composer is in the resolution/confirmation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposerMode {
    Idle,
    ContextLocked,
    SlotFilling,
    Confirmation,
    Result,
}

impl ComposerMode {
    /// Modes that accept a new directory query.
    pub fn accepts_query(&self) -> bool {
        matches!(self, Self::Idle | Self::ContextLocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ContextLocked => "context_locked",
            Self::SlotFilling => "slot_filling",
            Self::Confirmation => "confirmation",
            Self::Result => "result",
        }
    }
}

impl std::fmt::Display for ComposerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pinned subject. Shared, never copied into composer-owned storage.
pub type PinnedContext = Arc<EntityItem>;

// ---------------------------------------------------------------------------
// Slot values
// ---------------------------------------------------------------------------

/// Prefix and suffix of display-only shadow keys: `_<slot>_label`.
const SHADOW_PREFIX: &str = "_";
const SHADOW_SUFFIX: &str = "_label";

pub fn shadow_key(slot: &str) -> String {
    format!("{SHADOW_PREFIX}{slot}{SHADOW_SUFFIX}")
}

pub fn is_shadow_key(key: &str) -> bool {
    key.len() > SHADOW_PREFIX.len() + SHADOW_SUFFIX.len()
        && key.starts_with(SHADOW_PREFIX)
        && key.ends_with(SHADOW_SUFFIX)
}

/// A resolved slot value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Choice(String),
    Entity { id: String, label: String },
    File { key: String, filename: String },
}

impl SlotValue {
    /// The ui type this value resolves.
    pub fn ui_type(&self) -> SlotUiType {
        match self {
            Self::Text(_) => SlotUiType::Text,
            Self::Number(_) => SlotUiType::Number,
            Self::Date(_) => SlotUiType::Date,
            Self::Choice(_) => SlotUiType::Enum,
            Self::Entity { .. } => SlotUiType::EntitySearch,
            Self::File { .. } => SlotUiType::File,
        }
    }

    pub fn entity(item: &EntityItem) -> Self {
        Self::Entity {
            id: item.id.clone(),
            label: item.label.clone(),
        }
    }

    /// Human-readable label stored under the shadow key, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Entity { label, .. } => Some(label),
            Self::File { filename, .. } => Some(filename),
            _ => None,
        }
    }

    /// Payload representation sent to the execution gateway.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) | Self::Choice(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => decimal_to_json(n),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Entity { id, .. } => serde_json::Value::String(id.clone()),
            Self::File { key, .. } => serde_json::Value::String(key.clone()),
        }
    }

    /// Short text for confirmation summaries.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) | Self::Choice(s) => s.clone(),
            Self::Number(n) => n.normalize().to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Entity { label, .. } => label.clone(),
            Self::File { filename, .. } => filename.clone(),
        }
    }
}

fn decimal_to_json(n: &Decimal) -> serde_json::Value {
    if n.fract().is_zero() {
        if let Some(i) = n.to_i64() {
            return serde_json::Value::from(i);
        }
    }
    n.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(n.to_string()))
}

/// Resolved slot values keyed by slot name.
///
/// Only the state machine inserts, and only under declared slot names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotValues {
    values: BTreeMap<String, SlotValue>,
}

impl SlotValues {
    pub fn get(&self, slot: &str) -> Option<&SlotValue> {
        self.values.get(slot)
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.values.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the replaced value when the slot was already resolved.
    pub(crate) fn insert(&mut self, slot: &str, value: SlotValue) -> Option<SlotValue> {
        self.values.insert(slot.to_string(), value)
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    /// Flat map as the UI sees it: one entry per slot plus a
    /// `_<slot>_label` shadow entry for entity and file values.
    pub fn to_wire(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.values {
            map.insert(name.clone(), value.to_json());
            if let Some(label) = value.label() {
                map.insert(shadow_key(name), serde_json::Value::String(label.to_string()));
            }
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Directory request failed; transient.
    SearchFailed,
    /// Upload failed; the slot stays unresolved.
    UploadFailed,
    /// Slot input rejected; shown inline.
    Validation,
}

/// User-visible message produced by a failed request or rejected input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    /// Dry run: validates and reports, commits nothing.
    Simulate,
    Confirm,
}

/// Passed to `on_executed` callbacks after a confirmed execution succeeds.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub capability_id: String,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub result: ExecutionResult,
}

/// A file chosen for a `file` slot.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Where an uploaded file landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub key: String,
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn shadow_keys() {
        assert_eq!(shadow_key("patient"), "_patient_label");
        assert!(is_shadow_key("_patient_label"));
        assert!(!is_shadow_key("patient"));
        assert!(!is_shadow_key("_label"));
        assert!(!is_shadow_key("due_date"));
    }

    #[test]
    fn wire_view_adds_labels_only_for_entities_and_files() {
        let mut values = SlotValues::default();
        values.insert("amount", SlotValue::Number(Decimal::from(500)));
        values.insert(
            "patient",
            SlotValue::Entity {
                id: "p1".into(),
                label: "Ahmet Yılmaz".into(),
            },
        );
        let wire = values.to_wire();
        assert_eq!(wire["amount"], serde_json::json!(500));
        assert_eq!(wire["patient"], "p1");
        assert_eq!(wire["_patient_label"], "Ahmet Yılmaz");
        assert!(!wire.contains_key("_amount_label"));
    }

    #[test]
    fn reinserting_keeps_one_label() {
        let mut values = SlotValues::default();
        let file = |k: &str| SlotValue::File {
            key: k.into(),
            filename: "rapor.pdf".into(),
        };
        values.insert("report", file("k1"));
        let replaced = values.insert("report", file("k2"));
        assert!(replaced.is_some());
        let wire = values.to_wire();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire["report"], "k2");
    }

    #[test]
    fn fractional_numbers_stay_numeric() {
        let v = SlotValue::Number(Decimal::from_str("12.5").unwrap());
        assert_eq!(v.to_json(), serde_json::json!(12.5));
        assert_eq!(v.display(), "12.5");
    }

    #[test]
    fn dates_render_iso() {
        let v = SlotValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(v.to_json(), "2025-01-01");
    }
}
