//! Slot resolution: turns raw input for a slot into a typed `SlotValue`.
//!
//! Dispatch is by `SlotUiType`:
//!
//! | ui type         | input                        | result                |
//! |-----------------|------------------------------|-----------------------|
//! | `text`          | free text (non-empty)        | `SlotValue::Text`     |
//! | `number`        | decimal, `.` or `,` separator| `SlotValue::Number`   |
//! | `date`          | `YYYY-MM-DD` or `DD.MM.YYYY` | `SlotValue::Date`     |
//! | `enum`          | one of `enum_options`        | `SlotValue::Choice`   |
//! | `entity_search` | a directory search result    | `SlotValue::Entity`   |
//! | `file`          | an uploaded file             | `SlotValue::File`     |
//!
//! Nothing here touches composer state; callers commit the returned value.

use std::str::FromStr;

use chrono::NaiveDate;
use composer_types::{EntityItem, SlotSchema, SlotUiType};
use rust_decimal::Decimal;

use super::types::{SlotValue, StoredFile};
use crate::error::ComposerError;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

/// The input control a slot needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWidget<'a> {
    TextInput,
    NumberInput,
    DatePicker,
    Options(&'a [String]),
    EntitySearch { entity_type: Option<&'a str> },
    FileUpload,
}

impl<'a> SlotWidget<'a> {
    pub fn for_slot(slot: &'a SlotSchema) -> Self {
        match slot.ui_type {
            SlotUiType::Text => Self::TextInput,
            SlotUiType::Number => Self::NumberInput,
            SlotUiType::Date => Self::DatePicker,
            SlotUiType::Enum => Self::Options(&slot.enum_options),
            SlotUiType::EntitySearch => Self::EntitySearch {
                entity_type: slot.entity_type.as_deref(),
            },
            SlotUiType::File => Self::FileUpload,
        }
    }
}

/// Parse typed input for a `text`, `number` or `date` slot.
pub fn parse_input(slot: &SlotSchema, raw: &str) -> Result<SlotValue, ComposerError> {
    let raw = raw.trim();
    match slot.ui_type {
        SlotUiType::Text => {
            if raw.is_empty() {
                return Err(ComposerError::validation(&slot.name, "a value is required"));
            }
            Ok(SlotValue::Text(raw.to_string()))
        }
        SlotUiType::Number => parse_number(raw).map(SlotValue::Number).ok_or_else(|| {
            ComposerError::validation(&slot.name, format!("'{raw}' is not a number"))
        }),
        SlotUiType::Date => parse_date(raw)
            .map(SlotValue::Date)
            .ok_or_else(|| ComposerError::validation(&slot.name, format!("'{raw}' is not a date"))),
        other => Err(wrong_kind(slot, other)),
    }
}

/// Pick an option of an `enum` slot. Free text is never accepted.
pub fn choose_option(slot: &SlotSchema, option: &str) -> Result<SlotValue, ComposerError> {
    if slot.ui_type != SlotUiType::Enum {
        return Err(wrong_kind(slot, SlotUiType::Enum));
    }
    slot.enum_options
        .iter()
        .find(|o| o.as_str() == option)
        .map(|o| SlotValue::Choice(o.clone()))
        .ok_or_else(|| {
            ComposerError::validation(&slot.name, format!("'{option}' is not one of the options"))
        })
}

/// Resolve an `entity_search` slot with a directory result.
pub fn select_entity(slot: &SlotSchema, entity: &EntityItem) -> Result<SlotValue, ComposerError> {
    if slot.ui_type != SlotUiType::EntitySearch {
        return Err(wrong_kind(slot, SlotUiType::EntitySearch));
    }
    if let Some(expected) = &slot.entity_type {
        if expected != &entity.entity_type {
            return Err(ComposerError::validation(
                &slot.name,
                format!("expected a {expected}, got a {}", entity.entity_type),
            ));
        }
    }
    Ok(SlotValue::entity(entity))
}

/// Resolve a `file` slot with a stored upload.
pub fn stored_file(slot: &SlotSchema, file: &StoredFile) -> Result<SlotValue, ComposerError> {
    if slot.ui_type != SlotUiType::File {
        return Err(wrong_kind(slot, SlotUiType::File));
    }
    Ok(SlotValue::File {
        key: file.key.clone(),
        filename: file.filename.clone(),
    })
}

/// Coerce a suggested JSON value into the slot's value type.
pub fn coerce_suggestion(
    slot: &SlotSchema,
    value: &serde_json::Value,
) -> Result<SlotValue, ComposerError> {
    use serde_json::Value;

    let as_text = || match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };
    let rejected = || {
        ComposerError::validation(
            &slot.name,
            format!("suggested value {value} does not fit a {} slot", slot.ui_type),
        )
    };

    match slot.ui_type {
        SlotUiType::Text | SlotUiType::Number | SlotUiType::Date => {
            let text = as_text().ok_or_else(rejected)?;
            parse_input(slot, &text)
        }
        SlotUiType::Enum => {
            let text = as_text().ok_or_else(rejected)?;
            choose_option(slot, &text)
        }
        SlotUiType::EntitySearch => match value {
            Value::String(id) if !id.is_empty() => Ok(SlotValue::Entity {
                id: id.clone(),
                label: id.clone(),
            }),
            Value::Object(obj) => {
                let id = obj.get("id").and_then(Value::as_str).ok_or_else(rejected)?;
                let label = obj.get("label").and_then(Value::as_str).unwrap_or(id);
                Ok(SlotValue::Entity {
                    id: id.to_string(),
                    label: label.to_string(),
                })
            }
            _ => Err(rejected()),
        },
        SlotUiType::File => Err(rejected()),
    }
}

fn parse_number(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = Decimal::from_str(raw) {
        return Some(n);
    }
    // "1250,50": decimal comma, no grouping
    if raw.matches(',').count() == 1 && !raw.contains('.') {
        return Decimal::from_str(&raw.replace(',', ".")).ok();
    }
    None
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn wrong_kind(slot: &SlotSchema, expected: SlotUiType) -> ComposerError {
    ComposerError::WrongSlotKind {
        slot: slot.name.clone(),
        expected: if expected == slot.ui_type {
            slot.ui_type.to_string()
        } else {
            format!("{} (not {})", slot.ui_type, expected)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(ui: SlotUiType) -> SlotSchema {
        SlotSchema::new("s", "?", ui)
    }

    #[test]
    fn numbers_accept_decimal_comma() {
        let s = slot(SlotUiType::Number);
        assert_eq!(
            parse_input(&s, " 500 ").unwrap(),
            SlotValue::Number(Decimal::from(500))
        );
        assert_eq!(
            parse_input(&s, "1250,50").unwrap(),
            SlotValue::Number(Decimal::from_str("1250.50").unwrap())
        );
        assert!(parse_input(&s, "1,250,50").is_err());
        assert!(parse_input(&s, "beş yüz").is_err());
    }

    #[test]
    fn dates_accept_iso_and_dotted() {
        let s = slot(SlotUiType::Date);
        let expected = SlotValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(parse_input(&s, "2025-01-01").unwrap(), expected);
        assert_eq!(parse_input(&s, "01.01.2025").unwrap(), expected);
        assert!(parse_input(&s, "2025-02-30").is_err());
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = parse_input(&slot(SlotUiType::Text), "   ").unwrap_err();
        assert!(err.is_inline());
    }

    #[test]
    fn typed_input_refuses_other_kinds() {
        let err = parse_input(&slot(SlotUiType::Enum), "x").unwrap_err();
        assert!(matches!(err, ComposerError::WrongSlotKind { .. }));
    }

    #[test]
    fn enum_requires_declared_option() {
        let s = slot(SlotUiType::Enum).with_options(["nakit", "kart"]);
        assert_eq!(choose_option(&s, "kart").unwrap(), SlotValue::Choice("kart".into()));
        assert!(choose_option(&s, "havale").is_err());
    }

    #[test]
    fn entity_type_must_match_scope() {
        let s = slot(SlotUiType::EntitySearch).with_entity_type("patient");
        let device = EntityItem::new("d1", "device", "Ultrason");
        assert!(select_entity(&s, &device).is_err());
        let patient = EntityItem::new("p1", "patient", "Ahmet Yılmaz");
        assert_eq!(
            select_entity(&s, &patient).unwrap(),
            SlotValue::Entity {
                id: "p1".into(),
                label: "Ahmet Yılmaz".into()
            }
        );
    }

    #[test]
    fn suggestions_are_coerced() {
        let number = slot(SlotUiType::Number);
        assert_eq!(
            coerce_suggestion(&number, &serde_json::json!(750)).unwrap(),
            SlotValue::Number(Decimal::from(750))
        );
        let date = slot(SlotUiType::Date);
        assert!(coerce_suggestion(&date, &serde_json::json!("2025-03-15")).is_ok());
        assert!(coerce_suggestion(&date, &serde_json::json!(["x"])).is_err());

        let entity = slot(SlotUiType::EntitySearch);
        assert_eq!(
            coerce_suggestion(&entity, &serde_json::json!({"id": "p1", "label": "Ahmet"})).unwrap(),
            SlotValue::Entity {
                id: "p1".into(),
                label: "Ahmet".into()
            }
        );
        assert!(coerce_suggestion(&slot(SlotUiType::File), &serde_json::json!("k")).is_err());
    }

    #[test]
    fn widget_dispatch() {
        let s = slot(SlotUiType::EntitySearch).with_entity_type("device");
        assert_eq!(
            SlotWidget::for_slot(&s),
            SlotWidget::EntitySearch {
                entity_type: Some("device")
            }
        );
    }
}
