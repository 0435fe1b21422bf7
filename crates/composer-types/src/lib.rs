//! Shared API Types for the Action Composer
//!
//! Every type that crosses the boundary between the composer and its
//! backend services lives here.
//!
//! ## Boundaries
//!
//! ```text
//! ┌──────────────────┐  JSON   ┌──────────────────────┐
//! │  Composer        │ ◄─────► │  Capability Directory │
//! │  (state machine) │ ◄─────► │  Execution Gateway    │
//! │                  │ ◄─────► │  Upload / Analysis    │
//! └──────────────────┘         └──────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. Directory and gateway payloads are camelCase
//! 2. Analysis payloads are snake_case (that service's convention)
//! 3. Enum discriminants are snake_case strings

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod suggestion;

pub use suggestion::*;

// ============================================================================
// ENTITIES
// ============================================================================

/// An entity returned by the directory (patient, device, invoice, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityItem {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_label: Option<String>,
}

impl EntityItem {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            label: label.into(),
            sub_label: None,
        }
    }

    pub fn with_sub_label(mut self, sub_label: impl Into<String>) -> Self {
        self.sub_label = Some(sub_label.into());
        self
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// How a slot is resolved in the composer UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotUiType {
    Text,
    Number,
    Date,
    Enum,
    EntitySearch,
    File,
}

impl SlotUiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Enum => "enum",
            Self::EntitySearch => "entity_search",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for SlotUiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One argument descriptor of a capability. Order within
/// `Capability::slots` is the resolution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSchema {
    pub name: String,
    pub prompt: String,
    pub ui_type: SlotUiType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_options: Vec<String>,
    /// Endpoint the directory would search for this slot. Informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint_hint: Option<String>,
    /// Entity type that scopes `entity_search` slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl SlotSchema {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, ui_type: SlotUiType) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            ui_type,
            enum_options: Vec::new(),
            source_endpoint_hint: None,
            entity_type: None,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }
}

/// A server-declared executable action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_permissions: BTreeSet<String>,
    #[serde(default)]
    pub tool_operations: Vec<String>,
    #[serde(default)]
    pub slots: Vec<SlotSchema>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required_permissions: BTreeSet::new(),
            tool_operations: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_slot(mut self, slot: SlotSchema) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.insert(permission.into());
        self
    }

    pub fn with_tool_operation(mut self, operation: impl Into<String>) -> Self {
        self.tool_operations.push(operation.into());
        self
    }

    /// Identifier sent to the execution gateway: the first tool operation,
    /// falling back to the capability name.
    pub fn execution_id(&self) -> &str {
        self.tool_operations
            .first()
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    pub fn slot(&self, name: &str) -> Option<&SlotSchema> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn declares_slot(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }
}

// ============================================================================
// AUTOCOMPLETE API
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutocompleteResponse {
    #[serde(default)]
    pub entities: Vec<EntityItem>,
    #[serde(default)]
    pub actions: Vec<Capability>,
}

/// Entity-search mode of the directory, used by `entity_search` slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySearchResponse {
    #[serde(default)]
    pub entities: Vec<EntityItem>,
}

// ============================================================================
// EXECUTION API
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub capability_id: String,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub confirmed: bool,
    pub dry_run: bool,
    /// One per confirmation attempt; absent on dry runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    DryRun,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

impl ExecutionResult {
    pub fn success(audit_id: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            error: None,
            audit_id: Some(audit_id.into()),
        }
    }

    pub fn dry_run() -> Self {
        Self {
            status: ExecutionStatus::DryRun,
            error: None,
            audit_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            error: Some(message.into()),
            audit_id: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ExecutionStatus::Error
    }
}

// ============================================================================
// UPLOAD API
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTargetRequest {
    pub filename: String,
    pub folder: String,
    pub content_type: String,
}

/// Presigned upload target: POST `fields` plus the file to `url`; the
/// object lands under `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_prefers_first_tool_operation() {
        let cap = Capability::new("Taksit Oluştur")
            .with_tool_operation("installments.create")
            .with_tool_operation("installments.preview");
        assert_eq!(cap.execution_id(), "installments.create");

        let bare = Capability::new("Taksit Oluştur");
        assert_eq!(bare.execution_id(), "Taksit Oluştur");
    }

    #[test]
    fn capability_deserializes_camel_case() {
        let json = serde_json::json!({
            "name": "Fatura Kes",
            "requiredPermissions": ["invoice.create"],
            "toolOperations": ["invoices.create"],
            "slots": [
                {"name": "patient", "prompt": "Hasta?", "uiType": "entity_search", "entityType": "patient"},
                {"name": "kind", "prompt": "Tür?", "uiType": "enum", "enumOptions": ["cash", "card"]}
            ]
        });
        let cap: Capability = serde_json::from_value(json).unwrap();
        assert_eq!(cap.slots.len(), 2);
        assert_eq!(cap.slots[0].ui_type, SlotUiType::EntitySearch);
        assert_eq!(cap.slots[0].entity_type.as_deref(), Some("patient"));
        assert_eq!(cap.slots[1].enum_options, vec!["cash", "card"]);
        assert!(cap.required_permissions.contains("invoice.create"));
        assert!(cap.description.is_empty());
    }

    #[test]
    fn entity_item_uses_type_key() {
        let item = EntityItem::new("p1", "patient", "Ahmet Yılmaz").with_sub_label("TC 123");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "patient");
        assert_eq!(json["subLabel"], "TC 123");
    }

    #[test]
    fn execution_status_wire_names() {
        let result: ExecutionResult =
            serde_json::from_str(r#"{"status":"dry_run"}"#).unwrap();
        assert_eq!(result.status, ExecutionStatus::DryRun);
        let result: ExecutionResult =
            serde_json::from_str(r#"{"status":"success","auditId":"a-9"}"#).unwrap();
        assert_eq!(result.audit_id.as_deref(), Some("a-9"));
    }

    #[test]
    fn execute_request_omits_key_on_dry_run() {
        let req = ExecuteRequest {
            capability_id: "installments.create".into(),
            args: serde_json::Map::new(),
            confirmed: false,
            dry_run: true,
            idempotency_key: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("idempotencyKey").is_none());
        assert_eq!(json["dryRun"], true);
    }
}
