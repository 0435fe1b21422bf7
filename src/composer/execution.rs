//! Execution protocol
//!
//! Simulate and confirm send the same argument map and differ only in the
//! `confirmed` / `dry_run` flags. Shadow label keys never leave the client.
//! Gateway failures, authorization rejections included, become an `error`
//! result rather than an `Err`.

use composer_types::{Capability, ExecuteRequest, ExecutionResult};
use uuid::Uuid;

use super::types::{is_shadow_key, ExecutionKind, SlotValues};
use crate::client::ExecutionGateway;

/// Drop every `_<slot>_label` entry.
pub fn strip_shadow_keys(
    mut args: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    args.retain(|key, _| !is_shadow_key(key));
    args
}

/// Build the gateway request for a simulate or confirm attempt.
///
/// Confirm attempts carry a fresh idempotency key.
pub fn build_request(
    capability: &Capability,
    values: &SlotValues,
    kind: ExecutionKind,
) -> ExecuteRequest {
    let confirmed = kind == ExecutionKind::Confirm;
    ExecuteRequest {
        capability_id: capability.execution_id().to_string(),
        args: strip_shadow_keys(values.to_wire()),
        confirmed,
        dry_run: !confirmed,
        idempotency_key: confirmed.then(Uuid::new_v4),
    }
}

/// Call the gateway, folding transport and authorization failures into an
/// `error` result.
pub async fn execute(gateway: &dyn ExecutionGateway, request: &ExecuteRequest) -> ExecutionResult {
    match gateway.execute_action(request).await {
        Ok(result) => {
            tracing::info!(
                capability = %request.capability_id,
                dry_run = request.dry_run,
                status = ?result.status,
                audit_id = ?result.audit_id,
                "execution finished"
            );
            result
        }
        Err(e) if e.is_authorization() => {
            tracing::warn!(
                capability = %request.capability_id,
                error = %e,
                "execution not authorized"
            );
            ExecutionResult::error(format!("Not authorized: {e}"))
        }
        Err(e) => {
            tracing::warn!(capability = %request.capability_id, error = %e, "execution failed");
            ExecutionResult::error(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::types::SlotValue;
    use rust_decimal::Decimal;

    fn values() -> SlotValues {
        let mut v = SlotValues::default();
        v.insert("amount", SlotValue::Number(Decimal::from(500)));
        v.insert(
            "patient",
            SlotValue::Entity {
                id: "p1".into(),
                label: "Ahmet Yılmaz".into(),
            },
        );
        v
    }

    #[test]
    fn shadow_keys_are_stripped() {
        let cap = Capability::new("Taksit Oluştur");
        let req = build_request(&cap, &values(), ExecutionKind::Simulate);
        let keys: Vec<_> = req.args.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["amount", "patient"]);
        assert_eq!(req.args["patient"], "p1");
    }

    #[test]
    fn flags_follow_kind() {
        let cap = Capability::new("Taksit Oluştur").with_tool_operation("installments.create");
        let dry = build_request(&cap, &values(), ExecutionKind::Simulate);
        assert!(dry.dry_run && !dry.confirmed);
        assert!(dry.idempotency_key.is_none());
        assert_eq!(dry.capability_id, "installments.create");

        let commit = build_request(&cap, &values(), ExecutionKind::Confirm);
        assert!(commit.confirmed && !commit.dry_run);
        assert!(commit.idempotency_key.is_some());
        assert_eq!(commit.args, dry.args);
    }

    #[test]
    fn strip_leaves_plain_keys() {
        let mut map = serde_json::Map::new();
        map.insert("_label".into(), serde_json::json!("x"));
        map.insert("_file_label".into(), serde_json::json!("a.pdf"));
        let stripped = strip_shadow_keys(map);
        assert!(stripped.contains_key("_label"));
        assert!(!stripped.contains_key("_file_label"));
    }
}
