//! Self-contained tool-reply envelope: `{ok: bool, ...}` JSON objects
//! (spec §6, §7). The teacher's `Tool`/`ToolResponse` machinery lives in an
//! internal workspace crate (`kodegen_mcp_schema`) unavailable to this
//! crate, so handlers here build the envelope directly with `serde_json`
//! rather than depend on it.

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{Diagnostics, GatewayError};

/// A successful tool reply: `{"ok": true, ...payload fields}`.
pub fn ok<T: Serialize>(payload: T) -> Value {
    let mut value = serde_json::to_value(payload).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("ok".to_string(), Value::Bool(true));
        Value::Object(std::mem::take(map))
    } else {
        json!({ "ok": true, "result": value })
    }
}

/// An error tool reply: `{"ok": false, "error": <code>, "message": <msg>,
/// "diagnostics"?: {...}}` (spec §7).
pub fn err(error: &GatewayError, diagnostics: Option<Diagnostics>) -> Value {
    let mut body = json!({
        "ok": false,
        "error": error.error_code(),
        "message": error.to_string(),
    });

    if let (Some(diag), Value::Object(map)) = (diagnostics, &mut body) {
        map.insert("diagnostics".to_string(), serde_json::to_value(diag).unwrap_or(Value::Null));
    }

    body
}

/// Convert a handler `Result` into the envelope JSON, per spec §7's
/// propagation policy: errors get the stable `error_code()` string;
/// diagnostics are attached whenever the caller supplies them.
pub fn envelope<T: Serialize>(
    result: Result<T, GatewayError>,
    diagnostics: Option<Diagnostics>,
) -> Value {
    match result {
        Ok(payload) => ok(payload),
        Err(e) => err(&e, diagnostics),
    }
}

/// Like [`envelope`], but gathers a [`Diagnostics`] snapshot itself on the
/// error path (spec §7: "a diagnostics object ... is attached on error
/// whenever available") rather than requiring every call site to build one.
pub async fn diagnosed<T: Serialize>(profile_key: &str, result: Result<T, GatewayError>) -> Value {
    match result {
        Ok(payload) => ok(payload),
        Err(e) => {
            let diagnostics = Diagnostics::gather(&e, profile_key).await;
            err(&e, diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        url: String,
    }

    #[test]
    fn ok_payload_merges_ok_flag_into_object() {
        let value = ok(Payload { url: "https://x".to_string() });
        assert_eq!(value["ok"], true);
        assert_eq!(value["url"], "https://x");
    }

    #[test]
    fn err_carries_stable_error_code() {
        let value = err(&GatewayError::LockLost, None);
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "lock_lost");
    }
}
