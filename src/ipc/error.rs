use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": ErrorBody {
            code,
            message: message.into(),
            details,
        },
    })
}

/// Reply to a line that did not parse as a request, so there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> serde_json::Value {
    json!({
        "ok": false,
        "error": ErrorBody {
            code: "bad_json",
            message: message.into(),
            details: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_omits_absent_details() {
        let v = err("9", "not_found", "class not found", None);
        assert_eq!(v["id"], "9");
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "not_found");
        assert!(v["error"].get("details").is_none());

        let v = err("9", "invalid_mark", "bad", Some(json!({ "studentId": "s1" })));
        assert_eq!(v["error"]["details"]["studentId"], "s1");
    }

    #[test]
    fn bad_json_has_no_id() {
        let v = bad_json("expected value");
        assert!(v.get("id").is_none());
        assert_eq!(v["error"]["code"], "bad_json");
        assert_eq!(v["error"]["message"], "expected value");
    }
}
