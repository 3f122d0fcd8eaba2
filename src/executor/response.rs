//! Response body interpretation.

use serde_json::{Map, Value};

use crate::error::RequestError;
use crate::traits::Response;

/// Parse a successful body.
///
/// Empty bodies become `{}`. A body that is not JSON is returned as a JSON
/// string holding the raw text.
pub fn parse_success(response: &Response) -> Value {
    let raw = response.text();
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(status = response.status, error = %e, "Response body is not JSON");
            Value::String(raw)
        }
    }
}

/// Build the error for a non-2xx response.
pub fn http_error(response: &Response) -> RequestError {
    let raw = response.text();
    let payload = serde_json::from_str::<Value>(&raw).ok();
    RequestError::Http {
        status: response.status,
        message: error_message(response.status, payload.as_ref(), &raw),
        payload,
    }
}

/// Message preference: `message`, then `error`, then raw text, then a
/// generic status line.
pub fn error_message(status: u16, payload: Option<&Value>, raw: &str) -> String {
    let field = |name: &str| {
        payload
            .and_then(|body| body.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    field("message")
        .or_else(|| field("error"))
        .or_else(|| (!raw.trim().is_empty()).then(|| raw.to_string()))
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn response(status: u16, body: &str) -> Response {
        Response::new(status, Bytes::from(body.to_string()))
    }

    #[test]
    fn test_parse_success() {
        assert_eq!(parse_success(&response(200, r#"{"total":3}"#)), json!({"total": 3}));
        assert_eq!(parse_success(&response(204, "")), json!({}));
        assert_eq!(parse_success(&response(200, "  \n")), json!({}));
        assert_eq!(parse_success(&response(200, "OK")), json!("OK"));
    }

    #[test]
    fn test_error_message_preference() {
        let both = json!({"message": "Shift is full", "error": "conflict"});
        assert_eq!(error_message(409, Some(&both), ""), "Shift is full");

        let error_only = json!({"error": "Invalid shift"});
        assert_eq!(error_message(400, Some(&error_only), ""), "Invalid shift");

        assert_eq!(error_message(502, None, "Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(500, None, ""), "Request failed with status 500");

        let blank = json!({"message": ""});
        assert_eq!(error_message(400, Some(&blank), "{\"message\":\"\"}"), "{\"message\":\"\"}");
    }

    #[test]
    fn test_http_error_attaches_payload() {
        let err = http_error(&response(404, r#"{"message":"Not found"}"#));
        match err {
            RequestError::Http {
                status,
                message,
                payload,
            } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not found");
                assert_eq!(payload, Some(json!({"message": "Not found"})));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_http_error_without_json_body() {
        let err = http_error(&response(503, ""));
        assert_eq!(err.to_string(), "Request failed with status 503");
        assert_eq!(err.payload(), None);
    }
}
