use crate::sources::ValidationError;
use axum::http::HeaderMap;
use serde_json::{Map, Value};
use ticket_core::model::IncomingCallback;
use ticket_core::signatures::verify_feishu_signature;
use ticket_core::values::clean_value;

const FEISHU_TIMESTAMP_HEADER: &str = "x-lark-request-timestamp";
const FEISHU_NONCE_HEADER: &str = "x-lark-request-nonce";
const FEISHU_SIGNATURE_HEADER: &str = "x-lark-signature";

const TYPE_MARKER_KEYS: &[&str] = &["ticket_type", "type", "类型"];
const DEFAULT_ITEM_TYPE: &str = "story";

#[derive(Debug, Clone, PartialEq)]
pub enum FeishuRequest {
    Challenge(Value),
    Callback(IncomingCallback),
}

pub fn validate(token: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Result<(), ValidationError> {
    let Some(token) = token else {
        return Ok(());
    };

    let signature = header_string(headers, FEISHU_SIGNATURE_HEADER)
        .ok_or(ValidationError::Unauthorized("missing feishu signature"))?;
    let timestamp = header_string(headers, FEISHU_TIMESTAMP_HEADER).unwrap_or_default();
    let nonce = header_string(headers, FEISHU_NONCE_HEADER).unwrap_or_default();

    if verify_feishu_signature(&timestamp, &nonce, token, body, &signature) {
        Ok(())
    } else {
        Err(ValidationError::Unauthorized("invalid feishu signature"))
    }
}

/// Accepts `{"ticket_type": .., "record": {..}}` or a flat record carrying
/// its own type marker. A missing marker means a story.
pub fn parse_request(payload: Value) -> Result<FeishuRequest, ValidationError> {
    let Value::Object(mut body) = payload else {
        return Err(ValidationError::BadRequest("payload must be a json object"));
    };

    if let Some(challenge) = body.remove("challenge") {
        return Ok(FeishuRequest::Challenge(challenge));
    }

    let top_level_marker = take_type_marker(&mut body);
    let mut record = match body.remove("record") {
        Some(Value::Object(record)) => record,
        Some(_) => return Err(ValidationError::BadRequest("record must be a json object")),
        None => body,
    };
    let record_marker = take_type_marker(&mut record);

    let item_type = top_level_marker
        .or(record_marker)
        .unwrap_or_else(|| DEFAULT_ITEM_TYPE.to_string());

    Ok(FeishuRequest::Callback(IncomingCallback::new(item_type, record)))
}

pub fn parse_record(item_type: &str, payload: Value) -> Result<IncomingCallback, ValidationError> {
    let Value::Object(mut record) = payload else {
        return Err(ValidationError::BadRequest("payload must be a json object"));
    };
    take_type_marker(&mut record);
    Ok(IncomingCallback::new(item_type, record))
}

fn take_type_marker(object: &mut Map<String, Value>) -> Option<String> {
    let mut marker = None;
    for key in TYPE_MARKER_KEYS {
        let Some(value) = object.remove(*key) else {
            continue;
        };
        if marker.is_none() {
            marker = clean_value(&value);
        }
    }
    marker
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;
    use ticket_core::signatures::compute_feishu_signature;

    fn callback(request: FeishuRequest) -> IncomingCallback {
        match request {
            FeishuRequest::Callback(callback) => callback,
            FeishuRequest::Challenge(_) => panic!("expected callback"),
        }
    }

    #[test]
    fn skips_validation_without_token() {
        assert!(validate(None, &HeaderMap::new(), b"{}").is_ok());
    }

    #[test]
    fn requires_valid_signature_when_token_is_set() {
        let body = br#"{"ticket_type":"bug"}"#;
        let signature = compute_feishu_signature("1700000000", "n1", "token", body);

        let mut headers = HeaderMap::new();
        headers.insert(FEISHU_TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));
        headers.insert(FEISHU_NONCE_HEADER, HeaderValue::from_static("n1"));
        assert_eq!(
            validate(Some("token"), &headers, body),
            Err(ValidationError::Unauthorized("missing feishu signature"))
        );

        headers.insert(
            FEISHU_SIGNATURE_HEADER,
            HeaderValue::from_str(&signature).expect("valid signature header"),
        );
        assert!(validate(Some("token"), &headers, body).is_ok());
        assert!(validate(Some("other"), &headers, body).is_err());
    }

    #[test]
    fn answers_url_verification_challenge() {
        let request = parse_request(json!({"challenge": "abc", "type": "url_verification"}))
            .expect("challenge");
        assert_eq!(request, FeishuRequest::Challenge(json!("abc")));
    }

    #[test]
    fn reads_nested_record_with_top_level_marker() {
        let request = parse_request(json!({
            "ticket_type": "bug",
            "record": {"标题": "Crash on save", "ticket_type": "story"}
        }))
        .expect("callback");

        let callback = callback(request);
        assert_eq!(callback.item_type, "bug");
        assert_eq!(callback.fields.len(), 1);
        assert_eq!(callback.fields["标题"], json!("Crash on save"));
    }

    #[test]
    fn reads_flat_record_with_chinese_marker() {
        let callback = callback(
            parse_request(json!({"类型": "缺陷", "标题": "Crash on save"})).expect("callback"),
        );
        assert_eq!(callback.item_type, "缺陷");
        assert!(!callback.fields.contains_key("类型"));
    }

    #[test]
    fn defaults_to_story_without_marker() {
        let callback =
            callback(parse_request(json!({"name": "Fix login"})).expect("callback"));
        assert_eq!(callback.item_type, "story");
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert_eq!(
            parse_request(json!(["not", "an", "object"])),
            Err(ValidationError::BadRequest("payload must be a json object"))
        );
        assert_eq!(
            parse_request(json!({"record": "oops"})),
            Err(ValidationError::BadRequest("record must be a json object"))
        );
    }

    #[test]
    fn direct_records_drop_markers() {
        let callback = parse_record("bug", json!({"title": "t", "type": "story"})).expect("record");
        assert_eq!(callback.item_type, "bug");
        assert!(!callback.fields.contains_key("type"));
    }
}
