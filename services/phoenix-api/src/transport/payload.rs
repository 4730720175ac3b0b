use schema::{OutletCode, OutletPatch, PhoenixDocument, normalize_document};
use serde_json::Value;
use store::DEFAULT_BACKUP_LIST_LIMIT;

use super::{ApiError, QueryParams};

pub(super) const MAX_BACKUP_LIST_LIMIT: usize = 100;

/// Top-level keys a document body may carry.
const DOCUMENT_FIELDS: [&str; 2] = ["outlets", "metadata"];

/// Accepts either a bare document or `{ "data": document }`, then runs ingress
/// normalization. A body without `outlets` is rejected rather than read as an
/// empty document.
pub(super) fn parse_document_payload(body: &[u8]) -> Result<PhoenixDocument, ApiError> {
    let value = parse_json_body(body)?;
    let value = match value {
        Value::Object(mut map) if !map.contains_key("outlets") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    let Some(fields) = value.as_object() else {
        return Err(ApiError::BadRequest(
            "request body must be a JSON object".to_string(),
        ));
    };
    if !fields.contains_key("outlets") {
        return Err(ApiError::BadRequest(
            "document must contain an outlets object".to_string(),
        ));
    }
    if let Some(unknown) = fields.keys().find(|key| !DOCUMENT_FIELDS.contains(&key.as_str())) {
        return Err(ApiError::BadRequest(format!(
            "unknown document field '{unknown}'"
        )));
    }
    let doc: PhoenixDocument = serde_json::from_value(value)
        .map_err(|err| ApiError::BadRequest(format!("invalid document: {err}")))?;
    normalize_document(doc).map_err(|err| ApiError::BadRequest(format!("validation error: {err}")))
}

/// An empty body is an empty patch.
pub(super) fn parse_outlet_patch(body: &[u8]) -> Result<OutletPatch, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(OutletPatch::default());
    }
    let value = parse_json_body(body)?;
    if !value.is_object() {
        return Err(ApiError::BadRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|err| ApiError::BadRequest(format!("invalid outlet fields: {err}")))
}

pub(super) fn parse_outlet_code(raw: Option<&str>) -> Result<OutletCode, ApiError> {
    let raw = raw.unwrap_or_default();
    OutletCode::parse(raw).map_err(|err| match raw.trim() {
        "" => ApiError::BadRequest("Outlet code is required".to_string()),
        _ => ApiError::BadRequest(err.to_string()),
    })
}

pub(super) fn require_confirmation(query: &QueryParams, action: &str) -> Result<(), ApiError> {
    let confirmed = query
        .get("confirm")
        .is_some_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1"));
    if confirmed {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "{action} requires confirm=true"
        )))
    }
}

pub(super) fn parse_backup_limit(query: &QueryParams) -> Result<usize, ApiError> {
    let Some(raw) = query.get("limit") else {
        return Ok(DEFAULT_BACKUP_LIST_LIMIT);
    };
    let limit = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| ApiError::BadRequest(format!("limit must be a positive integer, got '{raw}'")))?;
    Ok(limit.clamp(1, MAX_BACKUP_LIST_LIMIT))
}

fn parse_json_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn document_payload_accepts_bare_and_wrapped_forms() {
        let bare = parse_document_payload(br#"{"outlets":{"a1":{"name":"Store A"}}}"#).unwrap();
        let wrapped =
            parse_document_payload(br#"{"data":{"outlets":{"A1":{"name":"Store A"}}}}"#).unwrap();

        assert_eq!(bare, wrapped);
        assert!(bare.outlets.contains_key("A1"));
    }

    #[test]
    fn document_payload_rejects_bad_json_and_bad_values() {
        assert!(matches!(
            parse_document_payload(b"{not json"),
            Err(ApiError::BadRequest(message)) if message.starts_with("invalid JSON body")
        ));
        assert!(parse_document_payload(b"[1,2]").is_err());
        assert!(parse_document_payload(br#"{"outlets":{"A1":{"okr":{"progress":150}}}}"#).is_err());
        assert!(parse_document_payload(br#"{"outlets":{"a1":{},"A1":{}}}"#).is_err());
    }

    #[test]
    fn document_payload_requires_outlets_and_known_fields() {
        for body in [
            &br#"{}"#[..],
            br#"{"data":{}}"#,
            br#"{"outlet":{"A1":{"name":"typo"}}}"#,
            br#"{"metadata":{"lastUpdated":"2024-01-01T00:00:00.000Z"}}"#,
        ] {
            assert!(
                matches!(parse_document_payload(body), Err(ApiError::BadRequest(_))),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
        assert!(matches!(
            parse_document_payload(br#"{"outlets":{},"outlet":{"A1":{}}}"#),
            Err(ApiError::BadRequest(message)) if message == "unknown document field 'outlet'"
        ));
        assert!(parse_document_payload(br#"{"outlets":{}}"#).unwrap().is_empty());
    }

    #[test]
    fn outlet_patch_allows_empty_body() {
        assert_eq!(parse_outlet_patch(b"").unwrap(), OutletPatch::default());
        let patch = parse_outlet_patch(br#"{"okr":{"progress":49.6}}"#).unwrap();
        assert_eq!(patch.okr.and_then(|okr| okr.progress), Some(50));
    }

    #[test]
    fn outlet_code_errors_are_bad_requests() {
        assert_eq!(
            parse_outlet_code(None),
            Err(ApiError::BadRequest("Outlet code is required".into()))
        );
        assert!(parse_outlet_code(Some("a/b")).is_err());
        assert_eq!(parse_outlet_code(Some("a1")).unwrap().as_str(), "A1");
    }

    #[test]
    fn confirmation_and_limits() {
        assert!(require_confirmation(&query(&[("confirm", "true")]), "clear").is_ok());
        assert!(require_confirmation(&query(&[("confirm", "no")]), "clear").is_err());
        assert!(require_confirmation(&query(&[]), "clear").is_err());

        assert_eq!(parse_backup_limit(&query(&[])).unwrap(), 10);
        assert_eq!(parse_backup_limit(&query(&[("limit", "0")])).unwrap(), 1);
        assert_eq!(parse_backup_limit(&query(&[("limit", "500")])).unwrap(), 100);
        assert!(parse_backup_limit(&query(&[("limit", "-3")])).is_err());
    }
}
