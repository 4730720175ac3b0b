use schema::now_iso8601;
use tracing::{debug, warn};

use super::{
    ApiError, HttpResponse, PhoenixRuntime, QueryParams, SharedRuntime,
    payload::{
        parse_backup_limit, parse_document_payload, parse_outlet_code, parse_outlet_patch,
        require_confirmation,
    },
};
use crate::api::StatusResponse;

pub(crate) fn status() -> HttpResponse {
    HttpResponse::ok_json(&StatusResponse {
        success: true,
        status: "online",
        timestamp: now_iso8601(),
    })
}

pub(crate) fn get_document(runtime: &SharedRuntime) -> HttpResponse {
    respond("get document", with_runtime(runtime, |rt| rt.document()))
}

pub(crate) fn save_document(runtime: &SharedRuntime, body: &[u8]) -> HttpResponse {
    let result = parse_document_payload(body)
        .and_then(|doc| with_runtime(runtime, move |rt| rt.save_document(doc)));
    respond("save document", result)
}

pub(crate) fn clear_document(runtime: &SharedRuntime, query: &QueryParams) -> HttpResponse {
    let result = require_confirmation(query, "clearing all data")
        .and_then(|()| with_runtime(runtime, |rt| rt.clear_document()));
    respond("clear document", result)
}

pub(crate) fn get_outlet(runtime: &SharedRuntime, raw_code: Option<&str>) -> HttpResponse {
    let result = parse_outlet_code(raw_code)
        .and_then(|code| with_runtime(runtime, |rt| rt.outlet(&code)));
    respond("get outlet", result)
}

pub(crate) fn put_outlet(runtime: &SharedRuntime, raw_code: Option<&str>, body: &[u8]) -> HttpResponse {
    let result = parse_outlet_code(raw_code).and_then(|code| {
        let patch = parse_outlet_patch(body)?;
        with_runtime(runtime, |rt| rt.update_outlet(&code, patch))
    });
    respond("update outlet", result)
}

pub(crate) fn delete_outlet(
    runtime: &SharedRuntime,
    raw_code: Option<&str>,
    query: &QueryParams,
) -> HttpResponse {
    let result = parse_outlet_code(raw_code).and_then(|code| {
        require_confirmation(query, "deleting an outlet")?;
        with_runtime(runtime, |rt| rt.delete_outlet(&code))
    });
    respond("delete outlet", result)
}

pub(crate) fn list_backups(runtime: &SharedRuntime, query: &QueryParams) -> HttpResponse {
    let result = parse_backup_limit(query)
        .and_then(|limit| with_runtime(runtime, |rt| rt.backups(limit)));
    respond("list backups", result)
}

pub(crate) fn get_backup(runtime: &SharedRuntime, id: &str) -> HttpResponse {
    respond("get backup", with_runtime(runtime, |rt| rt.backup(id)))
}

pub(crate) fn restore_backup(runtime: &SharedRuntime, id: &str) -> HttpResponse {
    respond("restore backup", with_runtime(runtime, |rt| rt.restore_backup(id)))
}

fn with_runtime<T>(
    runtime: &SharedRuntime,
    op: impl FnOnce(&mut PhoenixRuntime) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    let mut guard = runtime.lock().map_err(|_| ApiError::RuntimeUnavailable)?;
    op(&mut *guard)
}

fn respond<T: serde::Serialize>(action: &str, result: Result<T, ApiError>) -> HttpResponse {
    if let Err(err) = &result {
        match err {
            ApiError::Storage(_) | ApiError::RuntimeUnavailable => {
                warn!(action, error = %err, "request failed");
            }
            _ => debug!(action, error = %err, "request rejected"),
        }
    }
    HttpResponse::from_result(result)
}
