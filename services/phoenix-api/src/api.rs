use schema::{Outlet, PhoenixDocument};
use serde::Serialize;
use store::{BackupRecord, BackupSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub data: PhoenixDocument,
    pub timestamp: String,
}

/// Acknowledges a whole-document write (save or restore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutletResponse {
    pub success: bool,
    pub data: Outlet,
    pub outlet_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutletWriteResponse {
    pub success: bool,
    pub message: String,
    pub data: Outlet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupListResponse {
    pub success: bool,
    pub backups: Vec<BackupSummary>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupResponse {
    pub success: bool,
    pub data: BackupRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub backup_id: String,
    pub timestamp: String,
}

/// `{success:false, error}` plus whichever context field the failure carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlet_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: None,
            outlet_code: None,
            backup_id: None,
        }
    }
}
