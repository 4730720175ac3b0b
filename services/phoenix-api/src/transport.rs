use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use schema::{OutletCode, OutletPatch, PhoenixDocument, now_iso8601};
use store::{SqliteStore, StoreError};
use tracing::info;

use crate::api::{
    BackupListResponse, BackupResponse, ClearResponse, DocumentResponse, OutletResponse,
    OutletWriteResponse, SaveResponse,
};

mod config;
mod http;
mod payload;
mod persistence;
mod routes;

pub use config::{
    ApiConfig, DEFAULT_BIND_ADDR, DEFAULT_DB_PATH, DEFAULT_MAX_BODY_BYTES, DatabaseLocation,
    IN_MEMORY_DB,
};
pub use http::{CORS_HEADERS, HttpResponse};
pub(crate) use routes::*;

pub type SharedRuntime = Arc<Mutex<PhoenixRuntime>>;
pub type QueryParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Outlet not found")]
    OutletNotFound(String),
    #[error("Backup not found")]
    BackupNotFound(String),
    #[error("{0}")]
    Storage(String),
    #[error("failed to acquire phoenix runtime lock")]
    RuntimeUnavailable,
}

/// Everything one API process owns: the document store behind the routes.
#[derive(Debug)]
pub struct PhoenixRuntime {
    store: SqliteStore,
}

impl PhoenixRuntime {
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::with_store(SqliteStore::open_in_memory()?))
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::with_store(SqliteStore::open(path)?))
    }

    pub fn open(location: &DatabaseLocation) -> Result<Self, StoreError> {
        match location {
            DatabaseLocation::InMemory => Self::in_memory(),
            DatabaseLocation::File(path) => Self::persistent(path),
        }
    }

    pub fn with_store(store: SqliteStore) -> Self {
        Self { store }
    }

    pub fn into_shared(self) -> SharedRuntime {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    fn document(&self) -> Result<DocumentResponse, ApiError> {
        Ok(DocumentResponse {
            success: true,
            data: self.store.get()?,
            timestamp: now_iso8601(),
        })
    }

    fn save_document(&mut self, doc: PhoenixDocument) -> Result<SaveResponse, ApiError> {
        let timestamp = self.store.put(doc)?;
        Ok(SaveResponse {
            success: true,
            message: "Data saved successfully".to_string(),
            timestamp,
        })
    }

    fn clear_document(&mut self) -> Result<ClearResponse, ApiError> {
        let backup_id = self.store.clear_all()?;
        let timestamp = self
            .store
            .get()?
            .last_updated()
            .map(str::to_string)
            .unwrap_or_else(now_iso8601);
        Ok(ClearResponse {
            success: true,
            message: "All data cleared".to_string(),
            backup_id,
            timestamp,
        })
    }

    fn outlet(&self, code: &OutletCode) -> Result<OutletResponse, ApiError> {
        Ok(OutletResponse {
            success: true,
            data: self.store.get_outlet(code)?,
            outlet_code: code.to_string(),
        })
    }

    fn update_outlet(
        &mut self,
        code: &OutletCode,
        patch: OutletPatch,
    ) -> Result<OutletWriteResponse, ApiError> {
        let data = self.store.put_outlet(code, patch)?;
        Ok(OutletWriteResponse {
            success: true,
            message: format!("Outlet {code} updated successfully"),
            data,
        })
    }

    fn delete_outlet(&mut self, code: &OutletCode) -> Result<OutletWriteResponse, ApiError> {
        let data = self.store.delete_outlet(code)?;
        Ok(OutletWriteResponse {
            success: true,
            message: format!("Outlet {code} deleted"),
            data,
        })
    }

    fn backups(&self, limit: usize) -> Result<BackupListResponse, ApiError> {
        let backups = self.store.list_backups(limit)?;
        Ok(BackupListResponse {
            success: true,
            count: backups.len(),
            backups,
        })
    }

    fn backup(&self, id: &str) -> Result<BackupResponse, ApiError> {
        Ok(BackupResponse {
            success: true,
            data: self.store.get_backup(id)?,
        })
    }

    fn restore_backup(&mut self, id: &str) -> Result<SaveResponse, ApiError> {
        let timestamp = self.store.restore_backup(id)?;
        info!(backup_id = %id, "document restored through api");
        Ok(SaveResponse {
            success: true,
            message: format!("Backup {id} restored"),
            timestamp,
        })
    }
}
