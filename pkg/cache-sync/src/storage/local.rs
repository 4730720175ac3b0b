use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use schema::PhoenixDocument;
use tracing::debug;

use super::{DocumentStorage, SaveReceipt};
use crate::SyncError;

/// Persistent client-side cache: the document as one JSON file.
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "phoenix-cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStorage for LocalCache {
    fn label(&self) -> &'static str {
        "local"
    }

    async fn load(&self) -> Result<Option<PhoenixDocument>, SyncError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| SyncError::Malformed(format!("{}: {err}", self.path.display())))
    }

    async fn save(&self, doc: &PhoenixDocument) -> Result<SaveReceipt, SyncError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(doc)
            .map_err(|err| SyncError::Malformed(err.to_string()))?;
        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        debug!(path = %self.path.display(), outlets = doc.outlet_count(), "local cache written");
        Ok(SaveReceipt {
            last_updated: doc.last_updated().map(str::to_string),
        })
    }
}
