use std::time::Duration;

use async_trait::async_trait;
use schema::PhoenixDocument;
use serde::{Deserialize, Serialize};

use super::{DocumentStorage, SaveReceipt};
use crate::SyncError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The Phoenix API seen as a document storage.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: PhoenixDocument,
}

#[derive(Debug, Deserialize)]
struct SaveEnvelope {
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Serialize)]
struct SaveRequest<'a> {
    data: &'a PhoenixDocument,
}

impl RemoteStore {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::Unavailable("remote base url is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::Unavailable(format!("failed building http client: {err}")))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn document_url(&self) -> String {
        format!("{}/api/phoenix-data", self.base_url)
    }
}

#[async_trait]
impl DocumentStorage for RemoteStore {
    fn label(&self) -> &'static str {
        "remote"
    }

    async fn load(&self) -> Result<Option<PhoenixDocument>, SyncError> {
        let response = self
            .http
            .get(self.document_url())
            .send()
            .await
            .map_err(|err| SyncError::Unavailable(err.to_string()))?;
        let response = ensure_success(response).await?;
        let envelope: DataEnvelope = response
            .json()
            .await
            .map_err(|err| SyncError::Malformed(err.to_string()))?;
        Ok(Some(envelope.data))
    }

    async fn save(&self, doc: &PhoenixDocument) -> Result<SaveReceipt, SyncError> {
        let response = self
            .http
            .post(self.document_url())
            .json(&SaveRequest { data: doc })
            .send()
            .await
            .map_err(|err| SyncError::Unavailable(err.to_string()))?;
        let response = ensure_success(response).await?;
        let envelope: SaveEnvelope = response
            .json()
            .await
            .map_err(|err| SyncError::Malformed(err.to_string()))?;
        Ok(SaveReceipt {
            last_updated: envelope.timestamp,
        })
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::RemoteStatus {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let remote = RemoteStore::new(" http://localhost:8000/ ").unwrap();
        assert_eq!(remote.base_url(), "http://localhost:8000");
        assert_eq!(
            remote.document_url(),
            "http://localhost:8000/api/phoenix-data"
        );
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(RemoteStore::new("  ").is_err());
    }

    #[tokio::test]
    async fn unreachable_remote_reports_unavailable() {
        let remote =
            RemoteStore::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            remote.load().await,
            Err(SyncError::Unavailable(_))
        ));
    }
}
