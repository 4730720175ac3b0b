//! Client-side replica of the Phoenix document: one remote copy, one local
//! cache, and the last-writer-wins policy that keeps them in agreement.

pub mod client;
pub mod reconcile;
pub mod storage;

pub use client::{ConnectionStatus, DEFAULT_POLL_INTERVAL, SaveOutcome, SyncClient};
pub use reconcile::{Decision, Reason, Side, choose};
pub use storage::{DocumentStorage, LocalCache, MemoryStorage, RemoteStore, SaveReceipt};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("remote responded with status {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SyncError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
