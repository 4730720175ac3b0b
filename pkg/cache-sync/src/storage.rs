use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use schema::PhoenixDocument;

use crate::SyncError;

mod local;
mod remote;

pub use local::LocalCache;
pub use remote::RemoteStore;

/// What a storage reports back after accepting a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveReceipt {
    /// The `lastUpdated` stamp the storage holds after the write. The remote
    /// API stamps its own time, so this can differ from the submitted one.
    pub last_updated: Option<String>,
}

/// One place a copy of the document can live.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    fn label(&self) -> &'static str;

    /// `Ok(None)` when the storage holds no copy yet.
    async fn load(&self) -> Result<Option<PhoenixDocument>, SyncError>;

    async fn save(&self, doc: &PhoenixDocument) -> Result<SaveReceipt, SyncError>;
}

/// Process-local storage. Doubles as a session-scoped cache and as a test
/// stand-in for either side; `set_available(false)` makes every call fail.
#[derive(Debug)]
pub struct MemoryStorage {
    label: &'static str,
    document: Mutex<Option<PhoenixDocument>>,
    available: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            document: Mutex::new(None),
            available: AtomicBool::new(true),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn with_document(label: &'static str, doc: PhoenixDocument) -> Self {
        let storage = Self::new(label);
        storage.replace(Some(doc));
        storage
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<PhoenixDocument> {
        self.document
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn replace(&self, doc: Option<PhoenixDocument>) {
        if let Ok(mut guard) = self.document.lock() {
            *guard = doc;
        }
    }

    /// Successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), SyncError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Unavailable(format!("{} is offline", self.label)))
        }
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    fn label(&self) -> &'static str {
        self.label
    }

    async fn load(&self) -> Result<Option<PhoenixDocument>, SyncError> {
        self.ensure_available()?;
        Ok(self.snapshot())
    }

    async fn save(&self, doc: &PhoenixDocument) -> Result<SaveReceipt, SyncError> {
        self.ensure_available()?;
        self.replace(Some(doc.clone()));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(SaveReceipt {
            last_updated: doc.last_updated().map(str::to_string),
        })
    }
}
