use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use schema::{PhoenixDocument, now_iso8601};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    SyncError,
    reconcile::{self, Side},
    storage::DocumentStorage,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Offline,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Both copies hold the document; `last_updated` is the stamp the remote applied.
    Synced { last_updated: String },
    /// Only the local cache took the write. It is pushed on the next load
    /// that reaches the remote, unless a newer remote copy wins first.
    LocalOnly { last_updated: String, reason: String },
}

impl SaveOutcome {
    pub fn last_updated(&self) -> &str {
        match self {
            Self::Synced { last_updated } | Self::LocalOnly { last_updated, .. } => last_updated,
        }
    }
}

#[derive(Debug)]
struct SyncState {
    status: ConnectionStatus,
    pending_push: bool,
}

/// Keeps one remote copy and one local copy of the document in agreement.
pub struct SyncClient {
    remote: Arc<dyn DocumentStorage>,
    local: Arc<dyn DocumentStorage>,
    state: Mutex<SyncState>,
    // load and save never interleave, including the poll loop's loads.
    serial: tokio::sync::Mutex<()>,
}

impl SyncClient {
    pub fn new(remote: Arc<dyn DocumentStorage>, local: Arc<dyn DocumentStorage>) -> Self {
        Self {
            remote,
            local,
            state: Mutex::new(SyncState {
                status: ConnectionStatus::Offline,
                pending_push: false,
            }),
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    pub fn has_pending_push(&self) -> bool {
        self.state().pending_push
    }

    /// Fetches both copies, picks the current one and overwrites the other
    /// with it. Never fails: an unreachable remote degrades to the local copy,
    /// an unusable local copy counts as absent, and two missing copies yield
    /// an empty document.
    pub async fn load(&self) -> PhoenixDocument {
        let _serial = self.serial.lock().await;
        let (remote_result, local_result) = tokio::join!(self.remote.load(), self.local.load());

        let remote_reachable = remote_result.is_ok();
        let remote = match remote_result {
            Ok(doc) => {
                self.mark(ConnectionStatus::Connected);
                doc
            }
            Err(err) => {
                warn!(storage = self.remote.label(), error = %err, "remote load failed");
                self.mark(ConnectionStatus::Offline);
                None
            }
        };
        let local = local_result.unwrap_or_else(|err| {
            warn!(
                storage = self.local.label(),
                error = %err,
                "local copy unusable, treating as absent"
            );
            None
        });

        let Some(decision) = reconcile::choose(remote.as_ref(), local.as_ref()) else {
            debug!("no copy on either side, starting empty");
            return PhoenixDocument::empty();
        };
        debug!(winner = ?decision.winner, reason = ?decision.reason, "reconciled copies");

        let (winner, loser) = match decision.winner {
            Side::Remote => (remote, local),
            Side::Local => (local, remote),
        };
        let Some(mut winner) = winner else {
            return PhoenixDocument::empty();
        };
        let converged = loser.as_ref() == Some(&winner);

        match decision.winner {
            Side::Remote => {
                if self.take_pending_push() {
                    warn!(
                        remote_last_updated = winner.last_updated().unwrap_or("none"),
                        "pending local changes superseded by newer remote copy"
                    );
                }
                if !converged {
                    self.write_local(&winner).await;
                }
            }
            Side::Local if !remote_reachable => {
                debug!("remote unreachable, serving local copy");
            }
            Side::Local if converged => {
                self.take_pending_push();
            }
            Side::Local => match self.remote.save(&winner).await {
                Ok(receipt) => {
                    self.take_pending_push();
                    info!(
                        outlets = winner.outlet_count(),
                        "pushed local copy to remote"
                    );
                    if let Some(stamp) = receipt.last_updated
                        && winner.last_updated() != Some(stamp.as_str())
                    {
                        winner.set_last_updated(stamp);
                        self.write_local(&winner).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "push of local copy failed");
                    self.set_pending_push();
                    self.mark(ConnectionStatus::Offline);
                }
            },
        }

        winner
    }

    /// Stamps `doc`, writes the local cache, then the remote. Only a local
    /// failure is an error; a remote failure leaves the write pending.
    pub async fn save(&self, mut doc: PhoenixDocument) -> Result<SaveOutcome, SyncError> {
        let _serial = self.serial.lock().await;
        let stamp = now_iso8601();
        doc.set_last_updated(stamp.clone());
        self.local.save(&doc).await?;

        match self.remote.save(&doc).await {
            Ok(receipt) => {
                self.mark(ConnectionStatus::Connected);
                self.take_pending_push();
                let applied = receipt.last_updated.unwrap_or(stamp);
                if doc.last_updated() != Some(applied.as_str()) {
                    doc.set_last_updated(applied.clone());
                    self.write_local(&doc).await;
                }
                Ok(SaveOutcome::Synced {
                    last_updated: applied,
                })
            }
            Err(err) => {
                warn!(error = %err, "remote save failed, keeping local copy");
                self.mark(ConnectionStatus::Offline);
                self.set_pending_push();
                Ok(SaveOutcome::LocalOnly {
                    last_updated: stamp,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Re-runs `load` every `every` until `shutdown` fires or its sender is
    /// dropped. The first run happens one interval after spawning.
    pub fn spawn_poll_loop(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        debug!("sync poll loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let doc = self.load().await;
                        debug!(
                            outlets = doc.outlet_count(),
                            status = self.status().as_str(),
                            "poll reconcile finished"
                        );
                    }
                }
            }
        })
    }

    async fn write_local(&self, doc: &PhoenixDocument) {
        if let Err(err) = self.local.save(doc).await {
            warn!(storage = self.local.label(), error = %err, "local cache write failed");
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark(&self, status: ConnectionStatus) {
        let mut state = self.state();
        if state.status == status {
            return;
        }
        state.status = status;
        match status {
            ConnectionStatus::Connected => info!("remote reachable, status connected"),
            ConnectionStatus::Offline => warn!("remote unreachable, status offline"),
        }
    }

    fn set_pending_push(&self) {
        self.state().pending_push = true;
    }

    fn take_pending_push(&self) -> bool {
        std::mem::take(&mut self.state().pending_push)
    }
}
