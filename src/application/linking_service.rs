//! Linking service facade
//!
//! One service instance per process. It owns the shared collaborators,
//! spawns orchestrator tasks and keeps the pause flags of runs started in
//! this process. Runs started elsewhere are still controllable: pause goes
//! through the session row, which every orchestrator polls.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::repositories::{ImageLinkStore, ProductReader, SessionStore};
use crate::domain::session::{LinkingMode, LinkingSession, SessionStatus};
use crate::infrastructure::storage::ObjectStorage;
use crate::linking::orchestrator::LinkingOrchestrator;
use crate::linking::{LinkingError, LinkingOptions};

/// Sessions returned by `list_sessions`.
const RECENT_SESSIONS: u32 = 50;

/// In-process controls for one spawned run.
struct RunHandle {
    pause_tx: watch::Sender<bool>,
}

/// Entry point for starting and controlling linking runs.
pub struct LinkingService {
    products: Arc<dyn ProductReader>,
    store: Arc<dyn ImageLinkStore>,
    sessions: Arc<dyn SessionStore>,
    storage: Arc<dyn ObjectStorage>,
    active_runs: Arc<RwLock<HashMap<String, RunHandle>>>,
}

impl LinkingService {
    pub fn new(
        products: Arc<dyn ProductReader>,
        store: Arc<dyn ImageLinkStore>,
        sessions: Arc<dyn SessionStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            products,
            store,
            sessions,
            storage,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn orchestrator(
        &self,
        options: LinkingOptions,
        pause_rx: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> LinkingOrchestrator {
        LinkingOrchestrator::new(
            self.products.clone(),
            self.store.clone(),
            self.sessions.clone(),
            self.storage.clone(),
            options,
            pause_rx,
            cancel,
        )
    }

    /// Start a run in the background and return its session id immediately.
    pub async fn start(&self, options: LinkingOptions) -> Result<String, LinkingError> {
        let (pause_tx, pause_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let mut orchestrator = self.orchestrator(options, pause_rx, cancel);

        let session = orchestrator.open_session().await?;
        let session_id = session.id.clone();

        self.active_runs
            .write()
            .await
            .insert(session_id.clone(), RunHandle { pause_tx });

        let runs = self.active_runs.clone();
        let id_for_cleanup = session_id.clone();
        tokio::spawn(async move {
            // failures are stamped on the session row by the orchestrator
            let _ = orchestrator.run_opened(session).await;
            runs.write().await.remove(&id_for_cleanup);
        });

        Ok(session_id)
    }

    /// Run in the foreground until the session reaches Completed, Paused or
    /// Failed. `cancel` lets the caller wire up Ctrl+C.
    pub async fn run_to_completion(
        &self,
        options: LinkingOptions,
        cancel: CancellationToken,
    ) -> Result<LinkingSession, LinkingError> {
        let (pause_tx, pause_rx) = watch::channel(false);
        let mut orchestrator = self.orchestrator(options, pause_rx, cancel);

        let session = orchestrator.open_session().await?;
        let session_id = session.id.clone();
        self.active_runs
            .write()
            .await
            .insert(session_id.clone(), RunHandle { pause_tx });

        let result = orchestrator.run_opened(session).await;
        self.active_runs.write().await.remove(&session_id);
        result
    }

    /// Current state of a session.
    pub async fn status(&self, session_id: &str) -> Result<LinkingSession, LinkingError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| LinkingError::SessionNotFound(session_id.to_string()))
    }

    /// Ask a running session to pause. Works regardless of which process
    /// owns the run: the in-process watch flag stops it within one file,
    /// an out-of-process run notices the persisted status at its next poll.
    pub async fn pause(&self, session_id: &str) -> Result<(), LinkingError> {
        let current = self.status(session_id).await?;
        if current.status != SessionStatus::Running {
            return Err(LinkingError::SessionState {
                id: session_id.to_string(),
                actual: current.status.to_string(),
                expected: SessionStatus::Running.to_string(),
            });
        }

        self.sessions
            .set_status(session_id, SessionStatus::Paused)
            .await?;

        if let Some(handle) = self.active_runs.read().await.get(session_id) {
            if handle.pause_tx.send(true).is_err() {
                warn!("Run {} already finished, persisted pause stands", session_id);
            }
        }
        info!("⏸️ Pause requested for session {}", session_id);
        Ok(())
    }

    /// Continue a paused session in the background. The run restarts with
    /// the options recorded on the session row and re-enters at the scan
    /// cursor. Returns the session id.
    pub async fn resume(&self, session_id: &str) -> Result<String, LinkingError> {
        let current = self.status(session_id).await?;
        if current.status != SessionStatus::Paused {
            return Err(LinkingError::SessionState {
                id: session_id.to_string(),
                actual: current.status.to_string(),
                expected: SessionStatus::Paused.to_string(),
            });
        }

        let options = LinkingOptions {
            mode: LinkingMode::Resume,
            session_id: Some(session_id.to_string()),
            ..LinkingOptions::default()
        };
        self.start(options).await
    }

    /// Recent sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<LinkingSession>, LinkingError> {
        Ok(self.sessions.list_recent(RECENT_SESSIONS).await?)
    }
}
