//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the in-memory session store.

use crate::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use verifly_core::flow::{Collaborators, FlowOptions, VerificationFlowController};
use verifly_core::ports::SpeechService;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub collaborators: Collaborators,
    pub flow_options: FlowOptions,
    pub speech_adapter: Arc<dyn SpeechService>,
    pub sessions: SessionStore,
}

//=========================================================================================
// SessionStore (One Flow Controller Per Session)
//=========================================================================================

/// In-memory registry of active verification sessions.
///
/// Isolation between simultaneous users is by session identity: each session
/// owns its own flow controller behind its own mutex, and operations on one
/// session are serialized by that mutex without blocking other sessions.
/// Nothing is persisted; sessions vanish with the process.
pub struct SessionStore {
    inner: RwLock<HashMap<Uuid, Arc<Mutex<VerificationFlowController>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a fresh session (its challenge is sampled here) and registers it.
    pub async fn create(
        &self,
        collaborators: Collaborators,
        options: FlowOptions,
    ) -> (Uuid, Arc<Mutex<VerificationFlowController>>) {
        let controller = VerificationFlowController::new(collaborators, options);
        let session_id = controller.session().id;
        let handle = Arc::new(Mutex::new(controller));
        self.inner.write().await.insert(session_id, handle.clone());
        (session_id, handle)
    }

    /// Looks up a session by id.
    pub async fn get(
        &self,
        session_id: Uuid,
    ) -> Option<Arc<Mutex<VerificationFlowController>>> {
        self.inner.read().await.get(&session_id).cloned()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        PdfCertificateAdapter, SimulatedEmotionDetector, SimulatedExtractor, SimulatedFaceMatcher,
    };
    use std::time::Duration;
    use verifly_core::domain::VerificationStep;

    fn simulated_collaborators() -> Collaborators {
        Collaborators {
            extractor: Arc::new(SimulatedExtractor::new(Duration::ZERO)),
            liveness: Arc::new(SimulatedEmotionDetector::new(Duration::ZERO)),
            matcher: Arc::new(SimulatedFaceMatcher::new(Duration::ZERO)),
            issuer: Arc::new(PdfCertificateAdapter::new("Veri-fly AI".to_string())),
        }
    }

    #[tokio::test]
    async fn sessions_are_registered_and_isolated_by_id() {
        let store = SessionStore::new();
        let (id_a, _) = store
            .create(simulated_collaborators(), FlowOptions::default())
            .await;
        let (id_b, _) = store
            .create(simulated_collaborators(), FlowOptions::default())
            .await;
        assert_ne!(id_a, id_b);

        let handle = store.get(id_a).await.expect("session a should exist");
        let controller = handle.lock().await;
        assert_eq!(controller.session().step, VerificationStep::AwaitingDocument);

        assert!(store.get(Uuid::new_v4()).await.is_none());
    }
}
