use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use deuce_core::KnowledgeSettings;
use deuce_knowledge::{BuildReport, KnowledgeIndex, KnowledgeResult};
use tokio::task::JoinHandle;
use tracing::info;

use crate::generation::GenerationChain;
use crate::knowledge_sync;
use crate::orchestrator::Orchestrator;
use crate::session::SessionStore;

/// Shared application state behind the HTTP routes.
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    generator: Arc<GenerationChain>,
    knowledge: KnowledgeSettings,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        generator: Arc<GenerationChain>,
        knowledge: KnowledgeSettings,
    ) -> Self {
        Self {
            orchestrator,
            generator,
            knowledge,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.orchestrator.sessions()
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        self.orchestrator.index()
    }

    /// Model aliases in fallback order.
    pub fn model_chain(&self) -> Vec<String> {
        self.generator
            .aliases()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub async fn rebuild_knowledge(&self) -> KnowledgeResult<BuildReport> {
        knowledge_sync::rebuild(self.index(), &self.knowledge).await
    }

    /// Load the index in the background so the server can start serving.
    pub fn spawn_warm_start(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            knowledge_sync::warm_start(state.index(), &state.knowledge).await;
        })
    }

    /// Periodically drop sessions that have been idle too long.
    pub fn spawn_session_eviction(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let sessions = Arc::clone(self.sessions());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = sessions.evict_expired(Utc::now());
                if evicted > 0 {
                    info!("Evicted {} idle sessions", evicted);
                }
            }
        })
    }
}
