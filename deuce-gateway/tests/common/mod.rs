//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deuce_core::{EmbeddingProvider, Settings};
use deuce_gateway::chat::ChatRole;
use deuce_gateway::providers::{GenerationRequest, Provider, ProviderError};
use deuce_gateway::session::SessionStore;
use deuce_gateway::state::AppState;
use deuce_gateway::{GenerationChain, ModelEntry, Orchestrator, ToolRegistry, builtin_registry};
use deuce_knowledge::{KnowledgeIndex, SourceDocument, embedder_from_settings};
use tempfile::TempDir;

/// What the scripted model does with the next request.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Answer "echo: <last user message>".
    Echo,
    Reply(String),
    Fail,
    /// Sleep, then echo.
    Delay(Duration),
}

/// In-process stand-in for an Ollama model.
pub struct ScriptedProvider {
    behaviour: Mutex<Behaviour>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Mutex::new(behaviour),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> GenerationRequest {
        self.requests().pop().expect("no generation request recorded")
    }
}

fn echo(request: &GenerationRequest) -> String {
    let last = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    format!("echo: {last}")
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let behaviour = self.behaviour.lock().unwrap().clone();
        match behaviour {
            Behaviour::Echo => Ok(echo(request)),
            Behaviour::Reply(text) => Ok(text),
            Behaviour::Fail => Err(ProviderError::ApiError {
                status: 503,
                message: "model not loaded".to_string(),
            }),
            Behaviour::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(echo(request))
            }
        }
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub orchestrator: Arc<Orchestrator>,
    pub provider: Arc<ScriptedProvider>,
    pub index: Arc<KnowledgeIndex>,
    pub settings: Settings,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(settings: Settings) -> Self {
        Self::with_registry(settings, builtin_registry().unwrap())
    }

    pub fn with_registry(mut settings: Settings, registry: ToolRegistry) -> Self {
        let dir = tempfile::tempdir().unwrap();
        settings.knowledge.documents_dir = Some(dir.path().join("knowledge"));
        settings.knowledge.snapshot_path = Some(dir.path().join("index.json"));

        let provider = ScriptedProvider::new(Behaviour::Echo);
        let generator = Arc::new(GenerationChain::new(
            vec![ModelEntry::new("scripted", provider.clone())],
            settings.generation.cooldown(),
            settings.orchestrator.generation_timeout(),
        ));
        let index = Arc::new(KnowledgeIndex::new(
            embedder_from_settings(&settings.knowledge),
            &settings.knowledge,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(SessionStore::new(&settings.session)),
            Arc::new(registry),
            Arc::clone(&index),
            Arc::clone(&generator),
            &settings,
        ));
        let state = Arc::new(AppState::new(
            Arc::clone(&orchestrator),
            generator,
            settings.knowledge.clone(),
        ));

        Self {
            state,
            orchestrator,
            provider,
            index,
            settings,
            dir,
        }
    }

    /// Build the index from the health library below.
    pub async fn seed_library(&self) {
        self.index.build(library()).await.unwrap();
    }

    /// Write the health library as markdown files under the documents dir.
    pub fn write_library(&self) {
        for doc in library() {
            let path = self.dir.path().join("knowledge").join(&doc.id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, &doc.text).unwrap();
        }
    }
}

/// Settings for offline runs: hash embeddings, no model cooldown.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.knowledge.embedding_provider = EmbeddingProvider::Hash;
    settings.knowledge.embedding_dim = Some(128);
    settings.knowledge.chunk_min_chars = 0;
    settings.knowledge.top_k = 3;
    settings.generation.cooldown_seconds = 0;
    settings.orchestrator.tool_timeout_ms = 2_000;
    settings.orchestrator.retrieval_timeout_ms = 2_000;
    settings.orchestrator.generation_timeout_ms = 5_000;
    settings.orchestrator.turn_timeout_ms = 10_000;
    settings
}

pub fn library() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(
            "nutrition/iron.md",
            "# Iron\nIron helps red blood cells carry oxygen. Foods rich in iron include \
             spinach, lentils, red meat and fortified cereals.\n",
        )
        .with_category("nutrition"),
        SourceDocument::new(
            "nutrition/hydration.md",
            "# Hydration\nAdults should drink water regularly through the day, more during \
             fever or exercise.\n",
        )
        .with_category("nutrition"),
        SourceDocument::new(
            "heart/cholesterol.md",
            "# LDL cholesterol\nLDL below 100 mg/dL is considered optimal. High LDL raises \
             the risk of heart disease.\n",
        )
        .with_category("heart"),
        SourceDocument::new(
            "womens-health/cycle.md",
            "# Ovulation\nOvulation usually happens about 14 days before the next period.\n",
        )
        .with_category("womens-health"),
    ]
}
