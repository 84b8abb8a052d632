use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deuce_gateway::providers::OllamaClient;
use deuce_gateway::session::SessionStore;
use deuce_gateway::state::AppState;
use deuce_gateway::{GenerationChain, ModelEntry, Orchestrator, server};
use deuce_knowledge::{KnowledgeIndex, embedder_from_settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration before tracing so the configured level applies
    let config = deuce_core::Config::load()?;
    let settings = &config.settings;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.logging.level.clone().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Generation fallback chain, in configured order
    let mut models = Vec::new();
    for (alias, model_config) in config.model_chain() {
        let client = OllamaClient::new(model_config.base_url.as_deref(), &model_config.model);
        info!(
            "{} client created for alias '{}' with model: {}",
            model_config.provider, alias, model_config.model
        );
        models.push(ModelEntry::new(alias, Arc::new(client)));
    }
    let generator = Arc::new(GenerationChain::new(
        models,
        settings.generation.cooldown(),
        settings.orchestrator.generation_timeout(),
    ));
    info!("Generation chain: {}", generator.aliases().join(" -> "));

    let embedder = embedder_from_settings(&settings.knowledge);
    info!("Embedding backend: {}", embedder.name());
    let index = Arc::new(KnowledgeIndex::new(embedder, &settings.knowledge));

    let registry = Arc::new(deuce_gateway::builtin_registry()?);
    info!("{} tools registered", registry.len());

    let sessions = Arc::new(SessionStore::new(&settings.session));
    let orchestrator = Arc::new(Orchestrator::new(
        sessions,
        registry,
        index,
        Arc::clone(&generator),
        settings,
    ));

    let state = Arc::new(AppState::new(
        orchestrator,
        generator,
        settings.knowledge.clone(),
    ));
    let warm_start = state.spawn_warm_start();
    let eviction = state.spawn_session_eviction(settings.session.eviction_interval());

    if settings.gateway.host != "127.0.0.1" && settings.gateway.host != "localhost" {
        tracing::warn!(
            "Gateway binding to non-localhost address: {}. This may expose the API to remote access.",
            settings.gateway.host
        );
    }

    let bind_addr = config.bind_addr();
    info!("Starting Dr. Deuce on {}", bind_addr);

    // Run server (this blocks)
    let server_result = server::run(state, &bind_addr).await;

    warm_start.abort();
    eviction.abort();

    server_result
}
