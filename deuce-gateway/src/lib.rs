pub mod chat;
pub mod circuit_breaker;
pub mod entities;
pub mod generation;
pub mod intent;
pub mod knowledge_sync;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod tools;

pub use generation::{GenerationChain, GenerationError, ModelEntry};
pub use orchestrator::{Orchestrator, SessionView, TurnError, TurnState};
pub use providers::provider::{GenerationRequest, Provider, ProviderError};
pub use session::{Session, SessionStore};
pub use state::AppState;
pub use tools::{Tool, ToolError, ToolRegistry, builtin_registry};
