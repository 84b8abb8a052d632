//! Per-model circuit breaker for the generation fallback chain.
//!
//! A model that fails is put on cooldown so following turns skip it and go
//! straight to the next model in the chain.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::providers::ProviderError;

/// Why a model was placed on cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    /// HTTP 429
    RateLimited,
    /// 5xx, bad payloads, empty answers
    ServerError,
    /// Connection refused or request timed out.
    Unreachable,
}

impl CooldownReason {
    pub fn from_error(err: &ProviderError) -> Self {
        match err.status() {
            Some(429) => Self::RateLimited,
            Some(_) => Self::ServerError,
            None => match err {
                ProviderError::HttpError(_) => Self::Unreachable,
                _ => Self::ServerError,
            },
        }
    }

    /// Rate limits wait twice the configured cooldown.
    fn scale(self, cooldown: Duration) -> Duration {
        match self {
            Self::RateLimited => cooldown * 2,
            Self::ServerError | Self::Unreachable => cooldown,
        }
    }
}

struct CooldownEntry {
    available_at: Instant,
    reason: CooldownReason,
}

/// Shared, lock-based circuit breaker tracking per-model cooldowns.
///
/// Writes only happen on failures and successes after a failure; reads are
/// a map lookup.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CooldownEntry>>,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a circuit breaker with no models on cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    /// Whether `alias` is currently available (not on cooldown or cooldown expired).
    pub fn is_available(&self, alias: &str) -> bool {
        let states = self.states.read().expect("CircuitBreaker lock poisoned");
        match states.get(alias) {
            None => true,
            Some(entry) => Instant::now() >= entry.available_at,
        }
    }

    /// Record a failure for `alias`, placing it on cooldown.
    pub fn record_failure(&self, alias: &str, reason: CooldownReason) {
        let mut states = self.states.write().expect("CircuitBreaker lock poisoned");
        states.insert(
            alias.to_string(),
            CooldownEntry {
                available_at: Instant::now() + reason.scale(self.cooldown),
                reason,
            },
        );
    }

    /// Record a success for `alias`, clearing any cooldown.
    pub fn record_success(&self, alias: &str) {
        let has_entry = {
            let states = self.states.read().expect("CircuitBreaker lock poisoned");
            states.contains_key(alias)
        };
        if has_entry {
            let mut states = self.states.write().expect("CircuitBreaker lock poisoned");
            states.remove(alias);
        }
    }

    /// Return the first available alias from `aliases`, or `None` if all are on cooldown.
    pub fn first_available<'a>(&self, aliases: &'a [String]) -> Option<&'a str> {
        let states = self.states.read().expect("CircuitBreaker lock poisoned");
        let now = Instant::now();
        aliases.iter().find_map(|alias| {
            let available = match states.get(alias.as_str()) {
                None => true,
                Some(entry) => now >= entry.available_at,
            };
            available.then_some(alias.as_str())
        })
    }

    /// Return the cooldown reason for a model, if it is currently on cooldown.
    pub fn cooldown_reason(&self, alias: &str) -> Option<CooldownReason> {
        let states = self.states.read().expect("CircuitBreaker lock poisoned");
        states.get(alias).and_then(|entry| {
            if Instant::now() < entry.available_at {
                Some(entry.reason)
            } else {
                None
            }
        })
    }
}
