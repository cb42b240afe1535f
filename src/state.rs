// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use tokio::sync::Mutex;

use crate::{
    config::Config,
    store::Store,
    utils::{
        llm::TextGenerator,
        rate_limit::{RateLimitGuard, RateLimiter},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// `None` when no AI provider is configured.
    pub text_generator: Option<Arc<dyn TextGenerator>>,
    /// Serializes ranking recalculations within this process.
    pub ranking_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        config: Config,
        rate_limiter: Arc<dyn RateLimiter>,
        text_generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            store,
            config,
            rate_limiter,
            text_generator,
            ranking_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for RateLimitGuard {
    fn from_ref(state: &AppState) -> Self {
        RateLimitGuard {
            limiter: state.rate_limiter.clone(),
            trust_forwarded_for: state.config.rate_limit.trust_forwarded_for,
        }
    }
}
