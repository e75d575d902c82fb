//! Gateway shared state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use asr_core::config::Config;
use asr_media::transcriber::DeterministicBackend;

use crate::rate_limit::RateLimiter;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub backend: Arc<DeterministicBackend>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub connections: RwLock<HashMap<String, ConnectionState>>,

    pub total_connections: AtomicU64,
    pub sessions_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub audio_seconds_total: AtomicU64,
}

/// Per-connection state tracked for the `/stats` endpoint.
pub struct ConnectionState {
    pub session_id: String,
}

impl GatewayState {
    pub fn new(config: Arc<Config>) -> Self {
        let rate_limiter = Some(Arc::new(RateLimiter::new(64)));
        Self {
            config,
            backend: Arc::new(DeterministicBackend),
            rate_limiter,
            connections: RwLock::new(HashMap::new()),
            total_connections: AtomicU64::new(0),
            sessions_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            audio_seconds_total: AtomicU64::new(0),
        }
    }

    pub fn record_audio_seconds(&self, seconds: f64) {
        self.audio_seconds_total
            .fetch_add((seconds * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn audio_seconds(&self) -> f64 {
        self.audio_seconds_total.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
