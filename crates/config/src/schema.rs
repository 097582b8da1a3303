//! Config schema for the collaboration core: listen address, Redis, the
//! authoritative diagram store DSN, webhook defaults, and rate-limit windows.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the `tmi-collab-server` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmiCollabConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    /// DSN for the authoritative SQL store consulted through the
    /// `DiagramStore` collaborator trait (see `tmi-collab::store`).
    pub database_url: String,
    pub session: SessionConfig,
    pub ratelimit: RateLimitConfig,
    pub webhook: WebhookConfig,
}

impl Default for TmiCollabConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: RedisConfig::default(),
            database_url: "postgres://localhost/tmi".to_string(),
            session: SessionConfig::default(),
            ratelimit: RateLimitConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Whether the server sits behind a reverse proxy (trust
    /// `X-Forwarded-For`/`X-Real-IP` for client-IP resolution).
    pub behind_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            behind_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// WebSocket session tuning (§5 of the spec: heartbeat + outbound queue depth).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ping_interval_secs: u64,
    pub read_deadline_secs: u64,
    /// Bounded outbound queue depth per client; a client that can't keep up
    /// is disconnected (§4.G Broadcast).
    pub outbound_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 54,
            read_deadline_secs: 60,
            outbound_queue_capacity: 256,
        }
    }
}

/// Default sliding-window limits, §4.A. These are the multi-scope defaults;
/// a given call site may name a different scope/limit directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub session_per_minute: RateWindow,
    pub ip_per_minute: RateWindow,
    pub user_per_hour: RateWindow,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            session_per_minute: RateWindow { limit: 5, window_secs: 60 },
            ip_per_minute: RateWindow { limit: 100, window_secs: 60 },
            user_per_hour: RateWindow { limit: 10, window_secs: 3600 },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateWindow {
    pub limit: u64,
    pub window_secs: u64,
}

/// Webhook dispatch defaults, §4.D.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
    pub request_timeout_secs: u64,
    pub invocation_ttl_secs: u64,
    pub active_invocation_ttl_secs: u64,
    pub staleness_timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 8,
            queue_capacity: 1024,
            request_timeout_secs: 10,
            invocation_ttl_secs: 7 * 24 * 3600,
            active_invocation_ttl_secs: 3600,
            staleness_timeout_secs: 15 * 60,
        }
    }
}
