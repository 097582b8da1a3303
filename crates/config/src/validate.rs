//! Minimal configuration validation: diagnostics for out-of-range rate
//! limit/webhook values that would otherwise silently misbehave.

use crate::schema::TmiCollabConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Validate a loaded config, returning diagnostics for values that would
/// make the server misbehave (zero-length windows, an empty Redis URL, an
/// invocation TTL shorter than its staleness timeout, etc).
#[must_use]
pub fn validate(config: &TmiCollabConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    if config.redis.url.is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path: "redis.url",
            message: "redis.url must not be empty".to_string(),
        });
    }

    for (path, window) in [
        ("ratelimit.session_per_minute", config.ratelimit.session_per_minute),
        ("ratelimit.ip_per_minute", config.ratelimit.ip_per_minute),
        ("ratelimit.user_per_hour", config.ratelimit.user_per_hour),
    ] {
        if window.limit == 0 || window.window_secs == 0 {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                path,
                message: format!("limit and window_secs must both be > 0 (got {window:?})"),
            });
        }
    }

    if config.webhook.staleness_timeout_secs >= config.webhook.invocation_ttl_secs {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path: "webhook.staleness_timeout_secs",
            message: "staleness timeout is not shorter than the invocation TTL; stale \
                      invocations may expire before the reaper marks them failed"
                .to_string(),
        });
    }

    if config.webhook.worker_pool_size == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path: "webhook.worker_pool_size",
            message: "worker_pool_size must be > 0".to_string(),
        });
    }

    ValidationResult { diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let result = validate(&TmiCollabConfig::default());
        assert!(!result.has_errors());
    }

    #[test]
    fn flags_zero_rate_limit_window() {
        let mut cfg = TmiCollabConfig::default();
        cfg.ratelimit.ip_per_minute.limit = 0;
        let result = validate(&cfg);
        assert!(result.has_errors());
    }

    #[test]
    fn flags_empty_redis_url() {
        let mut cfg = TmiCollabConfig::default();
        cfg.redis.url.clear();
        assert!(validate(&cfg).has_errors());
    }
}
