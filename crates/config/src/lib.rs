//! Configuration loading, validation, and env substitution for the
//! collaboration core.
//!
//! Config files: `tmi-collab.toml`, `tmi-collab.yaml`, or `tmi-collab.json`.
//! Searched in `./` then `~/.config/tmi-collab/`. Supports `${ENV_VAR}`
//! substitution in all string values, and `TMI_COLLAB_*` env var overrides
//! applied after file load.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::{apply_env_overrides, config_dir, discover_and_load, load_config};
pub use schema::{
    RateLimitConfig, RateWindow, RedisConfig, ServerConfig, SessionConfig, TmiCollabConfig,
    WebhookConfig,
};
pub use validate::{Diagnostic, Severity, ValidationResult, validate};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),
}
