use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{ConfigError, env_subst::substitute_env, schema::TmiCollabConfig};

const CONFIG_FILENAMES: &[&str] = &["tmi-collab.toml", "tmi-collab.yaml", "tmi-collab.yml", "tmi-collab.json"];
const ENV_PREFIX: &str = "TMI_COLLAB_";

/// Load config from the given path (any supported format), applying
/// `${ENV_VAR}` substitution before parsing.
pub fn load_config(path: &Path) -> Result<TmiCollabConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, falling back to
/// `TmiCollabConfig::default()` then applying env-var overrides.
///
/// Search order:
/// 1. `./tmi-collab.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tmi-collab/tmi-collab.{toml,yaml,yml,json}` (user-global)
pub fn discover_and_load() -> TmiCollabConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                TmiCollabConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        TmiCollabConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply `TMI_COLLAB_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut TmiCollabConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Same override logic as `apply_env_overrides`, but reading through an
/// injectable lookup rather than the real process environment — keeps the
/// unit tests below from touching `std::env::set_var`/`remove_var`, which
/// this workspace denies as `unsafe_code`.
fn apply_overrides_from(config: &mut TmiCollabConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup(&format!("{ENV_PREFIX}BIND_ADDR")) {
        config.server.bind_addr = v;
    }
    if let Some(v) = lookup(&format!("{ENV_PREFIX}REDIS_URL")) {
        config.redis.url = v;
    }
    if let Some(v) = lookup(&format!("{ENV_PREFIX}DATABASE_URL")) {
        config.database_url = v;
    }
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/tmi-collab/`).
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join("tmi-collab"))
}

fn parse_config(raw: &str, path: &Path) -> Result<TmiCollabConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string())),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults_for_unknown_extension() {
        let tmp = tempfile::NamedTempFile::with_suffix(".ini").unwrap();
        std::fs::write(tmp.path(), "bind_addr = \"x\"").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn loads_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmi-collab.toml");
        std::fs::write(&path, "database_url = \"postgres://x/y\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.database_url, "postgres://x/y");
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn env_override_wins_over_file() {
        let mut cfg = TmiCollabConfig::default();
        apply_overrides_from(&mut cfg, |key| {
            (key == "TMI_COLLAB_BIND_ADDR").then(|| "127.0.0.1:9000".to_string())
        });
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn missing_env_vars_leave_config_untouched() {
        let mut cfg = TmiCollabConfig::default();
        apply_overrides_from(&mut cfg, |_| None);
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8080");
    }
}
