//! Configuration loading for the CLI host, mirroring the teacher's
//! `memory-cli::config::loader` layering: explicit `--config` path, else an
//! env var, else a short list of default filenames, else defaults.

use anyhow::Context;
use insider_core::EngineConfig;
use std::path::Path;

const ENV_CONFIG_PATH: &str = "INSIDER_DETECT_CONFIG";
const DEFAULT_CONFIG_PATHS: &[&str] = &["insider-detect.toml", ".insider-detect.toml"];

/// Loads `EngineConfig` from `path`, the `INSIDER_DETECT_CONFIG` env var, a
/// default filename, or built-in defaults, in that priority order.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    if let Some(path) = path {
        return load_from_file(path);
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = Path::new(&env_path);
        if path.exists() {
            tracing::info!(path = %env_path, "loading configuration from INSIDER_DETECT_CONFIG");
            return load_from_file(path);
        }
        tracing::warn!(path = %env_path, "INSIDER_DETECT_CONFIG points to a non-existent file");
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            return load_from_file(path);
        }
    }

    Ok(EngineConfig::default())
}

fn load_from_file(path: &Path) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: EngineConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse TOML config: {}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration in {}: {e}", path.display()))?;
    Ok(config)
}
