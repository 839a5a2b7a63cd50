//! Settings loader — reads `~/.margin/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Settings::default()`)
//! 2. JSON file at `~/.margin/config.json`
//! 3. Environment variables `MARGIN_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::schema::Settings;

const ENV_PREFIX: &str = "MARGIN_";

/// Default settings file path.
pub fn get_settings_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load settings from the default path (or `path`) + env vars.
///
/// Falls back to `Settings::default()` if the file doesn't exist or can't be parsed.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let settings_path = path.map(PathBuf::from).unwrap_or_else(get_settings_path);
    apply_env_overrides(load_settings_from_path(&settings_path))
}

/// Load settings from a specific file path, without env overrides.
fn load_settings_from_path(path: &Path) -> Settings {
    if !path.exists() {
        info!("No settings file found at {}, using defaults", path.display());
        return Settings::default();
    }

    debug!("Loading settings from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read settings file {}: {}", path.display(), e);
            return Settings::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Failed to parse settings JSON: {}", e);
            Settings::default()
        }
    }
}

/// Save settings to disk (pretty-printed JSON with camelCase keys).
pub fn save_settings(settings: &Settings, path: Option<&Path>) -> anyhow::Result<()> {
    let settings_path = path.map(PathBuf::from).unwrap_or_else(get_settings_path);

    if let Some(parent) = settings_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
    std::fs::write(&settings_path, json)
        .with_context(|| format!("failed to write {}", settings_path.display()))?;
    debug!("Settings saved to {}", settings_path.display());
    Ok(())
}

/// Apply process environment overrides on top of loaded settings.
fn apply_env_overrides(settings: Settings) -> Settings {
    apply_overrides(settings, std::env::vars())
}

/// Apply `MARGIN_*` overrides from an iterator of `(name, value)` pairs.
///
/// Supported overrides:
/// - `MARGIN_PROVIDER`, `MARGIN_MODEL`
/// - `MARGIN_API_PARAMS__TEMPERATURE`, `MARGIN_API_PARAMS__MAX_TOKENS`
/// - `MARGIN_FEATURES__ENABLE_STREAMING`, `MARGIN_FEATURES__DEBUG`,
///   `MARGIN_FEATURES__QWEN_REGION`, `MARGIN_FEATURES__BACKGROUND_REQUESTS`
/// - `MARGIN_PROVIDERS__<NAME>__API_KEY|BASE_URL|MODEL`
/// - `MARGIN_TRANSPORT__REQUEST_TIMEOUT_SECS`, `MARGIN_TRANSPORT__STREAM_IDLE_TIMEOUT_SECS`
fn apply_overrides<I>(mut settings: Settings, vars: I) -> Settings
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, val) in vars {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match key {
            "PROVIDER" => settings.provider = val,
            "MODEL" => settings.model = Some(val),
            "API_PARAMS__TEMPERATURE" => {
                if let Ok(t) = val.parse::<f64>() {
                    settings.api_params.temperature = Some(t);
                }
            }
            "API_PARAMS__MAX_TOKENS" => {
                if let Ok(n) = val.parse::<u32>() {
                    settings.api_params.max_tokens = Some(n);
                }
            }
            "FEATURES__ENABLE_STREAMING" => settings.features.enable_streaming = is_truthy(&val),
            "FEATURES__DEBUG" => settings.features.debug = is_truthy(&val),
            "FEATURES__BACKGROUND_REQUESTS" => {
                settings.features.background_requests = is_truthy(&val)
            }
            "FEATURES__QWEN_REGION" => settings.features.qwen_region = Some(val.to_lowercase()),
            "TRANSPORT__REQUEST_TIMEOUT_SECS" => {
                if let Ok(n) = val.parse::<u64>() {
                    settings.transport.request_timeout_secs = n;
                }
            }
            "TRANSPORT__STREAM_IDLE_TIMEOUT_SECS" => {
                if let Ok(n) = val.parse::<u64>() {
                    settings.transport.stream_idle_timeout_secs = n;
                }
            }
            _ => {
                if let Some(rest) = key.strip_prefix("PROVIDERS__") {
                    apply_provider_override(&mut settings, rest, val);
                }
            }
        }
    }

    settings
}

/// Apply one `<NAME>__<FIELD>` provider override.
fn apply_provider_override(settings: &mut Settings, rest: &str, val: String) {
    let Some((name, field)) = rest.split_once("__") else {
        warn!("Ignoring malformed provider override MARGIN_PROVIDERS__{}", rest);
        return;
    };

    let entry = settings.providers.entry(name.to_lowercase()).or_default();
    match field {
        "API_KEY" => entry.api_key = val,
        "BASE_URL" => entry.base_url = Some(val),
        "MODEL" => entry.model = Some(val),
        other => warn!("Ignoring unknown provider field {} for {}", other, name),
    }
}

fn is_truthy(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
