//! `margin providers` — settings location, default target, and per-provider
//! key status.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use margin_core::config::{get_settings_path, Settings};
use margin_providers::registry::{find_by_name, ProviderSpec, WireFormat, PROVIDERS};

/// Where a provider's key would come from.
#[derive(Debug, PartialEq, Eq)]
enum KeyStatus {
    Settings,
    Env(&'static str),
    NotNeeded,
    Missing,
}

fn key_status(settings: &Settings, spec: &ProviderSpec) -> KeyStatus {
    let in_settings = settings
        .provider_settings(spec.name)
        .is_some_and(|p| p.is_configured());
    if in_settings {
        KeyStatus::Settings
    } else if spec.env_api_key().is_some() {
        KeyStatus::Env(spec.env_key)
    } else if spec.is_local {
        KeyStatus::NotNeeded
    } else {
        KeyStatus::Missing
    }
}

/// Run the providers command.
pub fn run(settings: &Settings, path: Option<&Path>) -> Result<()> {
    let settings_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_settings_path);

    println!();
    println!("{}", "Margin Providers".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Settings:".bold(),
        settings_path.display(),
        if settings_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found)".red().to_string()
        }
    );

    let default_model = settings
        .model_for(&settings.provider)
        .map(str::to_string)
        .or_else(|| {
            find_by_name(&settings.provider).map(|s| s.default_model.to_string())
        })
        .unwrap_or_default();
    println!("  {:<18} {}", "Provider:".bold(), settings.provider);
    println!("  {:<18} {}", "Model:".bold(), default_model);
    println!(
        "  {:<18} {}",
        "Streaming:".bold(),
        if settings.features.enable_streaming { "on" } else { "off" }
    );

    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let status = match key_status(settings, spec) {
            KeyStatus::Settings => format!("{} (key set)", "✓".green()),
            KeyStatus::Env(var) => format!("{} (from {var})", "✓".green()),
            KeyStatus::NotNeeded => format!("{}", "· local, no key needed".dimmed()),
            KeyStatus::Missing => format!("{}", "· not configured".dimmed()),
        };
        let wire = match spec.wire {
            WireFormat::OpenAiCompatible => "",
            WireFormat::Gemini => " [gemini]",
        };
        println!(
            "    {:<12} {:<28} {}{}",
            spec.name,
            spec.display_name,
            status,
            wire.dimmed()
        );
    }

    println!();

    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::config::ProviderSettings;

    #[test]
    fn key_from_settings() {
        let mut settings = Settings::default();
        settings.providers.insert(
            "deepseek".into(),
            ProviderSettings {
                api_key: "sk-test".into(),
                ..ProviderSettings::default()
            },
        );
        let spec = find_by_name("deepseek").unwrap();
        assert_eq!(key_status(&settings, spec), KeyStatus::Settings);
    }

    #[test]
    fn custom_without_key_is_not_missing() {
        let spec = find_by_name("custom").unwrap();
        assert_eq!(key_status(&Settings::default(), spec), KeyStatus::NotNeeded);
    }

    #[test]
    fn run_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(run(&Settings::default(), Some(&path)).is_ok());
    }
}
