//! `margin ask` — resolve provider and model, run one query, print the answer.
//!
//! The same pieces drive each turn of `margin chat`.

use std::io::Write;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{debug, info};

use margin_core::config::Settings;
use margin_core::types::{Completion, Message, QueryConfig};
use margin_providers::reasoning::split_think_tags;
use margin_providers::registry::{find_by_model, find_by_name, query, ProviderSpec};
use margin_providers::{QueryResult, StreamChunk, StreamHandle, Transport};

use crate::helpers;
use crate::TargetArgs;

/// Run the `ask` command.
pub async fn run(settings: &Settings, target: &TargetArgs, question: &str) -> Result<()> {
    let (spec, model) = resolve_target(settings, target)?;
    let config = build_config(settings, spec, &model, target);
    let transport = Transport::new(&settings.transport).context("failed to build HTTP client")?;

    info!(provider = spec.name, model = %model, "asking");
    let messages = vec![Message::user(question)];
    answer(&messages, &config, &transport).await?;
    Ok(())
}

// ─────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────

/// Pick the provider and model for a call.
///
/// Provider: `-p`, else the owner of `-m` when recognizable, else settings.
/// Model: `-m`, else settings for that provider, else the registry default.
pub fn resolve_target(
    settings: &Settings,
    target: &TargetArgs,
) -> Result<(&'static ProviderSpec, String)> {
    let cli_model = target.model.as_deref().map(str::trim).filter(|m| !m.is_empty());

    let spec = match target.provider.as_deref() {
        Some(name) => find_by_name(name),
        None => cli_model
            .and_then(find_by_model)
            .or_else(|| find_by_name(&settings.provider)),
    };
    let Some(spec) = spec else {
        let name = target.provider.as_deref().unwrap_or(&settings.provider);
        bail!("Unknown provider '{name}'. Run `margin providers` to list them.");
    };

    let model = cli_model
        .or_else(|| settings.model_for(spec.name))
        .unwrap_or(spec.default_model)
        .to_string();
    if model.is_empty() {
        bail!(
            "No model configured for {}. Pass --model or set one in settings.",
            spec.display_name
        );
    }

    debug!(provider = spec.name, model = %model, "resolved target");
    Ok((spec, model))
}

/// Per-call configuration: settings, then the provider's env var for the
/// key, then command-line overrides.
pub fn build_config(
    settings: &Settings,
    spec: &ProviderSpec,
    model: &str,
    target: &TargetArgs,
) -> QueryConfig {
    let mut config = settings.query_config(spec.name, model);
    if config.api_key.is_none() {
        config.api_key = spec.env_api_key();
    }
    if target.stream {
        config.features.enable_streaming = true;
    }
    if let Some(system) = target.system.as_deref().filter(|s| !s.trim().is_empty()) {
        config.system.text = Some(system.to_string());
    }
    config
}

// ─────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────

/// Run one query and print the answer; returns it for conversation history.
pub async fn answer(
    messages: &[Message],
    config: &QueryConfig,
    transport: &Transport,
) -> Result<Completion> {
    let one_shot = !config.features.enable_streaming;
    if one_shot {
        helpers::print_thinking();
    }

    let result = query(messages, config, transport).await;
    if let QueryResult::Streaming(stream) = result {
        return print_stream(stream).await;
    }
    if let QueryResult::Deferred(deferred) = &result {
        debug!(url = %deferred.envelope().url, "resolving deferred request");
    }
    let completion = result.into_completion().await;
    if one_shot {
        helpers::clear_thinking();
    }

    let completion = completion?;
    helpers::print_completion(&completion);
    Ok(completion)
}

/// Print chunks as they arrive.
///
/// Inline think tags are only split after the stream ends; the answer kept
/// for history has them removed.
async fn print_stream(mut stream: StreamHandle) -> Result<Completion> {
    helpers::print_header();
    let mut stdout = std::io::stdout();
    let mut reasoning = String::new();

    while let Some(next) = stream.next_chunk().await {
        match next {
            Ok(StreamChunk::Text(text)) => {
                print!("{text}");
            }
            Ok(StreamChunk::Reasoning(text)) => {
                print!("{}", text.dimmed());
                reasoning.push_str(&text);
            }
            Err(err) => {
                println!();
                if let Some(partial) = err.partial_text().filter(|p| !p.is_empty()) {
                    debug!(chars = partial.chars().count(), "stream failed after partial output");
                }
                return Err(err.into());
            }
        }
        let _ = stdout.flush();
    }
    println!();
    println!();

    let (text, inline) = split_think_tags(stream.partial_text());
    let reasoning = Some(reasoning).filter(|r| !r.trim().is_empty()).or(inline);
    Ok(Completion { text, reasoning })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::config::ProviderSettings;

    fn target(provider: Option<&str>, model: Option<&str>) -> TargetArgs {
        TargetArgs {
            provider: provider.map(String::from),
            model: model.map(String::from),
            ..TargetArgs::default()
        }
    }

    #[test]
    fn explicit_provider_and_model() {
        let settings = Settings::default();
        let (spec, model) =
            resolve_target(&settings, &target(Some("groq"), Some("llama-3.3-70b"))).unwrap();
        assert_eq!(spec.name, "groq");
        assert_eq!(model, "llama-3.3-70b");
    }

    #[test]
    fn provider_inferred_from_model() {
        let settings = Settings::default();
        let (spec, _) = resolve_target(&settings, &target(None, Some("deepseek-chat"))).unwrap();
        assert_eq!(spec.name, "deepseek");

        let (spec, _) = resolve_target(&settings, &target(None, Some("gemini-2.5-flash"))).unwrap();
        assert_eq!(spec.name, "gemini");
    }

    #[test]
    fn unrecognized_model_uses_settings_provider() {
        let settings = Settings {
            provider: "groq".into(),
            ..Settings::default()
        };
        let (spec, model) = resolve_target(&settings, &target(None, Some("my-model"))).unwrap();
        assert_eq!(spec.name, "groq");
        assert_eq!(model, "my-model");
    }

    #[test]
    fn model_falls_back_to_settings_then_default() {
        let mut settings = Settings::default();
        settings.providers.insert(
            "mistral".into(),
            ProviderSettings {
                model: Some("mistral-large-latest".into()),
                ..ProviderSettings::default()
            },
        );
        let (_, model) = resolve_target(&settings, &target(Some("mistral"), None)).unwrap();
        assert_eq!(model, "mistral-large-latest");

        let (spec, model) = resolve_target(&settings, &target(Some("groq"), None)).unwrap();
        assert_eq!(model, spec.default_model);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = resolve_target(&Settings::default(), &target(Some("nope"), None)).unwrap_err();
        assert!(err.to_string().contains("Unknown provider 'nope'"));
    }

    #[test]
    fn custom_without_model_is_an_error() {
        let err = resolve_target(&Settings::default(), &target(Some("custom"), None)).unwrap_err();
        assert!(err.to_string().contains("No model configured"));
    }

    #[test]
    fn config_applies_cli_overrides() {
        let mut settings = Settings::default();
        settings.providers.insert(
            "groq".into(),
            ProviderSettings {
                api_key: "gsk-settings".into(),
                ..ProviderSettings::default()
            },
        );
        let spec = find_by_name("groq").unwrap();
        let args = TargetArgs {
            stream: true,
            system: Some("Be brief.".into()),
            ..TargetArgs::default()
        };
        let config = build_config(&settings, spec, "llama-3.3-70b", &args);
        assert_eq!(config.api_key(), Some("gsk-settings"));
        assert!(config.features.enable_streaming);
        assert_eq!(config.system_text(), Some("Be brief."));
        assert_eq!(config.model, "llama-3.3-70b");
    }

    #[test]
    fn blank_system_override_is_ignored() {
        let mut settings = Settings::default();
        settings.system.text = Some("From settings".into());
        let spec = find_by_name("openai").unwrap();
        let args = TargetArgs {
            system: Some("  ".into()),
            ..TargetArgs::default()
        };
        let config = build_config(&settings, spec, "gpt-4o", &args);
        assert_eq!(config.system_text(), Some("From settings"));
    }
}
