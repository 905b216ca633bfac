//! Reasoning API provider implementations for Falcon.
//!
//! All providers implement the `falcon_core::Provider` trait.

pub mod chat_completions;

pub use chat_completions::ChatCompletionsProvider;

use falcon_core::error::ProviderError;
use falcon_core::provider::Provider;
use std::sync::Arc;

/// Build the configured provider.
///
/// Fails with `NotConfigured` when no API key is available, so the caller
/// can start without a working assistant instead of crashing.
pub fn build_from_config(
    config: &falcon_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key; set FALCON_API_KEY or GROQ_API_KEY".into(),
            )
        })?;

    tracing::info!(
        provider = %config.default_provider,
        url = %config.api_url,
        model = %config.default_model,
        "Configured reasoning provider"
    );

    Ok(Arc::new(ChatCompletionsProvider::new(
        config.default_provider.clone(),
        &config.api_url,
        api_key,
    )))
}
