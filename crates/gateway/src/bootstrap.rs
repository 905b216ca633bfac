//! Wiring: build every subsystem from an [`AppConfig`].

use crate::assistant::{Assistant, HistoryLimits};
use falcon_agent::ReasoningLoop;
use falcon_config::AppConfig;
use falcon_core::event::EventBus;
use falcon_core::provider::Provider;
use falcon_speech::SpeechPlaybackManager;
use falcon_tools::{Collaborators, ToolRouter};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Build the assistant from configuration. Never fails: a store or
/// reasoning API that cannot be set up leaves the assistant "not ready".
pub async fn build_assistant(config: &AppConfig) -> Assistant {
    let provider = match falcon_providers::build_from_config(config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(error = %e, "Reasoning API unavailable, assistant will not answer queries");
            None
        }
    };
    build_assistant_with(config, provider).await
}

/// Like [`build_assistant`] with an explicit reasoning API.
pub async fn build_assistant_with(config: &AppConfig, provider: Option<Arc<dyn Provider>>) -> Assistant {
    let events = Arc::new(EventBus::default());

    let engine = falcon_speech::build_engine(&config.speech);
    let speech = Arc::new(SpeechPlaybackManager::from_config(&config.speech, engine, events.clone()));

    let memory = match falcon_memory::build_from_config(config).await {
        Ok(memory) => {
            info!(backend = memory.name(), "Memory store ready");
            Some(memory)
        }
        Err(e) => {
            error!(error = %e, "Could not open the memory store");
            None
        }
    };

    let agent = match (&memory, provider) {
        (Some(memory), Some(provider)) => {
            let collaborators = Collaborators::from_config(&config.collaborators);
            info!(enabled = ?collaborators.enabled(), "External collaborators configured");

            let tools = ToolRouter::new(memory.clone(), provider.clone(), config.default_model.clone())
                .with_collaborators(collaborators)
                .with_event_bus(events.clone())
                .with_limits(config.memory.recall_limit, config.memory.topic_search_limit);

            let agent = ReasoningLoop::from_config(config, provider, memory.clone(), tools, events.clone());
            info!(model = agent.model(), "Reasoning loop ready");
            Some(agent)
        }
        _ => None,
    };

    Assistant::new(agent, memory, speech, events).with_limits(HistoryLimits {
        page: config.memory.history_page,
        search: config.memory.history_page,
    })
}
