//! Shared helpers for gateway tests.

use crate::assistant::Assistant;
use falcon_agent::ReasoningLoop;
use falcon_config::AppConfig;
use falcon_core::error::ProviderError;
use falcon_core::event::EventBus;
use falcon_core::memory::MemoryStore;
use falcon_core::message::Message;
use falcon_core::provider::{Provider, ProviderRequest, ProviderResponse};
use falcon_speech::{SimulatedEngine, SpeechPlaybackManager};
use falcon_tools::ToolRouter;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns scripted responses in order, then fails.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| ProviderResponse {
                    message: Message::assistant(*t),
                    usage: None,
                    model: "mock-model".into(),
                })
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ProviderError::Network("connection refused".into()));
        }
        Ok(responses.remove(0))
    }
}

/// In-memory store, simulated speech, a dummy key.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.api_key = Some("test-key".into());
    config.memory.backend = "memory".into();
    config.speech.engine = "simulated".into();
    config
}

pub fn assistant_with(provider: ScriptedProvider, memory: Arc<dyn MemoryStore>) -> Assistant {
    let events = Arc::new(EventBus::default());
    let provider: Arc<dyn Provider> = Arc::new(provider);
    let tools = ToolRouter::new(memory.clone(), provider.clone(), "mock-model").with_event_bus(events.clone());
    let agent = ReasoningLoop::new(provider, "mock-model", memory.clone(), tools, events.clone());

    let engine = Arc::new(SimulatedEngine::with_fixed_duration(Duration::from_secs(30)));
    let speech = Arc::new(
        SpeechPlaybackManager::new(engine, events.clone())
            .with_timing(Duration::from_millis(5), Duration::from_millis(500)),
    );
    Assistant::new(Some(agent), Some(memory), speech, events)
}
