//! Tool router: turns a model tool call into a result string.
//!
//! Dispatch is total: unknown names, disabled helpers, malformed arguments
//! and failing operations all come back as marked text for the model to
//! read, never as an error to the caller.

use crate::catalogue::{self, ToolKind};
use crate::command::Collaborators;
use crate::invocation::ToolInvocation;
use chrono::Utc;
use falcon_core::collaborator::Collaborator;
use falcon_core::error::ToolError;
use falcon_core::event::{DomainEvent, EventBus};
use falcon_core::memory::MemoryStore;
use falcon_core::message::{Message, MessageToolCall};
use falcon_core::provider::{Provider, ProviderRequest};
use falcon_core::tool::ToolDefinition;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Prefix of the result returned for unknown or disabled tools.
pub const UNKNOWN_OR_DISABLED: &str = "⚠️ Unknown or disabled function";

/// Prefix of the result returned when a tool fails.
pub const EXECUTION_ERROR: &str = "❌ Error executing";

pub const NOTE_SAVED: &str = "💾 Note saved to long-term memory";
pub const NO_MATCHING_NOTES: &str = "🧠 I found no memories matching that query.";
pub const NOTE_NOT_FOUND: &str = "⚠️ Could not find a memory with ID";
pub const IMAGE_GENERATED: &str = "🖼️ Image generated and opened.";
pub const CONTENT_SAVED: &str = "✅ Content generated and saved to file.";

pub fn unknown_or_disabled(name: &str) -> String {
    format!("{UNKNOWN_OR_DISABLED} '{name}'.")
}

pub fn execution_error(name: &str, error: &ToolError) -> String {
    format!("{EXECUTION_ERROR} {name}: {error}")
}

/// Dispatches tool calls against memory, the reasoning API (for topic
/// summaries) and the external collaborators.
pub struct ToolRouter {
    memory: Arc<dyn MemoryStore>,
    provider: Arc<dyn Provider>,
    model: String,
    collaborators: Collaborators,
    events: Option<Arc<EventBus>>,
    recall_limit: usize,
    topic_search_limit: usize,
}

impl ToolRouter {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            memory,
            provider,
            model: model.into(),
            collaborators: Collaborators::none(),
            events: None,
            recall_limit: 5,
            topic_search_limit: 10,
        }
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Limits for `recall_memory` and `summarize_conversation_topic`.
    pub fn with_limits(mut self, recall_limit: usize, topic_search_limit: usize) -> Self {
        self.recall_limit = recall_limit;
        self.topic_search_limit = topic_search_limit;
        self
    }

    /// The catalogue advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        catalogue::definitions()
    }

    /// Dispatch a tool call as produced by the model. `arguments` is the raw
    /// JSON string from the call.
    pub async fn dispatch_call(&self, call: &MessageToolCall) -> String {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            Ok(serde_json::Value::Object(Default::default()))
        } else {
            serde_json::from_str(raw)
        };

        match arguments {
            Ok(arguments) => self.dispatch(&call.name, &arguments).await,
            Err(e) => {
                let error = ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}"));
                self.report(&call.name, false, Instant::now());
                execution_error(&call.name, &error)
            }
        }
    }

    /// Dispatch `name` with already-parsed `arguments`.
    pub async fn dispatch(&self, name: &str, arguments: &serde_json::Value) -> String {
        let started = Instant::now();

        let invocation = ToolKind::from_name(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
            .and_then(|kind| ToolInvocation::decode(kind, arguments));
        let outcome = match invocation {
            Ok(invocation) => {
                let kind = invocation.kind();
                debug!(tool = kind.name(), "Executing tool");
                self.execute(invocation).await.map(|text| (kind, text))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((kind, text)) => {
                self.report(kind.name(), true, started);
                text
            }
            Err(e @ (ToolError::NotFound(_) | ToolError::Disabled(_))) => {
                debug!(tool = name, reason = %e, "Tool unavailable to the model");
                self.report(name, false, started);
                unknown_or_disabled(name)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                self.report(name, false, started);
                execution_error(name, &e)
            }
        }
    }

    async fn execute(&self, invocation: ToolInvocation) -> Result<String, ToolError> {
        match invocation {
            ToolInvocation::SaveMemoryNote(args) => {
                let keywords = args.keywords.as_deref().map(str::trim).filter(|k| !k.is_empty());
                let id = self.memory.save_note(&args.note, keywords).await?;
                Ok(format!("{NOTE_SAVED} (id={id})."))
            }

            ToolInvocation::RecallMemory(args) => {
                let notes = self.memory.search_notes(&args.query, self.recall_limit).await?;
                if notes.is_empty() {
                    return Ok(NO_MATCHING_NOTES.to_string());
                }
                let lines: Vec<String> = notes
                    .iter()
                    .map(|n| format!("- (id={}) {}", n.id, n.content))
                    .collect();
                Ok(format!("🧠 Here is what I found in my memory:\n{}", lines.join("\n")))
            }

            ToolInvocation::ForgetMemory(args) => {
                if self.memory.delete_note(args.memory_id).await? {
                    Ok(format!("🗑️ Memory with ID {} has been forgotten.", args.memory_id))
                } else {
                    Ok(format!("{NOTE_NOT_FOUND} {} to forget.", args.memory_id))
                }
            }

            ToolInvocation::SummarizeConversationTopic(args) => self.summarize_topic(&args.topic).await,

            ToolInvocation::ExecuteSystemTask(args) => {
                let helper = Self::require(&self.collaborators.task_executor, ToolKind::ExecuteSystemTask)?;
                let result = helper.run(&args.task_description).await?;
                Ok(format!("✅ System task executed. Result: {result}"))
            }

            ToolInvocation::GenerateImage(args) => {
                let helper = Self::require(&self.collaborators.image_generator, ToolKind::GenerateImage)?;
                helper.run(&args.prompt).await?;
                Ok(IMAGE_GENERATED.to_string())
            }

            ToolInvocation::GenerateAndSaveContent(args) => {
                let helper =
                    Self::require(&self.collaborators.content_generator, ToolKind::GenerateAndSaveContent)?;
                helper.run(&args.topic).await?;
                Ok(CONTENT_SAVED.to_string())
            }

            ToolInvocation::PlaySong(args) => {
                let helper = Self::require(&self.collaborators.music_player, ToolKind::PlaySong)?;
                helper.run(&args.song_name).await?;
                Ok(format!("🎵 Now playing '{}'.", args.song_name))
            }
        }
    }

    /// Search past turns for `topic` and ask the model for a summary.
    async fn summarize_topic(&self, topic: &str) -> Result<String, ToolError> {
        let snippets = self.memory.search_turns(topic, self.topic_search_limit).await?;
        if snippets.is_empty() {
            return Ok(format!(
                "I couldn't find any discussion about '{topic}' in our conversation history."
            ));
        }

        let snippets_json = serde_json::to_string(&snippets)
            .map_err(|e| ToolError::InvalidArguments(format!("cannot encode snippets: {e}")))?;
        let prompt = format!(
            "Please summarize the following conversation snippets about '{topic}':\n{snippets_json}"
        );

        let request = ProviderRequest::new(self.model.clone(), vec![Message::user(prompt)]);
        let response = self.provider.complete(request).await?;
        Ok(format!(
            "🔍 Here is a summary of our past discussions on that topic:\n{}",
            response.message.content.trim()
        ))
    }

    fn require(
        slot: &Option<Arc<dyn Collaborator>>,
        kind: ToolKind,
    ) -> Result<&Arc<dyn Collaborator>, ToolError> {
        slot.as_ref().ok_or_else(|| ToolError::Disabled(kind.name().to_string()))
    }

    fn report(&self, tool_name: &str, success: bool, started: Instant) {
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                tool_name: tool_name.to_string(),
                success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use falcon_core::error::ProviderError;
    use falcon_core::provider::ProviderResponse;
    use falcon_memory::InMemoryStore;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every request with a fixed text and records prompts.
    struct FixedProvider {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            Ok(ProviderResponse {
                message: Message::assistant(self.reply.clone()),
                usage: None,
                model: request.model,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    /// Echoes its input back.
    struct EchoHelper;

    #[async_trait]
    impl Collaborator for EchoHelper {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, input: &str) -> Result<String, ToolError> {
            Ok(format!("did: {input}"))
        }
    }

    struct BrokenHelper;

    #[async_trait]
    impl Collaborator for BrokenHelper {
        fn name(&self) -> &str {
            "broken"
        }

        async fn run(&self, _input: &str) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "device offline".into(),
            })
        }
    }

    fn all_helpers() -> Collaborators {
        Collaborators {
            task_executor: Some(Arc::new(EchoHelper)),
            image_generator: Some(Arc::new(EchoHelper)),
            content_generator: Some(Arc::new(EchoHelper)),
            music_player: Some(Arc::new(EchoHelper)),
        }
    }

    fn router_with(memory: Arc<InMemoryStore>) -> ToolRouter {
        ToolRouter::new(memory, FixedProvider::new("You discussed Rust twice."), "test-model")
            .with_collaborators(all_helpers())
    }

    #[tokio::test]
    async fn save_then_recall_note() {
        let memory = Arc::new(InMemoryStore::new());
        let router = router_with(memory.clone());

        let saved = router
            .dispatch("save_memory_note", &json!({"note": "favorite color is blue", "keywords": "preferences"}))
            .await;
        assert!(saved.starts_with(NOTE_SAVED));
        assert!(saved.contains("id=1"));

        let recalled = router.dispatch("recall_memory", &json!({"query": "blue"})).await;
        assert!(recalled.contains("(id=1) favorite color is blue"));

        let none = router.dispatch("recall_memory", &json!({"query": "pizza"})).await;
        assert_eq!(none, NO_MATCHING_NOTES);
    }

    #[tokio::test]
    async fn forget_existing_and_missing_notes() {
        let memory = Arc::new(InMemoryStore::new());
        let id = memory.save_note("temporary", None).await.unwrap();
        let router = router_with(memory.clone());

        let gone = router.dispatch("forget_memory", &json!({"memory_id": id})).await;
        assert!(gone.contains("has been forgotten"));

        let missing = router.dispatch("forget_memory", &json!({"memory_id": 404})).await;
        assert!(missing.starts_with(NOTE_NOT_FOUND));
        assert_eq!(memory.note_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn summarize_uses_one_extra_model_call() {
        let memory = Arc::new(InMemoryStore::new());
        let turn = memory.record_turn("what is Rust?").await.unwrap();
        memory.complete_turn(turn, "A systems language.").await.unwrap();

        let provider = FixedProvider::new("You asked what Rust is.");
        let router = ToolRouter::new(memory, provider.clone(), "m");

        let summary = router
            .dispatch("summarize_conversation_topic", &json!({"topic": "rust"}))
            .await;
        assert!(summary.starts_with("🔍 Here is a summary"));
        assert!(summary.ends_with("You asked what Rust is."));

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("what is Rust?"));
    }

    #[tokio::test]
    async fn summarize_without_matches_skips_the_model() {
        let provider = FixedProvider::new("unused");
        let router = ToolRouter::new(Arc::new(InMemoryStore::new()), provider.clone(), "m");

        let text = router
            .dispatch("summarize_conversation_topic", &json!({"topic": "gardening"}))
            .await;
        assert!(text.contains("couldn't find any discussion about 'gardening'"));
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn summarize_provider_failure_becomes_error_text() {
        let memory = Arc::new(InMemoryStore::new());
        let turn = memory.record_turn("rust again").await.unwrap();
        memory.complete_turn(turn, "yes").await.unwrap();
        let router = ToolRouter::new(memory, Arc::new(FailingProvider), "m");

        let text = router
            .dispatch("summarize_conversation_topic", &json!({"topic": "rust"}))
            .await;
        assert!(text.starts_with("❌ Error executing summarize_conversation_topic"));
        assert!(text.contains("connection refused"));
    }

    #[tokio::test]
    async fn every_tool_returns_text_with_helpers_available() {
        let router = router_with(Arc::new(InMemoryStore::new()));
        let calls = [
            ("save_memory_note", json!({"note": "n", "keywords": "k"})),
            ("recall_memory", json!({"query": "n"})),
            ("forget_memory", json!({"memory_id": 1})),
            ("summarize_conversation_topic", json!({"topic": "t"})),
            ("execute_system_task", json!({"task_description": "open calculator"})),
            ("generate_image", json!({"prompt": "a falcon at dawn"})),
            ("generate_and_save_content", json!({"topic": "a poem"})),
            ("play_song", json!({"song_name": "Blue"})),
        ];
        for (name, args) in calls {
            let text = router.dispatch(name, &args).await;
            assert!(!text.is_empty(), "{name} returned empty text");
            assert!(!text.starts_with(UNKNOWN_OR_DISABLED), "{name}: {text}");
            assert!(!text.starts_with(EXECUTION_ERROR), "{name}: {text}");
        }
    }

    #[tokio::test]
    async fn collaborator_results_are_wrapped() {
        let router = router_with(Arc::new(InMemoryStore::new()));
        let text = router
            .dispatch("execute_system_task", &json!({"task_description": "open notepad"}))
            .await;
        assert_eq!(text, "✅ System task executed. Result: did: open notepad");

        let song = router.dispatch("play_song", &json!({"song_name": "Blue"})).await;
        assert_eq!(song, "🎵 Now playing 'Blue'.");
    }

    #[tokio::test]
    async fn unknown_tool_is_marked() {
        let router = router_with(Arc::new(InMemoryStore::new()));
        let text = router.dispatch("launch_rocket", &json!({})).await;
        assert_eq!(text, "⚠️ Unknown or disabled function 'launch_rocket'.");
    }

    #[tokio::test]
    async fn disabled_helper_is_marked_like_unknown() {
        let router = ToolRouter::new(Arc::new(InMemoryStore::new()), FixedProvider::new("x"), "m");
        let text = router.dispatch("generate_image", &json!({"prompt": "cat"})).await;
        assert_eq!(text, unknown_or_disabled("generate_image"));
    }

    #[tokio::test]
    async fn helper_failure_becomes_error_text() {
        let router = ToolRouter::new(Arc::new(InMemoryStore::new()), FixedProvider::new("x"), "m")
            .with_collaborators(Collaborators {
                music_player: Some(Arc::new(BrokenHelper)),
                ..Collaborators::none()
            });
        let text = router.dispatch("play_song", &json!({"song_name": "x"})).await;
        assert!(text.starts_with("❌ Error executing play_song"));
        assert!(text.contains("device offline"));
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_text() {
        let router = router_with(Arc::new(InMemoryStore::new()));
        let call = MessageToolCall {
            id: "call_1".into(),
            name: "recall_memory".into(),
            arguments: "{not json".into(),
        };
        let text = router.dispatch_call(&call).await;
        assert!(text.starts_with("❌ Error executing recall_memory"));

        let missing = router.dispatch("forget_memory", &json!({"memory_id": "abc"})).await;
        assert!(missing.starts_with(EXECUTION_ERROR));
    }

    #[tokio::test]
    async fn dispatch_publishes_tool_events() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let router = router_with(Arc::new(InMemoryStore::new())).with_event_bus(bus);

        router.dispatch("recall_memory", &json!({"query": "x"})).await;
        router.dispatch("nope", &json!({})).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "recall_memory");
                assert!(success);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "nope");
                assert!(!success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_dispatch_reports_the_decoded_tool() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let router = router_with(Arc::new(InMemoryStore::new())).with_event_bus(bus);

        let reply = router
            .dispatch("save_memory_note", &json!({"note": "likes tea"}))
            .await;
        assert!(reply.starts_with(NOTE_SAVED));

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, ToolKind::SaveMemoryNote.name());
                assert!(success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
