//! The reasoning loop implementation.

use crate::instructions::{self, MEMORY_CONTEXT_HEADER};
use crate::primer::RetrievalPrimer;
use chrono::Utc;
use falcon_config::AppConfig;
use falcon_core::event::{DomainEvent, EventBus};
use falcon_core::memory::{MemoryStore, TurnId};
use falcon_core::message::Message;
use falcon_core::provider::{Provider, ProviderRequest};
use falcon_tools::ToolRouter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Prefix of the answer returned when a turn fails.
pub const CRITICAL_ERROR_PREFIX: &str = "I've encountered a critical error in my cognitive loop";

/// Phases of a single turn, logged as the turn progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    Primed,
    AwaitingModel,
    DirectAnswer,
    ToolDispatch,
    AwaitingFinal,
    Persisted,
}

/// Outcome of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    /// `None` when the turn could not even be recorded
    pub turn_id: Option<TurnId>,
    pub answer: String,
    pub tool_calls: usize,
    pub failed: bool,
}

/// Turns one user message into one answer: prime, ask the model, run any
/// tool calls, ask again, persist.
pub struct ReasoningLoop {
    /// The reasoning API
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Conversation and note storage
    memory: Arc<dyn MemoryStore>,

    /// Memory digest builder
    primer: RetrievalPrimer,

    /// Tool dispatch
    tools: ToolRouter,

    /// First system message of every context
    system_prompt: String,

    /// Completed turns replayed as history
    history_turns: usize,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl ReasoningLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        memory: Arc<dyn MemoryStore>,
        tools: ToolRouter,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            primer: RetrievalPrimer::new(memory.clone(), 5),
            memory,
            tools,
            system_prompt: instructions::system_prompt(&Default::default()),
            history_turns: 3,
            event_bus,
        }
    }

    /// Build a loop with model, limits and persona taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        memory: Arc<dyn MemoryStore>,
        tools: ToolRouter,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(provider, config.default_model.clone(), memory, tools, event_bus)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_history_turns(config.memory.history_turns)
            .with_recall_limit(config.memory.recall_limit)
            .with_system_prompt(instructions::system_prompt(&config.identity))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Set the maximum number of notes primed per turn.
    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.primer = RetrievalPrimer::new(self.memory.clone(), limit);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Process a user message and return the answer text.
    pub async fn process(&self, user_input: &str) -> String {
        self.process_detailed(user_input).await.answer
    }

    /// Process a user message. Never fails: errors become an apology that is
    /// stored as the turn's response and returned.
    pub async fn process_detailed(&self, user_input: &str) -> TurnReport {
        let mut turn_id = None;
        let mut tool_calls = 0;

        let report = match self.run_turn(user_input, &mut turn_id, &mut tool_calls).await {
            Ok(answer) => {
                info!(turn_id = ?turn_id, tool_calls, "Turn completed");
                TurnReport {
                    turn_id,
                    answer,
                    tool_calls,
                    failed: false,
                }
            }
            Err(e) => {
                error!(turn_id = ?turn_id, error = %e, "Reasoning turn failed");
                let answer = format!("{CRITICAL_ERROR_PREFIX}: {e}");
                if let Some(id) = turn_id {
                    if let Err(store_err) = self.memory.complete_turn(id, &answer).await {
                        warn!(turn_id = id, error = %store_err, "Could not store failure response");
                    }
                }
                TurnReport {
                    turn_id,
                    answer,
                    tool_calls,
                    failed: true,
                }
            }
        };

        self.event_bus.publish(DomainEvent::TurnCompleted {
            turn_id: report.turn_id,
            tool_calls: report.tool_calls,
            failed: report.failed,
            timestamp: Utc::now(),
        });

        report
    }

    async fn run_turn(
        &self,
        user_input: &str,
        turn_id: &mut Option<TurnId>,
        tool_calls: &mut usize,
    ) -> Result<String, falcon_core::Error> {
        let id = self.memory.record_turn(user_input).await?;
        *turn_id = Some(id);
        Self::enter(id, TurnPhase::Received);

        let mut messages = self.build_context(user_input).await?;
        Self::enter(id, TurnPhase::Primed);

        let request = self
            .request(messages.clone())
            .with_tools(self.tools.definitions());
        Self::enter(id, TurnPhase::AwaitingModel);
        let response = self.provider.complete(request).await?;

        let answer = if !response.message.has_tool_calls() {
            Self::enter(id, TurnPhase::DirectAnswer);
            response.message.content.trim().to_string()
        } else {
            Self::enter(id, TurnPhase::ToolDispatch);
            let calls = response.message.tool_calls.clone();
            *tool_calls = calls.len();
            messages.push(response.message);

            for call in &calls {
                debug!(turn_id = id, tool = %call.name, call_id = %call.id, "Dispatching tool call");
                let result = self.tools.dispatch_call(call).await;
                messages.push(Message::tool_result(&call.id, result));
            }

            Self::enter(id, TurnPhase::AwaitingFinal);
            let final_response = self.provider.complete(self.request(messages)).await?;
            final_response.message.content.trim().to_string()
        };

        self.memory.complete_turn(id, &answer).await?;
        Self::enter(id, TurnPhase::Persisted);
        Ok(answer)
    }

    /// [system prompt, memory digest, recent history, user message]
    async fn build_context(&self, user_input: &str) -> Result<Vec<Message>, falcon_core::Error> {
        let digest = self.primer.prime(user_input).await;
        let history = self.memory.recent_turns(self.history_turns).await?;

        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(&self.system_prompt));
        messages.push(Message::system(format!("{MEMORY_CONTEXT_HEADER}\n{digest}")));
        messages.extend(history);
        messages.push(Message::user(user_input));
        Ok(messages)
    }

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest::new(self.model.clone(), messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    fn enter(turn_id: TurnId, phase: TurnPhase) {
        debug!(turn_id, phase = ?phase, "Turn phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primer::{NO_RELEVANT_MEMORIES, PRIMER_HEADER};
    use crate::test_helpers::{
        make_text_response, make_tool_call, make_tool_call_response, SequentialMockProvider,
        UnavailableStore,
    };
    use falcon_core::message::Role;
    use falcon_core::provider::ToolChoice;
    use falcon_memory::InMemoryStore;
    use serde_json::json;

    fn build(provider: Arc<SequentialMockProvider>, memory: Arc<InMemoryStore>) -> ReasoningLoop {
        let tools = ToolRouter::new(memory.clone(), provider.clone(), "mock-model");
        ReasoningLoop::new(provider, "mock-model", memory, tools, Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn direct_answer_is_trimmed_and_persisted() {
        let provider = Arc::new(SequentialMockProvider::single_text("  Hello there!  \n"));
        let memory = Arc::new(InMemoryStore::new());
        let agent = build(provider.clone(), memory.clone());

        let report = agent.process_detailed("Hi").await;
        assert_eq!(report.answer, "Hello there!");
        assert_eq!(report.tool_calls, 0);
        assert!(!report.failed);
        assert_eq!(provider.call_count(), 1);

        let history = memory.recent_turns(5).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hi");
        assert_eq!(history[1].content, "Hello there!");
    }

    #[tokio::test]
    async fn first_request_has_context_layers_and_tools() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let memory = Arc::new(InMemoryStore::new());
        let earlier = memory.record_turn("earlier question").await.unwrap();
        memory.complete_turn(earlier, "earlier answer").await.unwrap();
        let agent = build(provider.clone(), memory).with_system_prompt("PERSONA");

        agent.process("new question").await;

        let request = &provider.requests()[0];
        assert_eq!(request.tool_choice, ToolChoice::Auto);
        assert_eq!(request.tools.len(), 8);

        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(request.messages[0].content, "PERSONA");
        assert_eq!(
            request.messages[1].content,
            format!("{MEMORY_CONTEXT_HEADER}\n{NO_RELEVANT_MEMORIES}")
        );
        assert_eq!(request.messages[2].content, "earlier question");
        assert_eq!(request.messages[4].content, "new question");
    }

    #[tokio::test]
    async fn history_is_limited_to_configured_turns() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let memory = Arc::new(InMemoryStore::new());
        for i in 0..5 {
            let id = memory.record_turn(&format!("q{i}")).await.unwrap();
            memory.complete_turn(id, &format!("a{i}")).await.unwrap();
        }
        let agent = build(provider.clone(), memory).with_history_turns(2);

        agent.process("now").await;

        let contents: Vec<String> = provider.requests()[0]
            .messages
            .iter()
            .skip(2)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, ["q3", "a3", "q4", "a4", "now"]);
    }

    #[tokio::test]
    async fn tool_results_follow_calls_in_order_before_second_request() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("call_a", "save_memory_note", json!({"note": "likes tea", "keywords": "drinks"})),
                make_tool_call("call_b", "recall_memory", json!({"query": "tea"})),
            ],
            "Noted, you like tea.",
        ));
        let memory = Arc::new(InMemoryStore::new());
        let agent = build(provider.clone(), memory.clone());

        let report = agent.process_detailed("I like tea").await;
        assert_eq!(report.answer, "Noted, you like tea.");
        assert_eq!(report.tool_calls, 2);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);

        let second = &requests[1];
        assert!(second.tools.is_empty());
        assert_eq!(second.tool_choice, ToolChoice::None);

        let tail = &second.messages[second.messages.len() - 3..];
        assert_eq!(tail[0].role, Role::Assistant);
        assert_eq!(tail[0].tool_calls.len(), 2);
        assert_eq!(tail[1].role, Role::Tool);
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("call_a"));
        assert!(tail[1].content.starts_with("💾"));
        assert_eq!(tail[2].tool_call_id.as_deref(), Some("call_b"));
        assert!(tail[2].content.contains("likes tea"));

        assert_eq!(memory.note_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_still_reaches_final_answer() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("call_x", "teleport", json!({}))],
            "I can't do that.",
        ));
        let agent = build(provider.clone(), Arc::new(InMemoryStore::new()));

        assert_eq!(agent.process("beam me up").await, "I can't do that.");
        let tool_msg = provider.requests()[1].messages.last().cloned().unwrap();
        assert!(tool_msg.content.contains("Unknown or disabled function 'teleport'"));
    }

    #[tokio::test]
    async fn saved_note_primes_the_next_turn() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call(
                "call_1",
                "save_memory_note",
                json!({"note": "favorite color is blue", "keywords": "preferences"}),
            )]),
            make_text_response("Saved that your favorite color is blue."),
            make_text_response("Your favorite color is blue."),
        ]));
        let memory = Arc::new(InMemoryStore::new());
        let agent = build(provider.clone(), memory);

        agent.process("remember that my favorite color is blue").await;
        let answer = agent.process("favorite color").await;
        assert_eq!(answer, "Your favorite color is blue.");

        let third = &provider.requests()[2];
        assert!(third.messages[1].content.contains(PRIMER_HEADER));
        assert!(third.messages[1].content.contains("favorite color is blue"));
    }

    #[tokio::test]
    async fn provider_failure_is_persisted_as_apology() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let memory = Arc::new(InMemoryStore::new());
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let tools = ToolRouter::new(memory.clone(), provider.clone(), "m");
        let agent = ReasoningLoop::new(provider, "m", memory.clone(), tools, bus);

        let report = agent.process_detailed("hello?").await;
        assert!(report.failed);
        assert!(report.answer.starts_with(CRITICAL_ERROR_PREFIX));

        let turns = memory.all_turns().await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].assistant_response.as_deref(), Some(report.answer.as_str()));

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::TurnCompleted { failed, turn_id, .. } => {
                assert!(*failed);
                assert_eq!(*turn_id, report.turn_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_storage_still_returns_text() {
        let provider = Arc::new(SequentialMockProvider::single_text("unused"));
        let memory: Arc<dyn MemoryStore> = Arc::new(UnavailableStore);
        let tools = ToolRouter::new(memory.clone(), provider.clone(), "m");
        let agent = ReasoningLoop::new(provider.clone(), "m", memory, tools, Arc::new(EventBus::default()));

        let report = agent.process_detailed("hi").await;
        assert!(report.failed);
        assert!(report.turn_id.is_none());
        assert!(report.answer.contains("database is locked"));
        assert_eq!(provider.call_count(), 0);
    }
}
