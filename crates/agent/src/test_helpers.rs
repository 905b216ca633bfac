//! Shared test helpers for the reasoning loop and primer tests.

use async_trait::async_trait;
use falcon_core::error::{ProviderError, StorageError};
use falcon_core::memory::{ConversationTurn, MemoryNote, MemoryStore, NoteId, TurnId, TurnMatch};
use falcon_core::message::{Message, MessageToolCall};
use falcon_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses and keeps
/// every request it received.
///
/// Once the script is exhausted, further calls fail with
/// `ProviderError::InvalidResponse`.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![make_tool_call_response(tool_calls), make_text_response(answer)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        self.responses
            .lock()
            .unwrap()
            .get(call)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("no scripted response for call #{call}")))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response carrying only tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut msg = Message::assistant("");
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: None,
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A store whose every operation fails.
pub struct UnavailableStore;

fn unavailable() -> StorageError {
    StorageError::Unavailable("database is locked".into())
}

#[async_trait]
impl MemoryStore for UnavailableStore {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn record_turn(&self, _user_message: &str) -> Result<TurnId, StorageError> {
        Err(unavailable())
    }

    async fn complete_turn(&self, _turn_id: TurnId, _response: &str) -> Result<(), StorageError> {
        Err(unavailable())
    }

    async fn recent_turns(&self, _limit: usize) -> Result<Vec<Message>, StorageError> {
        Err(unavailable())
    }

    async fn search_turns(&self, _topic: &str, _limit: usize) -> Result<Vec<TurnMatch>, StorageError> {
        Err(unavailable())
    }

    async fn save_note(&self, _content: &str, _keywords: Option<&str>) -> Result<NoteId, StorageError> {
        Err(unavailable())
    }

    async fn search_notes(&self, _query: &str, _limit: usize) -> Result<Vec<MemoryNote>, StorageError> {
        Err(unavailable())
    }

    async fn delete_note(&self, _id: NoteId) -> Result<bool, StorageError> {
        Err(unavailable())
    }

    async fn note_count(&self) -> Result<usize, StorageError> {
        Err(unavailable())
    }

    async fn all_turns(&self) -> Result<Vec<ConversationTurn>, StorageError> {
        Err(unavailable())
    }
}
