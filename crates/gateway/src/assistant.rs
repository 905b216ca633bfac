//! The assistant facade used by the HTTP routes and the interactive CLI.
//!
//! Every method returns a well-formed value: failures are logged and turned
//! into a safe default or a user-facing message.

use crate::export::ExportFormat;
use chrono::{Local, Utc};
use falcon_agent::ReasoningLoop;
use falcon_core::error::StorageError;
use falcon_core::event::{DomainEvent, EventBus};
use falcon_core::memory::{MemoryStore, TurnMatch};
use falcon_core::message::Message;
use falcon_speech::SpeechPlaybackManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DIDNT_CATCH_THAT: &str = "I didn't quite catch that. Could you please repeat?";
pub const NOT_INITIALIZED: &str = "Assistant is not initialized. Please restart the application.";
pub const NO_RESPONSE: &str = "I'm not sure how to respond to that.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReply {
    pub response: String,
    pub should_speak: bool,
}

impl QueryReply {
    fn spoken(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            should_speak: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub assistant_ready: bool,
    pub speaking: bool,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub server_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub format: ExportFormat,
    pub data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unsupported export format '{0}', expected csv or json")]
    UnknownFormat(String),

    #[error("conversation history is not available")]
    Unavailable,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot encode history: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Limits for the history views.
#[derive(Debug, Clone, Copy)]
pub struct HistoryLimits {
    /// Completed turns returned by `history`
    pub page: usize,
    /// Matches returned by `search_conversations`
    pub search: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self { page: 50, search: 50 }
    }
}

pub struct Assistant {
    /// Queries run one at a time
    agent: Option<Mutex<ReasoningLoop>>,
    memory: Option<Arc<dyn MemoryStore>>,
    speech: Arc<SpeechPlaybackManager>,
    events: Arc<EventBus>,
    limits: HistoryLimits,
}

impl Assistant {
    /// `agent` is `None` when the reasoning API could not be set up; the
    /// assistant then reports itself as not ready.
    pub fn new(
        agent: Option<ReasoningLoop>,
        memory: Option<Arc<dyn MemoryStore>>,
        speech: Arc<SpeechPlaybackManager>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            agent: agent.map(Mutex::new),
            memory,
            speech,
            events,
            limits: HistoryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: HistoryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.agent.is_some()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn speech(&self) -> &Arc<SpeechPlaybackManager> {
        &self.speech
    }

    /// Answer a user query. Any speech in progress is interrupted first.
    pub async fn process_user_query(&self, text: &str) -> QueryReply {
        let text = text.trim();
        if text.is_empty() {
            return QueryReply::spoken(DIDNT_CATCH_THAT);
        }

        let Some(agent) = &self.agent else {
            warn!("Query received while the assistant is not initialized");
            return QueryReply::spoken(NOT_INITIALIZED);
        };

        if self.speech.is_speaking() {
            debug!("New query, interrupting speech");
            self.speech.stop();
        }

        let report = agent.lock().await.process_detailed(text).await;
        if report.failed {
            self.events.publish(DomainEvent::ErrorOccurred {
                context: "reasoning".into(),
                error_message: report.answer.clone(),
                timestamp: Utc::now(),
            });
        }

        if report.answer.trim().is_empty() {
            QueryReply {
                response: NO_RESPONSE.into(),
                should_speak: false,
            }
        } else {
            QueryReply::spoken(report.answer)
        }
    }

    /// Start speaking `text`. False for blank text.
    pub async fn request_speech(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            debug!("Speech request ignored, no text");
            return false;
        }
        self.speech.speak(text).await
    }

    pub fn stop_speech(&self) -> bool {
        self.speech.stop();
        true
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            assistant_ready: self.is_ready(),
            speaking: self.speech.is_speaking(),
            server_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Recent completed turns as role/content pairs, oldest first.
    pub async fn history(&self) -> Vec<Message> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        memory.recent_turns(self.limits.page).await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load conversation history");
            Vec::new()
        })
    }

    pub async fn search_conversations(&self, keyword: &str) -> Vec<TurnMatch> {
        let keyword = keyword.trim();
        let Some(memory) = self.memory.as_ref().filter(|_| !keyword.is_empty()) else {
            return Vec::new();
        };
        memory.search_turns(keyword, self.limits.search).await.unwrap_or_else(|e| {
            warn!(error = %e, "Conversation search failed");
            Vec::new()
        })
    }

    /// Every stored turn rendered as CSV or JSON.
    pub async fn export_history(&self, format: &str) -> Result<ExportData, ExportError> {
        let format =
            ExportFormat::parse(format).ok_or_else(|| ExportError::UnknownFormat(format.to_string()))?;
        let memory = self.memory.as_ref().ok_or(ExportError::Unavailable)?;

        let turns = memory.all_turns().await?;
        info!(turns = turns.len(), format = format.as_str(), "Exporting conversation history");
        Ok(ExportData {
            format,
            data: format.render(&turns)?,
        })
    }

    /// Stop speech and wait for the playback task.
    pub async fn shutdown(&self) {
        self.speech.shutdown().await;
    }
}
