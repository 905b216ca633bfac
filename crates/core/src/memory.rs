//! Memory trait: the dual conversation log and long-term notes store.
//!
//! Two kinds of record live behind one [`MemoryStore`]:
//! - conversation turns, written on every user message and completed once
//!   the assistant has answered
//! - notes, curated facts saved and forgotten only on explicit request
//!
//! All searches are case-insensitive substring matches, newest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::StorageError;
use crate::message::Message;

/// Identifier of a conversation turn, assigned on insert.
pub type TurnId = i64;

/// Identifier of a long-term note, assigned on insert.
pub type NoteId = i64;

/// One user message plus its (eventually filled) assistant response.
///
/// A turn whose `assistant_response` is `None` is still in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub user_message: String,
    pub assistant_response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn is_complete(&self) -> bool {
        self.assistant_response.is_some()
    }
}

/// A conversation search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMatch {
    pub user_message: String,
    pub assistant_response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<ConversationTurn> for TurnMatch {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            user_message: turn.user_message,
            assistant_response: turn.assistant_response,
            timestamp: turn.timestamp,
        }
    }
}

/// A curated long-term fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNote {
    pub id: NoteId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Flatten completed turns (oldest first) into alternating user/assistant
/// messages. In-flight turns are skipped.
pub fn turns_to_messages(turns: &[ConversationTurn]) -> Vec<Message> {
    turns
        .iter()
        .filter_map(|t| {
            t.assistant_response
                .as_ref()
                .map(|resp| [Message::user(&t.user_message), Message::assistant(resp)])
        })
        .flatten()
        .collect()
}

/// The core MemoryStore trait.
///
/// Implementations: SQLite (durable) and in-memory (tests, ephemeral runs).
/// Every write is durable before the call returns.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Insert a new in-flight turn and return its id.
    async fn record_turn(&self, user_message: &str) -> std::result::Result<TurnId, StorageError>;

    /// Set the response of an existing turn. Unknown ids are ignored.
    async fn complete_turn(&self, turn_id: TurnId, response: &str) -> std::result::Result<(), StorageError>;

    /// The most recent `limit` completed turns, oldest first, flattened into
    /// user/assistant message pairs.
    async fn recent_turns(&self, limit: usize) -> std::result::Result<Vec<Message>, StorageError>;

    /// Turns whose user message or response contains `topic`, newest first.
    async fn search_turns(&self, topic: &str, limit: usize) -> std::result::Result<Vec<TurnMatch>, StorageError>;

    /// Store a new note and return its id.
    async fn save_note(&self, content: &str, keywords: Option<&str>) -> std::result::Result<NoteId, StorageError>;

    /// Notes whose content or keywords contain `query`, newest first.
    async fn search_notes(&self, query: &str, limit: usize) -> std::result::Result<Vec<MemoryNote>, StorageError>;

    /// Delete a note. Returns true iff a note was removed.
    async fn delete_note(&self, id: NoteId) -> std::result::Result<bool, StorageError>;

    /// Total number of stored notes.
    async fn note_count(&self) -> std::result::Result<usize, StorageError>;

    /// Every turn, oldest first, including in-flight ones.
    async fn all_turns(&self) -> std::result::Result<Vec<ConversationTurn>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(id: TurnId, user: &str, response: Option<&str>) -> ConversationTurn {
        ConversationTurn {
            id,
            user_message: user.into(),
            assistant_response: response.map(Into::into),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn flattening_skips_in_flight_turns() {
        let turns = vec![
            turn(1, "hello", Some("hi")),
            turn(2, "still thinking", None),
            turn(3, "bye", Some("see you")),
        ];
        let messages = turns_to_messages(&turns);
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hello", "hi", "bye", "see you"]);
        assert_eq!(messages[0].role, crate::Role::User);
        assert_eq!(messages[1].role, crate::Role::Assistant);
    }

    #[test]
    fn note_serialization_omits_missing_keywords() {
        let note = MemoryNote {
            id: 4,
            content: "The user's favorite color is blue".into(),
            keywords: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("favorite color"));
        assert!(!json.contains("keywords"));
    }
}
