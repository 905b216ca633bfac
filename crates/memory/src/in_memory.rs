//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use falcon_core::error::StorageError;
use falcon_core::memory::{
    turns_to_messages, ConversationTurn, MemoryNote, MemoryStore, NoteId, TurnId, TurnMatch,
};
use falcon_core::message::Message;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    turns: Vec<ConversationTurn>,
    notes: Vec<MemoryNote>,
    next_turn_id: TurnId,
    next_note_id: NoteId,
}

/// A [`MemoryStore`] that keeps turns and notes in vectors.
/// Nothing survives the process.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_turn_id: 1,
                next_note_id: 1,
                ..Default::default()
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn record_turn(&self, user_message: &str) -> Result<TurnId, StorageError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_turn_id;
        tables.next_turn_id += 1;
        tables.turns.push(ConversationTurn {
            id,
            user_message: user_message.to_string(),
            assistant_response: None,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn complete_turn(&self, turn_id: TurnId, response: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(turn) = tables.turns.iter_mut().find(|t| t.id == turn_id) {
            turn.assistant_response = Some(response.to_string());
        }
        Ok(())
    }

    async fn recent_turns(&self, limit: usize) -> Result<Vec<Message>, StorageError> {
        let tables = self.tables.read().await;
        let mut recent: Vec<ConversationTurn> = tables
            .turns
            .iter()
            .rev()
            .filter(|t| t.is_complete())
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(turns_to_messages(&recent))
    }

    async fn search_turns(&self, topic: &str, limit: usize) -> Result<Vec<TurnMatch>, StorageError> {
        let tables = self.tables.read().await;
        let topic_lower = topic.to_lowercase();
        Ok(tables
            .turns
            .iter()
            .rev()
            .filter(|t| {
                contains_ci(&t.user_message, &topic_lower)
                    || t
                        .assistant_response
                        .as_deref()
                        .is_some_and(|r| contains_ci(r, &topic_lower))
            })
            .take(limit)
            .cloned()
            .map(TurnMatch::from)
            .collect())
    }

    async fn save_note(&self, content: &str, keywords: Option<&str>) -> Result<NoteId, StorageError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_note_id;
        tables.next_note_id += 1;
        tables.notes.push(MemoryNote {
            id,
            content: content.to_string(),
            keywords: keywords.map(String::from),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<MemoryNote>, StorageError> {
        let tables = self.tables.read().await;
        let query_lower = query.to_lowercase();
        Ok(tables
            .notes
            .iter()
            .rev()
            .filter(|n| {
                contains_ci(&n.content, &query_lower)
                    || n
                        .keywords
                        .as_deref()
                        .is_some_and(|k| contains_ci(k, &query_lower))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_note(&self, id: NoteId) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        let before = tables.notes.len();
        tables.notes.retain(|n| n.id != id);
        Ok(tables.notes.len() < before)
    }

    async fn note_count(&self) -> Result<usize, StorageError> {
        Ok(self.tables.read().await.notes.len())
    }

    async fn all_turns(&self) -> Result<Vec<ConversationTurn>, StorageError> {
        Ok(self.tables.read().await.turns.clone())
    }
}
