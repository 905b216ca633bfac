//! Long-term memory priming.
//!
//! Before the model sees a user message, notes that mention it are fetched
//! and rendered into a digest that is injected as a system message.
//!
//! The whole message is tried as one substring first. When that finds
//! nothing, each significant word of the message is searched on its own.

use falcon_core::error::StorageError;
use falcon_core::memory::{MemoryNote, MemoryStore};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PRIMER_HEADER: &str = "Here are some potentially relevant memories I found:";
pub const NO_RELEVANT_MEMORIES: &str = "No relevant long-term memories found.";
pub const MEMORY_UNAVAILABLE: &str = "Could not access long-term memory.";

/// Fetches notes relevant to the incoming message.
pub struct RetrievalPrimer {
    memory: Arc<dyn MemoryStore>,
    limit: usize,
}

impl RetrievalPrimer {
    pub fn new(memory: Arc<dyn MemoryStore>, limit: usize) -> Self {
        Self { memory, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Build the memory digest for `user_input`. Never fails; storage
    /// errors produce [`MEMORY_UNAVAILABLE`].
    pub async fn prime(&self, user_input: &str) -> String {
        match self.relevant_notes(user_input).await {
            Ok(notes) if notes.is_empty() => NO_RELEVANT_MEMORIES.to_string(),
            Ok(notes) => {
                debug!(count = notes.len(), "Primed long-term memories");
                render_digest(&notes)
            }
            Err(e) => {
                warn!(error = %e, "Long-term memory lookup failed during priming");
                MEMORY_UNAVAILABLE.to_string()
            }
        }
    }

    async fn relevant_notes(&self, user_input: &str) -> Result<Vec<MemoryNote>, StorageError> {
        let notes = self.memory.search_notes(user_input, self.limit).await?;
        if !notes.is_empty() {
            return Ok(notes);
        }

        let mut merged: Vec<MemoryNote> = Vec::new();
        for term in significant_terms(user_input) {
            for note in self.memory.search_notes(&term, self.limit).await? {
                if !merged.iter().any(|n| n.id == note.id) {
                    merged.push(note);
                }
            }
        }
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        merged.truncate(self.limit);
        Ok(merged)
    }
}

const STOP_WORDS: &[&str] = &[
    "about", "again", "could", "does", "from", "have", "know", "like", "please", "remember",
    "should", "tell", "that", "their", "there", "they", "this", "what", "when", "where", "which",
    "with", "would", "your",
];

/// Lowercased words of four or more characters that are not stop words,
/// in order of first appearance.
fn significant_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() >= 4 && !STOP_WORDS.contains(&word.as_str()) && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

fn render_digest(notes: &[MemoryNote]) -> String {
    let mut digest = String::from(PRIMER_HEADER);
    for note in notes {
        digest.push('\n');
        digest.push_str(&format!(
            "(id={}) {}: {}",
            note.id,
            note.timestamp.format("%Y-%m-%d %H:%M:%S"),
            note.content
        ));
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::UnavailableStore;
    use falcon_memory::InMemoryStore;

    #[tokio::test]
    async fn empty_store_gives_sentinel() {
        let primer = RetrievalPrimer::new(Arc::new(InMemoryStore::new()), 5);
        assert_eq!(primer.prime("anything").await, NO_RELEVANT_MEMORIES);
    }

    #[tokio::test]
    async fn matching_notes_are_listed_under_header() {
        let memory = Arc::new(InMemoryStore::new());
        let id = memory.save_note("favorite color is blue", Some("color")).await.unwrap();
        memory.save_note("lives in Lisbon", None).await.unwrap();

        let primer = RetrievalPrimer::new(memory, 5);
        let digest = primer.prime("color").await;

        let mut lines = digest.lines();
        assert_eq!(lines.next(), Some(PRIMER_HEADER));
        let line = lines.next().unwrap();
        assert!(line.starts_with(&format!("(id={id}) ")));
        assert!(line.ends_with(": favorite color is blue"));
        assert!(lines.next().is_none());
    }

    #[tokio::test]
    async fn limit_caps_digest_lines() {
        let memory = Arc::new(InMemoryStore::new());
        for i in 0..8 {
            memory.save_note(&format!("project note {i}"), None).await.unwrap();
        }
        let primer = RetrievalPrimer::new(memory, 3);
        assert_eq!(primer.prime("project").await.lines().count(), 4);
    }

    #[tokio::test]
    async fn question_falls_back_to_significant_words() {
        let memory = Arc::new(InMemoryStore::new());
        memory.save_note("User's favorite color is blue", Some("preferences")).await.unwrap();
        memory.save_note("Dentist appointment on Friday", None).await.unwrap();

        let primer = RetrievalPrimer::new(memory, 5);
        let digest = primer.prime("what's my favorite color?").await;
        assert!(digest.starts_with(PRIMER_HEADER));
        assert!(digest.contains("favorite color is blue"));
        assert!(!digest.contains("Dentist"));
    }

    #[test]
    fn significant_terms_skip_short_and_stop_words() {
        assert_eq!(
            significant_terms("What's my favorite color? Tell me the COLOR"),
            ["favorite", "color"]
        );
        assert!(significant_terms("is it on?").is_empty());
    }

    #[tokio::test]
    async fn storage_failure_gives_unavailable_sentinel() {
        let primer = RetrievalPrimer::new(Arc::new(UnavailableStore), 5);
        assert_eq!(primer.prime("color").await, MEMORY_UNAVAILABLE);
    }
}
