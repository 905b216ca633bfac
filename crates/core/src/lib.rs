//! # Falcon Core
//!
//! Domain types, traits, and error definitions for the Falcon conversational
//! assistant. This crate has no framework dependencies: it defines the model
//! every other crate implements against.
//!
//! ## Layout
//!
//! Each subsystem boundary is a trait defined here:
//! - [`Provider`] for the reasoning API
//! - [`MemoryStore`] for the dual conversation/notes memory
//! - [`Collaborator`] for the external task, image, content and music helpers
//!
//! Implementations live in their own crates and are wired together from an
//! `AppConfig` at startup.

pub mod collaborator;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use collaborator::Collaborator;
pub use error::{Error, PlaybackError, ProviderError, Result, StorageError, ToolError};
pub use event::{DomainEvent, EventBus, SpeechStatus};
pub use memory::{ConversationTurn, MemoryNote, MemoryStore, NoteId, TurnId, TurnMatch};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, Usage};
pub use tool::ToolDefinition;
