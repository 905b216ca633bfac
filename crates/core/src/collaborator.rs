//! Collaborator trait: external helpers the tools delegate to.
//!
//! The OS task executor, image generator, content writer and music player
//! are all opaque string-in / string-out operations.

use async_trait::async_trait;
use crate::error::ToolError;

#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Short name used in logs (e.g., "task_executor").
    fn name(&self) -> &str;

    /// Run the operation on `input` and return its textual result.
    async fn run(&self, input: &str) -> std::result::Result<String, ToolError>;
}
