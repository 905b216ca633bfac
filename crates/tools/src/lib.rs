//! Tool catalogue and dispatch for Falcon.
//!
//! The model may call eight tools: four backed by the memory store (save,
//! recall, forget, summarize a topic) and four delegated to external
//! collaborators (system tasks, images, content files, music).

pub mod catalogue;
pub mod command;
pub mod invocation;
pub mod router;

pub use catalogue::ToolKind;
pub use command::{Collaborators, CommandCollaborator};
pub use invocation::ToolInvocation;
pub use router::ToolRouter;
