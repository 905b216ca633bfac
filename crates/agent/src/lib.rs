//! The reasoning core of Falcon.
//!
//! Every user message goes through one turn:
//!
//! 1. **Record** the message as an in-flight conversation turn
//! 2. **Prime** the context with long-term notes that mention it
//! 3. **Ask** the model, advertising the tool catalogue
//! 4. **Dispatch** any tool calls, then ask once more without tools
//! 5. **Persist** the answer on the turn and return it
//!
//! Failures at any step become an apology that is stored and returned, so
//! callers always receive text.

pub mod instructions;
pub mod loop_runner;
pub mod primer;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{ReasoningLoop, TurnPhase, TurnReport, CRITICAL_ERROR_PREFIX};
pub use primer::RetrievalPrimer;
