//! Spoken output for Falcon.
//!
//! [`SpeechPlaybackManager`] owns the single playback session and supports
//! barge-in: a new `speak` or an explicit `stop` interrupts whatever is
//! playing. Engines do the actual synthesis and audio output.

pub mod engine;
pub mod manager;
pub mod text;

pub use engine::{AudioFile, CommandEngine, PlaybackHandle, SimulatedEngine, SpeechEngine, Utterance};
pub use manager::SpeechPlaybackManager;
pub use text::clean_for_speech;

use falcon_config::SpeechConfig;
use std::sync::Arc;
use tracing::info;

/// Pick the engine selected by `speech.engine`. Disabled speech uses the
/// simulated engine so status and barge-in still behave normally.
pub fn build_engine(config: &SpeechConfig) -> Arc<dyn SpeechEngine> {
    if !config.enabled || config.engine == "simulated" {
        info!("Using simulated speech output");
        return Arc::new(SimulatedEngine::new(config.words_per_minute));
    }
    info!(command = ?config.speak_command.first(), "Using command speech output");
    Arc::new(CommandEngine::from_config(config))
}
