//! Speech playback with barge-in.
//!
//! At most one playback session exists at a time. Starting a new one
//! cancels the current session and waits (bounded) for its task before the
//! new audio begins. Session flags live behind one lock shared with the
//! playback task.

use crate::engine::SpeechEngine;
use crate::text::clean_for_speech;
use chrono::Utc;
use falcon_config::SpeechConfig;
use falcon_core::error::PlaybackError;
use falcon_core::event::{DomainEvent, EventBus, SpeechStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug)]
struct SessionState {
    id: Uuid,
    text: String,
    cancelled: bool,
    active: bool,
}

type SharedState = Arc<Mutex<Option<SessionState>>>;

fn lock(state: &SharedState) -> MutexGuard<'_, Option<SessionState>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A session is over for its task once it was cancelled or replaced.
fn should_stop(state: &SharedState, id: Uuid) -> bool {
    lock(state).as_ref().is_none_or(|s| s.id != id || s.cancelled)
}

enum Ending {
    Finished,
    Cancelled,
}

/// Owns the single active playback session.
pub struct SpeechPlaybackManager {
    engine: Arc<dyn SpeechEngine>,
    state: SharedState,
    /// Start gate: serialises `speak` and holds the running task
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    events: Arc<EventBus>,
    poll_interval: Duration,
    join_timeout: Duration,
}

impl SpeechPlaybackManager {
    pub fn new(engine: Arc<dyn SpeechEngine>, events: Arc<EventBus>) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(None)),
            task: tokio::sync::Mutex::new(None),
            events,
            poll_interval: Duration::from_millis(20),
            join_timeout: Duration::from_millis(2000),
        }
    }

    pub fn from_config(config: &SpeechConfig, engine: Arc<dyn SpeechEngine>, events: Arc<EventBus>) -> Self {
        Self::new(engine, events).with_timing(
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.join_timeout_ms),
        )
    }

    /// Cancellation polling interval and the bound on joining a prior task.
    pub fn with_timing(mut self, poll_interval: Duration, join_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.join_timeout = join_timeout;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Speak `text`, interrupting anything currently playing. Returns false
    /// when nothing speakable is left after cleaning.
    pub async fn speak(&self, text: &str) -> bool {
        let cleaned = clean_for_speech(text);
        if cleaned.is_empty() {
            debug!("Nothing speakable in text, skipping playback");
            return false;
        }

        let mut gate = self.task.lock().await;
        self.stop();
        self.join_previous(&mut gate).await;

        let id = Uuid::new_v4();
        *lock(&self.state) = Some(SessionState {
            id,
            text: cleaned.clone(),
            cancelled: false,
            active: true,
        });
        self.publish(SpeechStatus::Speaking, id);
        info!(session = %id, chars = cleaned.len(), "Speech session started");

        let engine = self.engine.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let poll = self.poll_interval;
        *gate = Some(tokio::spawn(async move {
            let ending = play_session(engine.as_ref(), &state, id, &cleaned, poll).await;
            match ending {
                Ok(Ending::Finished) => debug!(session = %id, "Speech finished"),
                Ok(Ending::Cancelled) => debug!(session = %id, "Speech cancelled"),
                Err(e) => warn!(session = %id, error = %e, "Speech playback failed"),
            }

            // A replaced session stays quiet: its successor already announced itself.
            let still_current = match lock(&state).as_mut().filter(|s| s.id == id) {
                Some(session) => {
                    session.active = false;
                    true
                }
                None => false,
            };
            if still_current {
                events.publish(DomainEvent::SpeechStatusChanged {
                    status: SpeechStatus::Idle,
                    session_id: id.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }));
        true
    }

    /// Cancel the active session, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(session) = lock(&self.state).as_mut() {
            if session.active && !session.cancelled {
                debug!(session = %session.id, "Cancelling speech session");
                session.cancelled = true;
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        lock(&self.state)
            .as_ref()
            .is_some_and(|s| s.active && !s.cancelled)
    }

    /// Cleaned text of the session being spoken.
    pub fn current_text(&self) -> Option<String> {
        lock(&self.state)
            .as_ref()
            .filter(|s| s.active && !s.cancelled)
            .map(|s| s.text.clone())
    }

    /// Stop and wait for the playback task. Used on process exit.
    pub async fn shutdown(&self) {
        let mut gate = self.task.lock().await;
        self.stop();
        self.join_previous(&mut gate).await;
    }

    async fn join_previous(&self, gate: &mut Option<JoinHandle<()>>) {
        let Some(handle) = gate.take() else {
            return;
        };
        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Speech task ended abnormally"),
            Err(_) => warn!(
                timeout_ms = self.join_timeout.as_millis() as u64,
                "Previous speech session did not stop in time, starting anyway"
            ),
        }
    }

    fn publish(&self, status: SpeechStatus, id: Uuid) {
        self.events.publish(DomainEvent::SpeechStatusChanged {
            status,
            session_id: id.to_string(),
            timestamp: Utc::now(),
        });
    }
}

async fn play_session(
    engine: &dyn SpeechEngine,
    state: &SharedState,
    id: Uuid,
    text: &str,
    poll: Duration,
) -> Result<Ending, PlaybackError> {
    let utterance = engine.synthesize(text).await?;
    if should_stop(state, id) {
        return Ok(Ending::Cancelled);
    }

    let mut handle = engine.play(utterance).await?;
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if should_stop(state, id) {
            handle.halt();
            return Ok(Ending::Cancelled);
        }
        if !handle.is_busy() {
            return Ok(Ending::Finished);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PlaybackHandle, SimulatedEngine, Utterance};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(engine: Arc<dyn SpeechEngine>) -> SpeechPlaybackManager {
        SpeechPlaybackManager::new(engine, Arc::new(EventBus::default()))
            .with_timing(Duration::from_millis(5), Duration::from_millis(500))
    }

    fn long_engine() -> Arc<dyn SpeechEngine> {
        Arc::new(SimulatedEngine::with_fixed_duration(Duration::from_secs(30)))
    }

    /// Counts handles that are playing at the same time.
    #[derive(Default)]
    struct CountingEngine {
        playing: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct CountingHandle {
        playing: Arc<AtomicUsize>,
        halted: bool,
    }

    impl PlaybackHandle for CountingHandle {
        fn is_busy(&mut self) -> bool {
            !self.halted
        }

        fn halt(&mut self) {
            if !self.halted {
                self.halted = true;
                self.playing.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl SpeechEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        async fn synthesize(&self, text: &str) -> Result<Utterance, PlaybackError> {
            Ok(Utterance::text_only(text))
        }

        async fn play(&self, _utterance: Utterance) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
            let now = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            Ok(Box::new(CountingHandle {
                playing: self.playing.clone(),
                halted: false,
            }))
        }
    }

    struct BrokenEngine;

    #[async_trait]
    impl SpeechEngine for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }

        async fn synthesize(&self, _text: &str) -> Result<Utterance, PlaybackError> {
            Err(PlaybackError::Synthesis("voice not installed".into()))
        }

        async fn play(&self, _utterance: Utterance) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
            Err(PlaybackError::Output("unreachable".into()))
        }
    }

    /// Synthesis that ignores cancellation for a while.
    struct SlowSynthesisEngine {
        delay: Duration,
        inner: SimulatedEngine,
    }

    #[async_trait]
    impl SpeechEngine for SlowSynthesisEngine {
        fn name(&self) -> &str {
            "slow"
        }

        async fn synthesize(&self, text: &str) -> Result<Utterance, PlaybackError> {
            tokio::time::sleep(self.delay).await;
            self.inner.synthesize(text).await
        }

        async fn play(&self, utterance: Utterance) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
            self.inner.play(utterance).await
        }
    }

    fn drain_statuses(rx: &mut tokio::sync::broadcast::Receiver<Arc<DomainEvent>>) -> Vec<(SpeechStatus, String)> {
        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::SpeechStatusChanged { status, session_id, .. } = event.as_ref() {
                statuses.push((*status, session_id.clone()));
            }
        }
        statuses
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn speak_starts_a_session() {
        let speech = manager(long_engine());
        assert!(!speech.is_speaking());

        assert!(speech.speak("Hello there").await);
        assert!(speech.is_speaking());
        assert_eq!(speech.current_text().as_deref(), Some("Hello there"));
        speech.shutdown().await;
    }

    #[tokio::test]
    async fn second_speak_replaces_first() {
        let engine = Arc::new(CountingEngine::default());
        let speech = manager(engine.clone());

        speech.speak("first answer").await;
        settle().await;
        speech.speak("second answer").await;
        settle().await;

        assert!(speech.is_speaking());
        assert_eq!(speech.current_text().as_deref(), Some("second answer"));
        assert_eq!(engine.playing.load(Ordering::SeqCst), 1);
        assert_eq!(engine.peak.load(Ordering::SeqCst), 1);

        speech.shutdown().await;
        assert_eq!(engine.playing.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn back_to_back_speak_leaves_one_session() {
        let engine = Arc::new(CountingEngine::default());
        let speech = manager(engine.clone());

        speech.speak("A").await;
        speech.speak("B").await;
        settle().await;

        assert_eq!(speech.current_text().as_deref(), Some("B"));
        assert!(engine.peak.load(Ordering::SeqCst) <= 1);
        speech.shutdown().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let speech = manager(long_engine());
        speech.stop();

        speech.speak("Stop me").await;
        speech.stop();
        speech.stop();
        assert!(!speech.is_speaking());
        assert!(speech.current_text().is_none());
        speech.shutdown().await;
    }

    #[tokio::test]
    async fn natural_completion_goes_idle_with_events() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let engine = Arc::new(SimulatedEngine::with_fixed_duration(Duration::from_millis(20)));
        let speech = SpeechPlaybackManager::new(engine, bus)
            .with_timing(Duration::from_millis(5), Duration::from_millis(500));

        speech.speak("short").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!speech.is_speaking());

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::SpeechStatusChanged { status, .. } = event.as_ref() {
                statuses.push(*status);
            }
        }
        assert_eq!(statuses, [SpeechStatus::Speaking, SpeechStatus::Idle]);
    }

    #[tokio::test]
    async fn unspeakable_text_is_skipped() {
        let speech = manager(long_engine());
        assert!(!speech.speak("🎵 ✅").await);
        assert!(!speech.speak("   ").await);
        assert!(!speech.is_speaking());
    }

    #[tokio::test]
    async fn engine_failure_ends_session() {
        let speech = manager(Arc::new(BrokenEngine));
        assert!(speech.speak("hello").await);
        settle().await;
        assert!(!speech.is_speaking());
    }

    #[tokio::test]
    async fn overdue_session_does_not_announce_idle_over_successor() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let engine = Arc::new(SlowSynthesisEngine {
            delay: Duration::from_millis(200),
            inner: SimulatedEngine::with_fixed_duration(Duration::from_secs(30)),
        });
        let speech = SpeechPlaybackManager::new(engine, bus)
            .with_timing(Duration::from_millis(5), Duration::from_millis(10));

        speech.speak("first answer").await;
        speech.speak("second answer").await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        let statuses = drain_statuses(&mut rx);
        assert_eq!(statuses.len(), 2, "{statuses:?}");
        assert!(statuses.iter().all(|(status, _)| *status == SpeechStatus::Speaking));
        assert_ne!(statuses[0].1, statuses[1].1);
        assert!(speech.is_speaking());
        assert_eq!(speech.current_text().as_deref(), Some("second answer"));
        speech.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_during_synthesis_leaves_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpeechConfig {
            synthesize_command: vec!["sh".into(), "-c".into(), "sleep 0.3; echo audio > {output}".into()],
            player_command: vec!["sleep".into(), "30".into()],
            ..SpeechConfig::default()
        };
        let engine = crate::engine::CommandEngine::from_config(&config).with_audio_dir(dir.path());
        let speech = manager(Arc::new(engine));

        assert!(speech.speak("hello there").await);
        settle().await;
        speech.stop();
        speech.shutdown().await;

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
