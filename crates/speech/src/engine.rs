//! Speech engines: turn text into audio and play it.
//!
//! Playback is driven by polling: the manager asks the handle whether it is
//! still busy and halts it when the session is cancelled.

use async_trait::async_trait;
use falcon_config::SpeechConfig;
use falcon_core::error::PlaybackError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// A rendered audio file, deleted when dropped.
#[derive(Debug)]
pub struct AudioFile {
    path: PathBuf,
}

impl AudioFile {
    /// Take ownership of `path`. The file need not exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AudioFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed speech audio"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "Could not remove speech audio"),
        }
    }
}

/// Synthesized speech ready for playback.
#[derive(Debug)]
pub struct Utterance {
    pub text: String,
    /// Rendered audio, when the engine synthesizes ahead of playback
    audio: Option<AudioFile>,
}

impl Utterance {
    /// Speech the player renders itself.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio: None,
        }
    }

    pub fn with_audio(text: impl Into<String>, audio: AudioFile) -> Self {
        Self {
            text: text.into(),
            audio: Some(audio),
        }
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.audio.as_ref().map(AudioFile::path)
    }
}

/// An in-progress playback.
pub trait PlaybackHandle: Send {
    /// Whether audio is still being produced.
    fn is_busy(&mut self) -> bool;

    /// Stop output immediately. Safe to call more than once.
    fn halt(&mut self);
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<Utterance, PlaybackError>;

    async fn play(&self, utterance: Utterance) -> Result<Box<dyn PlaybackHandle>, PlaybackError>;
}

// ── Simulated ─────────────────────────────────────────────────────────────

/// Silent playback that lasts as long as reading the text aloud would.
pub struct SimulatedEngine {
    words_per_minute: u32,
    fixed: Option<Duration>,
}

impl SimulatedEngine {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            fixed: None,
        }
    }

    /// Every utterance lasts exactly `duration`.
    pub fn with_fixed_duration(duration: Duration) -> Self {
        Self {
            words_per_minute: 170,
            fixed: Some(duration),
        }
    }

    fn duration_for(&self, text: &str) -> Duration {
        if let Some(fixed) = self.fixed {
            return fixed;
        }
        let words = text.split_whitespace().count().max(1) as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }
}

struct SimulatedHandle {
    deadline: tokio::time::Instant,
    halted: bool,
}

impl PlaybackHandle for SimulatedHandle {
    fn is_busy(&mut self) -> bool {
        !self.halted && tokio::time::Instant::now() < self.deadline
    }

    fn halt(&mut self) {
        self.halted = true;
    }
}

#[async_trait]
impl SpeechEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn synthesize(&self, text: &str) -> Result<Utterance, PlaybackError> {
        Ok(Utterance::text_only(text))
    }

    async fn play(&self, utterance: Utterance) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        Ok(Box::new(SimulatedHandle {
            deadline: tokio::time::Instant::now() + self.duration_for(&utterance.text),
            halted: false,
        }))
    }
}

// ── External processes ────────────────────────────────────────────────────

/// Speaks through external programs.
///
/// With only `speak_command` set, one process both synthesizes and plays
/// (`espeak "{text}"`). With `synthesize_command` set, that program writes
/// `{output}` first and `player_command` plays the file. The file is
/// removed once playback ends, is halted, or never starts.
pub struct CommandEngine {
    speak_command: Vec<String>,
    synthesize_command: Vec<String>,
    player_command: Vec<String>,
    audio_dir: PathBuf,
}

impl CommandEngine {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            speak_command: config.speak_command.clone(),
            synthesize_command: config.synthesize_command.clone(),
            player_command: config.player_command.clone(),
            audio_dir: std::env::temp_dir(),
        }
    }

    /// Write synthesized audio under `dir` instead of the system temp dir.
    pub fn with_audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audio_dir = dir.into();
        self
    }

    fn render(template: &[String], text: &str, output: Option<&str>) -> Option<(String, Vec<String>)> {
        let (program, args) = template.split_first()?;
        let args = args
            .iter()
            .map(|a| {
                let a = a.replace("{text}", text);
                match output {
                    Some(path) => a.replace("{output}", path),
                    None => a,
                }
            })
            .collect();
        Some((program.clone(), args))
    }

    fn spawn(program: &str, args: &[String]) -> Result<Child, PlaybackError> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::EngineUnavailable(format!("cannot start '{program}': {e}")))
    }
}

struct ProcessHandle {
    child: Child,
    audio: Option<AudioFile>,
}

impl ProcessHandle {
    fn remove_audio(&mut self) {
        self.audio.take();
    }
}

impl PlaybackHandle for ProcessHandle {
    fn is_busy(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => {
                self.remove_audio();
                false
            }
            Err(e) => {
                warn!(error = %e, "Lost track of speech process");
                false
            }
        }
    }

    fn halt(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Speech process already exited");
        }
        self.remove_audio();
    }
}

#[async_trait]
impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    async fn synthesize(&self, text: &str) -> Result<Utterance, PlaybackError> {
        if self.synthesize_command.is_empty() {
            return Ok(Utterance::text_only(text));
        }

        // Guard first: a failed or abandoned synthesis leaves no file behind.
        let audio = AudioFile::new(
            self.audio_dir
                .join(format!("falcon-speech-{}.mp3", uuid::Uuid::new_v4())),
        );
        let path_str = audio.path().to_string_lossy().to_string();
        let (program, args) = Self::render(&self.synthesize_command, text, Some(path_str.as_str()))
            .ok_or_else(|| PlaybackError::EngineUnavailable("synthesize_command is empty".into()))?;

        let status = Self::spawn(&program, &args)?
            .wait()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;
        if !status.success() {
            return Err(PlaybackError::Synthesis(format!(
                "'{program}' exited with {}",
                status.code().unwrap_or(-1)
            )));
        }

        Ok(Utterance::with_audio(text, audio))
    }

    async fn play(&self, utterance: Utterance) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let rendered = match utterance.audio_path() {
            Some(path) => {
                let path = path.to_string_lossy();
                Self::render(&self.player_command, &utterance.text, Some(path.as_ref()))
            }
            None => Self::render(&self.speak_command, &utterance.text, None),
        };
        let (program, args) =
            rendered.ok_or_else(|| PlaybackError::Output("no playback command configured".into()))?;

        // On failure `utterance` drops here and takes its audio with it.
        let child = Self::spawn(&program, &args).map_err(|e| PlaybackError::Output(e.to_string()))?;
        Ok(Box::new(ProcessHandle {
            child,
            audio: utterance.audio,
        }))
    }
}
