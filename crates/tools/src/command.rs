//! Process-backed collaborators.
//!
//! Each external helper (task executor, image generator, content writer,
//! music player) is a configured program whose arguments may contain the
//! `{input}` placeholder. Stdout is the helper's answer.

use async_trait::async_trait;
use falcon_config::{CollaboratorsConfig, CommandConfig};
use falcon_core::collaborator::Collaborator;
use falcon_core::error::ToolError;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// A collaborator that runs an external program.
pub struct CommandCollaborator {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCollaborator {
    pub fn new(name: impl Into<String>, config: &CommandConfig) -> Self {
        Self {
            name: name.into(),
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Substitute `input` into the argument template. Without a
    /// placeholder the input is appended as the final argument.
    fn render_args(&self, input: &str) -> Vec<String> {
        if self.args.iter().any(|a| a.contains("{input}")) {
            self.args.iter().map(|a| a.replace("{input}", input)).collect()
        } else {
            let mut args = self.args.clone();
            args.push(input.to_string());
            args
        }
    }
}

#[async_trait]
impl Collaborator for CommandCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let args = self.render_args(input);
        debug!(collaborator = %self.name, program = %self.program, "Running collaborator");

        let child = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: self.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("failed to start '{}': {e}", self.program),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);
        warn!(collaborator = %self.name, exit_code = code, "Collaborator failed");
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: if stderr.is_empty() {
                format!("exit code {code}")
            } else {
                format!("exit code {code}: {stderr}")
            },
        })
    }
}

/// The external helpers available to the tool router. `None` means the
/// helper is disabled and its tool reports so to the model.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub task_executor: Option<Arc<dyn Collaborator>>,
    pub image_generator: Option<Arc<dyn Collaborator>>,
    pub content_generator: Option<Arc<dyn Collaborator>>,
    pub music_player: Option<Arc<dyn Collaborator>>,
}

impl Collaborators {
    /// No helpers at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CollaboratorsConfig) -> Self {
        fn build(name: &str, config: &Option<CommandConfig>) -> Option<Arc<dyn Collaborator>> {
            config
                .as_ref()
                .map(|c| Arc::new(CommandCollaborator::new(name, c)) as Arc<dyn Collaborator>)
        }

        Self {
            task_executor: build("task_executor", &config.task_executor),
            image_generator: build("image_generator", &config.image_generator),
            content_generator: build("content_generator", &config.content_generator),
            music_player: build("music_player", &config.music_player),
        }
    }

    /// Names of configured helpers, for status output.
    pub fn enabled(&self) -> Vec<&str> {
        [
            &self.task_executor,
            &self.image_generator,
            &self.content_generator,
            &self.music_player,
        ]
        .into_iter()
        .flatten()
        .map(|c| c.name())
        .collect()
    }
}
