//! Script generator client.
//!
//! The [`ScriptGenerator`] trait decouples the engine from the generator backend.
//! [`CommandGenerator`] pipes a rendered prompt into an external command (for example
//! `codex exec -`) and reads the script from stdout. Tests use scripted generators that
//! return predetermined scripts without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::Plan;
use crate::io::plan_file::parse_plan;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptEngine;

/// A fenced block wrapping the whole response, e.g. "```js\n...\n```".
static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```$").expect("fence regex is valid")
});

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("failed to start generator: {0}")]
    Spawn(String),
    #[error("generator exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("generator timed out after {0:?}")]
    TimedOut(Duration),
    #[error("generator returned unusable output: {0}")]
    Unusable(String),
    #[error("failed to render prompt: {0}")]
    Prompt(String),
    #[error("generator returned an invalid plan: {0}")]
    InvalidPlan(String),
}

/// Produces transform scripts for the engine.
pub trait ScriptGenerator {
    /// Script that rewrites `source` to achieve `goal`.
    fn generate_transform(&self, source: &str, goal: &str) -> Result<String, GeneratorError>;

    /// Replacement for `failed_script`, given the verification failure it caused.
    fn generate_corrected_transform(
        &self,
        source: &str,
        failed_script: &str,
        failure_output: &str,
    ) -> Result<String, GeneratorError>;
}

/// Produces plans from a goal and the target's source.
pub trait PlanGenerator {
    fn generate_plan(&self, source: &str, goal: &str) -> Result<Plan, GeneratorError>;
}

/// Generator backed by an external command reading the prompt on stdin.
pub struct CommandGenerator {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl CommandGenerator {
    pub fn new(
        command: Vec<String>,
        workdir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
        prompts: PromptEngine,
    ) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            timeout,
            output_limit_bytes,
            prompts,
        }
    }

    #[instrument(skip_all, fields(prompt_bytes = prompt.len(), timeout_secs = self.timeout.as_secs()))]
    fn request(&self, prompt: &str) -> Result<String, GeneratorError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| GeneratorError::Spawn("generator command is empty".to_string()))?;
        info!(program = %program, workdir = %self.workdir.display(), "requesting generator");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| GeneratorError::Spawn(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(GeneratorError::TimedOut(self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(GeneratorError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout_truncated > 0 {
            return Err(GeneratorError::Unusable(format!(
                "response exceeded {} bytes",
                self.output_limit_bytes
            )));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|_| GeneratorError::Unusable("response is not valid UTF-8".to_string()))?;
        debug!(response_bytes = text.len(), "generator responded");
        Ok(text)
    }
}

impl ScriptGenerator for CommandGenerator {
    fn generate_transform(&self, source: &str, goal: &str) -> Result<String, GeneratorError> {
        let prompt = self
            .prompts
            .render_transform(source, goal)
            .map_err(|err| GeneratorError::Prompt(err.to_string()))?;
        clean_script(&self.request(&prompt)?)
    }

    fn generate_corrected_transform(
        &self,
        source: &str,
        failed_script: &str,
        failure_output: &str,
    ) -> Result<String, GeneratorError> {
        let prompt = self
            .prompts
            .render_corrected_transform(source, failed_script, failure_output)
            .map_err(|err| GeneratorError::Prompt(err.to_string()))?;
        clean_script(&self.request(&prompt)?)
    }
}

impl PlanGenerator for CommandGenerator {
    fn generate_plan(&self, source: &str, goal: &str) -> Result<Plan, GeneratorError> {
        let prompt = self
            .prompts
            .render_plan(source, goal)
            .map_err(|err| GeneratorError::Prompt(err.to_string()))?;
        let response = clean_script(&self.request(&prompt)?)?;
        parse_plan(&response).map_err(|err| GeneratorError::InvalidPlan(format!("{err:#}")))
    }
}

/// Trim the response and unwrap a single surrounding Markdown fence.
pub fn clean_script(raw: &str) -> Result<String, GeneratorError> {
    let trimmed = raw.trim();
    let body = match FENCED.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    };
    if body.is_empty() {
        return Err(GeneratorError::Unusable("empty response".to_string()));
    }
    Ok(body.to_string())
}
