//! Plan data model shared by the engine.
//!
//! A [`Plan`] is immutable once constructed except for each step's status,
//! which only the plan executor advances (see [`Plan::advance`]).

use serde::{Deserialize, Serialize};

use crate::core::status::{InvalidTransition, check_transition};

/// Parameter token replaced with the path of the most recent transform script.
pub const TRANSFORM_SCRIPT_PLACEHOLDER: &str = "<TRANSFORM_SCRIPT>";
/// Parameter token replaced with the path of the target artifact.
pub const TARGET_FILE_PLACEHOLDER: &str = "<TARGET_FILE>";

/// Execution strategy for a step.
///
/// Plan files written by older generators use tool names (`git`, `npm`, `fs`,
/// `jscodeshift`, `test`); those are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[serde(alias = "git", alias = "npm", alias = "fs")]
    ShellCommand,
    #[serde(alias = "jscodeshift")]
    Transform,
    #[serde(alias = "test")]
    Verification,
}

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::ShellCommand => "shell_command",
            ToolKind::Transform => "transform",
            ToolKind::Verification => "verification",
        }
    }
}

/// Lifecycle of a single step: `Pending -> Running -> Success | Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }
}

/// One planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Human-readable intent; also the goal handed to the script generator for transforms.
    pub description: String,
    #[serde(rename = "tool")]
    pub tool: ToolKind,
    #[serde(default)]
    pub params: Vec<String>,
    /// Never read from plan files: every loaded step starts `Pending`.
    #[serde(default, skip_deserializing)]
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(description: impl Into<String>, tool: ToolKind, params: Vec<String>) -> Self {
        Self {
            description: description.into(),
            tool,
            params,
            status: StepStatus::Pending,
        }
    }
}

/// Ordered sequence of steps. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    /// Build a plan, resetting every status to `Pending`.
    pub fn new(mut steps: Vec<PlanStep>) -> Self {
        for step in &mut steps {
            step.status = StepStatus::Pending;
        }
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|step| step.status).collect()
    }

    /// Index of the closest `Transform` step strictly before `index`.
    pub fn last_transform_before(&self, index: usize) -> Option<usize> {
        let end = index.min(self.steps.len());
        self.steps[..end]
            .iter()
            .rposition(|step| step.tool == ToolKind::Transform)
    }

    /// Move step `index` to `next`, rejecting transitions that would regress.
    pub fn advance(&mut self, index: usize, next: StepStatus) -> Result<(), InvalidTransition> {
        let step = self
            .steps
            .get_mut(index)
            .ok_or(InvalidTransition::OutOfRange { index })?;
        check_transition(index, step.status, next)?;
        step.status = next;
        Ok(())
    }
}

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Outcome of one external invocation.
///
/// Spawn failures and non-zero exits are both represented here so callers
/// make a single `success()` check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// `None` when the process could not start or was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandResult {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Result for a process that never started; the error text lands in stderr.
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stderr: message.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Best human-readable description of why the invocation failed.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        if self.timed_out {
            return "command timed out".to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated without exit code".to_string(),
        }
    }
}
