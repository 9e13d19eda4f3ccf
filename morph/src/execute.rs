//! Plan execution: the sequential state machine over a plan's steps.
//!
//! Steps run strictly one at a time. The first unrecoverable failure cascades
//! `Failed` onto the failing step and every later step, then ends the run with a
//! single `OverallFailed` event. A clean pass ends with a single `OverallSucceeded`.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, instrument, warn};

use crate::core::types::{Plan, StepStatus, ToolKind};
use crate::correction::{CorrectionOutcome, self_correct};
use crate::dispatch::StepDispatcher;
use crate::error::EngineError;
use crate::io::config::MorphConfig;
use crate::io::generator::ScriptGenerator;
use crate::io::lock::TargetLock;
use crate::io::notifier::{Event, Notifier};
use crate::io::process::CommandRunner;
use crate::io::workspace::Workspace;
use crate::session::ExecutionSession;

/// Message carried by `OverallSucceeded`.
pub const SUCCESS_MESSAGE: &str = "All steps completed successfully.";

/// Cooperative cancellation, checked only between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { message: String },
    /// `failed_at` is `None` when a precondition failed before any step ran.
    Failed {
        error: String,
        failed_at: Option<usize>,
    },
}

/// Summary returned to the caller alongside the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub statuses: Vec<StepStatus>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Succeeded { .. })
    }
}

enum StepVerdict {
    Passed,
    Failed(String),
}

/// Drives plans against a workspace.
pub struct PlanExecutor<R, G> {
    runner: R,
    generator: G,
    config: MorphConfig,
    workspace_root: Option<std::path::PathBuf>,
    cancel: CancelFlag,
}

impl<R: CommandRunner, G: ScriptGenerator> PlanExecutor<R, G> {
    /// Executor without a workspace; executions fail until one is attached.
    pub fn new(runner: R, generator: G, config: MorphConfig) -> Self {
        Self {
            runner,
            generator,
            config,
            workspace_root: None,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Run every step of `plan` against `target`, reporting progress to `notifier`.
    ///
    /// Step statuses in `plan` are updated in place. Relative targets resolve
    /// against the workspace root.
    #[instrument(skip_all, fields(steps = plan.len(), target = %target.display()))]
    pub fn execute_plan(
        &self,
        plan: &mut Plan,
        target: &Path,
        notifier: &dyn Notifier,
    ) -> ExecutionReport {
        let Some(root) = self.workspace_root.as_deref() else {
            return self.fail_before_start(plan, EngineError::WorkspaceUnavailable, notifier);
        };
        let workspace = match Workspace::prepare(root, &self.config.work_dir) {
            Ok(workspace) => workspace,
            Err(err) => return self.fail_before_start(plan, err, notifier),
        };
        let target_path = workspace.resolve_target(target);
        let _lock = match TargetLock::acquire(workspace.work_dir(), &target_path) {
            Ok(lock) => lock,
            Err(err) => return self.fail_before_start(plan, err, notifier),
        };
        let baseline = match workspace.read_baseline(&target_path) {
            Ok(baseline) => baseline,
            Err(err) => return self.fail_before_start(plan, err, notifier),
        };
        debug!(baseline_bytes = baseline.len(), "baseline captured");

        let mut session = ExecutionSession::new(
            target_path,
            baseline,
            workspace.work_dir().to_path_buf(),
            self.config.correction_budget,
        );
        let dispatcher = StepDispatcher::new(
            &self.runner,
            &self.generator,
            &workspace,
            &self.config.transform,
            notifier,
        );

        for index in 0..plan.len() {
            if self.cancel.is_cancelled() {
                warn!(index, "execution cancelled before step");
                return self.cascade(plan, index, EngineError::Cancelled.to_string(), notifier);
            }

            set_status(plan, index, StepStatus::Running, notifier);
            let verdict = match run_step(&dispatcher, plan, index, &mut session) {
                Ok(verdict) => verdict,
                Err(err) => StepVerdict::Failed(err.to_string()),
            };
            match verdict {
                StepVerdict::Passed => set_status(plan, index, StepStatus::Success, notifier),
                StepVerdict::Failed(error) => return self.cascade(plan, index, error, notifier),
            }
        }

        info!(
            corrections = session.corrections().rounds_spent(),
            "plan completed"
        );
        notifier.notify(Event::OverallSucceeded {
            message: SUCCESS_MESSAGE.to_string(),
        });
        ExecutionReport {
            outcome: ExecutionOutcome::Succeeded {
                message: SUCCESS_MESSAGE.to_string(),
            },
            statuses: plan.statuses(),
        }
    }

    /// Precondition failure: no step runs and no status changes.
    fn fail_before_start(
        &self,
        plan: &Plan,
        err: EngineError,
        notifier: &dyn Notifier,
    ) -> ExecutionReport {
        let error = err.to_string();
        warn!(%error, "execution could not start");
        notifier.notify(Event::OverallFailed {
            error: error.clone(),
        });
        ExecutionReport {
            outcome: ExecutionOutcome::Failed {
                error,
                failed_at: None,
            },
            statuses: plan.statuses(),
        }
    }

    /// Fail step `index` and everything after it, then end the run.
    fn cascade(
        &self,
        plan: &mut Plan,
        index: usize,
        error: String,
        notifier: &dyn Notifier,
    ) -> ExecutionReport {
        warn!(index, %error, "step failed; cascading");
        for j in index..plan.len() {
            set_status(plan, j, StepStatus::Failed, notifier);
        }
        notifier.notify(Event::OverallFailed {
            error: error.clone(),
        });
        ExecutionReport {
            outcome: ExecutionOutcome::Failed {
                error,
                failed_at: Some(index),
            },
            statuses: plan.statuses(),
        }
    }
}

fn run_step<R: CommandRunner, G: ScriptGenerator>(
    dispatcher: &StepDispatcher<'_, R, G>,
    plan: &Plan,
    index: usize,
    session: &mut ExecutionSession,
) -> Result<StepVerdict, EngineError> {
    let Some(step) = plan.step(index) else {
        return Ok(StepVerdict::Failed(format!("step {index} does not exist")));
    };
    info!(index, tool = step.tool.as_str(), description = %step.description, "running step");

    let result = dispatcher.dispatch(step, session)?;
    if result.success() {
        return Ok(StepVerdict::Passed);
    }

    let verdict = match step.tool {
        ToolKind::Verification => match self_correct(dispatcher, plan, index, &result, session)? {
            CorrectionOutcome::Corrected => StepVerdict::Passed,
            CorrectionOutcome::Failed(error) => StepVerdict::Failed(error),
        },
        ToolKind::Transform => StepVerdict::Failed(format!(
            "Transform failed: {}",
            result.failure_detail()
        )),
        ToolKind::ShellCommand => {
            StepVerdict::Failed(format!("Step failed: {}", result.failure_detail()))
        }
    };
    Ok(verdict)
}

fn set_status(plan: &mut Plan, index: usize, status: StepStatus, notifier: &dyn Notifier) {
    match plan.advance(index, status) {
        Ok(()) => notifier.notify(Event::StepStatusChanged { index, status }),
        Err(err) => error!(err = %err, "refusing invalid status transition"),
    }
}
