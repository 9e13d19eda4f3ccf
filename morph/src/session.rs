//! Transient state for one plan execution.

use std::path::{Path, PathBuf};

use crate::core::budget::{CorrectionBudget, CorrectionPolicy};
use crate::core::placeholder::{PlaceholderError, resolve_params};

/// Most recently materialised transform script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformScript {
    pub path: PathBuf,
    pub content: String,
}

/// Created at the start of an execution and dropped at its end.
#[derive(Debug)]
pub struct ExecutionSession {
    target_path: PathBuf,
    baseline_content: String,
    work_dir: PathBuf,
    last_transform: Option<TransformScript>,
    corrections: CorrectionBudget,
}

impl ExecutionSession {
    pub fn new(
        target_path: PathBuf,
        baseline_content: String,
        work_dir: PathBuf,
        policy: CorrectionPolicy,
    ) -> Self {
        Self {
            target_path,
            baseline_content,
            work_dir,
            last_transform: None,
            corrections: CorrectionBudget::new(policy),
        }
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Target content captured before the first step; never changes afterwards.
    pub fn baseline(&self) -> &str {
        &self.baseline_content
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn last_transform(&self) -> Option<&TransformScript> {
        self.last_transform.as_ref()
    }

    pub fn record_transform(&mut self, path: PathBuf, content: String) {
        self.last_transform = Some(TransformScript { path, content });
    }

    /// Replace the content of the current script after it was rewritten on disk.
    pub fn update_transform_content(&mut self, content: String) {
        if let Some(script) = self.last_transform.as_mut() {
            script.content = content;
        }
    }

    pub fn corrections(&self) -> &CorrectionBudget {
        &self.corrections
    }

    pub fn corrections_mut(&mut self) -> &mut CorrectionBudget {
        &mut self.corrections
    }

    pub fn resolve(&self, params: &[String]) -> Result<Vec<String>, PlaceholderError> {
        resolve_params(
            params,
            self.last_transform.as_ref().map(|script| script.path.as_path()),
            &self.target_path,
        )
    }
}
