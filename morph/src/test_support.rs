//! Test-only doubles for the engine's seams.
//!
//! Scripted runners and generators replay queued results in order and record what
//! they were asked, so orchestration can be exercised without spawning processes or
//! calling a model.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::types::{CommandResult, PlanStep, StepStatus, StreamKind, ToolKind};
use crate::io::generator::{GeneratorError, ScriptGenerator};
use crate::io::notifier::{Event, Notifier};
use crate::io::process::{CommandRunner, Invocation};

/// Canned outcome for one scripted invocation.
#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    writes: Option<(PathBuf, String)>,
}

impl ScriptedCommand {
    /// Exit 0 with `stdout`.
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            writes: None,
        }
    }

    /// Exit `code` with `stderr`.
    pub fn fail(code: i32, stderr: &str) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
            writes: None,
        }
    }

    /// Process that never started.
    pub fn unspawnable(message: &str) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: message.to_string(),
            writes: None,
        }
    }

    /// Also overwrite `path` with `content` when run, like a transform tool would.
    pub fn writing(mut self, path: &Path, content: &str) -> Self {
        self.writes = Some((path.to_path_buf(), content.to_string()));
        self
    }
}

/// [`CommandRunner`] that replays [`ScriptedCommand`]s in order.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    queue: RefCell<VecDeque<ScriptedCommand>>,
    invocations: RefCell<Vec<Vec<String>>>,
    watched: Option<PathBuf>,
    snapshots: RefCell<Vec<Option<String>>>,
}

impl ScriptedRunner {
    pub fn new(commands: Vec<ScriptedCommand>) -> Self {
        Self {
            queue: RefCell::new(commands.into()),
            ..Self::default()
        }
    }

    /// Record the content of `path` as each invocation starts.
    pub fn watching(mut self, path: &Path) -> Self {
        self.watched = Some(path.to_path_buf());
        self
    }

    /// Program plus arguments for every invocation, in order.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.borrow().clone()
    }

    /// Watched file content seen by each invocation (`None` if unreadable).
    pub fn snapshots(&self) -> Vec<Option<String>> {
        self.snapshots.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation<'_>, notifier: &dyn Notifier) -> CommandResult {
        notifier.notify(Event::info(format!("Running: {invocation}")));

        let mut argv = vec![invocation.program.to_string()];
        argv.extend(invocation.args.iter().cloned());
        self.invocations.borrow_mut().push(argv);
        if let Some(path) = &self.watched {
            self.snapshots
                .borrow_mut()
                .push(fs::read_to_string(path).ok());
        }

        let Some(command) = self.queue.borrow_mut().pop_front() else {
            let message = format!("no scripted result left for `{invocation}`");
            notifier.notify(Event::log(StreamKind::Stderr, format!("Spawn error: {message}")));
            return CommandResult::spawn_failure(message);
        };

        if let Some((path, content)) = &command.writes {
            fs::write(path, content).expect("scripted command write");
        }

        let Some(code) = command.exit_code else {
            notifier.notify(Event::log(
                StreamKind::Stderr,
                format!("Spawn error: {}", command.stderr),
            ));
            return CommandResult::spawn_failure(command.stderr);
        };
        for line in command.stdout.lines() {
            notifier.notify(Event::log(StreamKind::Stdout, line));
        }
        for line in command.stderr.lines() {
            notifier.notify(Event::log(StreamKind::Stderr, line));
        }
        CommandResult::exited(code, command.stdout, command.stderr)
    }
}

/// [`ScriptGenerator`] that replays queued results and records requests.
///
/// An exhausted queue answers with [`GeneratorError::Unusable`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    transforms: RefCell<VecDeque<Result<String, GeneratorError>>>,
    corrections: RefCell<VecDeque<Result<String, GeneratorError>>>,
    transform_requests: RefCell<Vec<(String, String)>>,
    corrected_requests: RefCell<Vec<(String, String, String)>>,
}

impl ScriptedGenerator {
    pub fn new(
        transforms: Vec<Result<String, GeneratorError>>,
        corrections: Vec<Result<String, GeneratorError>>,
    ) -> Self {
        Self {
            transforms: RefCell::new(transforms.into()),
            corrections: RefCell::new(corrections.into()),
            ..Self::default()
        }
    }

    /// `(source, goal)` pairs passed to `generate_transform`.
    pub fn transform_requests(&self) -> Vec<(String, String)> {
        self.transform_requests.borrow().clone()
    }

    /// `(source, failed_script, failure_output)` triples passed to `generate_corrected_transform`.
    pub fn corrected_requests(&self) -> Vec<(String, String, String)> {
        self.corrected_requests.borrow().clone()
    }
}

impl ScriptGenerator for ScriptedGenerator {
    fn generate_transform(&self, source: &str, goal: &str) -> Result<String, GeneratorError> {
        self.transform_requests
            .borrow_mut()
            .push((source.to_string(), goal.to_string()));
        self.transforms
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Unusable("no scripted transform left".into())))
    }

    fn generate_corrected_transform(
        &self,
        source: &str,
        failed_script: &str,
        failure_output: &str,
    ) -> Result<String, GeneratorError> {
        self.corrected_requests.borrow_mut().push((
            source.to_string(),
            failed_script.to_string(),
            failure_output.to_string(),
        ));
        self.corrections
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Unusable("no scripted correction left".into())))
    }
}

/// Notifier that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: RefCell<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Status changes of step `index`, in order.
    pub fn statuses_of(&self, index: usize) -> Vec<StepStatus> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::StepStatusChanged { index: i, status } if *i == index => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn overall(&self) -> Vec<Event> {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.is_overall())
            .cloned()
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Info { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Log lines as `(stream, text)`.
    pub fn log_lines(&self) -> Vec<(StreamKind, String)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::LogLine { stream, text } => Some((*stream, text.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

/// Transform step using the usual `-t <TRANSFORM_SCRIPT> <TARGET_FILE>` params.
pub fn transform_step(description: &str) -> PlanStep {
    PlanStep::new(
        description,
        ToolKind::Transform,
        vec![
            "-t".to_string(),
            "<TRANSFORM_SCRIPT>".to_string(),
            "<TARGET_FILE>".to_string(),
        ],
    )
}

pub fn shell_step(description: &str, argv: &[&str]) -> PlanStep {
    PlanStep::new(description, ToolKind::ShellCommand, to_params(argv))
}

pub fn verification_step(description: &str, argv: &[&str]) -> PlanStep {
    PlanStep::new(description, ToolKind::Verification, to_params(argv))
}

fn to_params(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|arg| (*arg).to_string()).collect()
}

/// Temporary workspace root holding one target file.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
    target: PathBuf,
}

impl TestWorkspace {
    pub fn new(target_name: &str, content: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join(target_name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("create target parent");
        }
        fs::write(&target, content).expect("write target");
        Self { dir, target }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn read_target(&self) -> String {
        fs::read_to_string(&self.target).expect("read target")
    }

    /// Transform scripts left in the default work directory, sorted by name.
    pub fn scripts(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.dir.path().join(".morph")) else {
            return Vec::new();
        };
        let mut scripts: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .collect();
        scripts.sort();
        scripts
    }
}
