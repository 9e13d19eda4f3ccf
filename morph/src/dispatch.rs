//! Step dispatch: turn one plan step into an external invocation.

use tracing::{debug, info, instrument, warn};

use crate::core::types::{CommandResult, PlanStep, StreamKind, ToolKind};
use crate::error::EngineError;
use crate::io::config::TransformConfig;
use crate::io::generator::ScriptGenerator;
use crate::io::notifier::{Event, Notifier};
use crate::io::process::{CommandRunner, Invocation};
use crate::io::workspace::Workspace;
use crate::session::ExecutionSession;

/// Executes single steps against the environment.
///
/// The dispatcher never decides between cascade and retry: it reports a
/// [`CommandResult`] and leaves that to the plan executor.
pub struct StepDispatcher<'a, R, G> {
    runner: &'a R,
    generator: &'a G,
    workspace: &'a Workspace,
    transform: &'a TransformConfig,
    notifier: &'a dyn Notifier,
}

impl<'a, R: CommandRunner, G: ScriptGenerator> StepDispatcher<'a, R, G> {
    pub fn new(
        runner: &'a R,
        generator: &'a G,
        workspace: &'a Workspace,
        transform: &'a TransformConfig,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            runner,
            generator,
            workspace,
            transform,
            notifier,
        }
    }

    pub fn generator(&self) -> &G {
        self.generator
    }

    pub fn workspace(&self) -> &Workspace {
        self.workspace
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier
    }

    /// Run `step`. Transform steps first obtain and materialise a new script.
    ///
    /// Errors are reserved for generator and filesystem faults; process failures
    /// come back as a failing [`CommandResult`].
    #[instrument(skip_all, fields(tool = step.tool.as_str()))]
    pub fn dispatch(
        &self,
        step: &PlanStep,
        session: &mut ExecutionSession,
    ) -> Result<CommandResult, EngineError> {
        match step.tool {
            ToolKind::Transform => {
                self.materialize_transform(step, session)?;
                Ok(self.apply_transform(step, session))
            }
            ToolKind::Verification | ToolKind::ShellCommand => Ok(self.run_command(step, session)),
        }
    }

    /// Ask the generator for a script targeting the baseline and write it to a fresh file.
    fn materialize_transform(
        &self,
        step: &PlanStep,
        session: &mut ExecutionSession,
    ) -> Result<(), EngineError> {
        self.notifier.notify(Event::info("Generating transform script..."));
        let script = self
            .generator
            .generate_transform(session.baseline(), &step.description)?;
        let path = self
            .workspace
            .write_new_script(&self.transform.script_extension, &script)?;
        info!(path = %path.display(), "transform script materialised");
        session.record_transform(path, script);
        Ok(())
    }

    /// Run the transform tool with the session's current script.
    pub fn apply_transform(&self, step: &PlanStep, session: &ExecutionSession) -> CommandResult {
        let resolved = match session.resolve(&step.params) {
            Ok(resolved) => resolved,
            Err(err) => return self.unrunnable(err.to_string()),
        };
        let Some((program, base_args)) = self.transform.command.split_first() else {
            return self.unrunnable("transform command is empty".to_string());
        };
        let mut args = base_args.to_vec();
        args.extend(resolved);
        self.invoke(program, &args)
    }

    /// Run the step's own command line (`params[0]` is the program).
    pub fn run_command(&self, step: &PlanStep, session: &ExecutionSession) -> CommandResult {
        let resolved = match session.resolve(&step.params) {
            Ok(resolved) => resolved,
            Err(err) => return self.unrunnable(err.to_string()),
        };
        let Some((program, args)) = resolved.split_first() else {
            return self.unrunnable("step has no command".to_string());
        };
        self.invoke(program, args)
    }

    fn invoke(&self, program: &str, args: &[String]) -> CommandResult {
        let invocation = Invocation {
            program,
            args,
            cwd: self.workspace.root(),
        };
        let result = self.runner.run(&invocation, self.notifier);
        debug!(exit_code = ?result.exit_code, timed_out = result.timed_out, "invocation finished");
        result
    }

    /// A step that cannot be turned into an invocation fails like a process that never started.
    fn unrunnable(&self, message: String) -> CommandResult {
        warn!(%message, "step cannot be invoked");
        self.notifier
            .notify(Event::log(StreamKind::Stderr, message.clone()));
        CommandResult::spawn_failure(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::CorrectionPolicy;
    use crate::test_support::{
        RecordingNotifier, ScriptedCommand, ScriptedGenerator, ScriptedRunner, shell_step,
        transform_step,
    };
    use std::fs;
    use std::path::Path;

    fn setup() -> (tempfile::TempDir, Workspace, ExecutionSession) {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::prepare(temp.path(), Path::new(".morph")).expect("prepare");
        let target = temp.path().join("App.jsx");
        fs::write(&target, "const a = 1;\n").expect("write");
        let session = ExecutionSession::new(
            target,
            "const a = 1;\n".to_string(),
            workspace.work_dir().to_path_buf(),
            CorrectionPolicy::PerVerification,
        );
        (temp, workspace, session)
    }

    #[test]
    fn transform_materialises_script_and_resolves_placeholders() {
        let (_temp, workspace, mut session) = setup();
        let runner = ScriptedRunner::new(vec![ScriptedCommand::ok("")]);
        let generator = ScriptedGenerator::new(vec![Ok("module.exports = 1;".to_string())], vec![]);
        let notifier = RecordingNotifier::default();
        let transform = TransformConfig::default();
        let dispatcher = StepDispatcher::new(&runner, &generator, &workspace, &transform, &notifier);

        let result = dispatcher
            .dispatch(&transform_step("add import"), &mut session)
            .expect("dispatch");
        assert!(result.success());

        let script = session.last_transform().expect("script recorded");
        assert_eq!(fs::read_to_string(&script.path).expect("read"), "module.exports = 1;");
        assert!(script.path.starts_with(workspace.work_dir()));

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![
                "npx".to_string(),
                "jscodeshift".to_string(),
                "-t".to_string(),
                script.path.display().to_string(),
                session.target_path().display().to_string(),
            ]
        );
        assert_eq!(generator.transform_requests(), vec![(
            "const a = 1;\n".to_string(),
            "add import".to_string()
        )]);
    }

    #[test]
    fn shell_steps_run_verbatim() {
        let (_temp, workspace, mut session) = setup();
        let runner = ScriptedRunner::new(vec![ScriptedCommand::fail(1, "nope")]);
        let generator = ScriptedGenerator::default();
        let notifier = RecordingNotifier::default();
        let transform = TransformConfig::default();
        let dispatcher = StepDispatcher::new(&runner, &generator, &workspace, &transform, &notifier);

        let result = dispatcher
            .dispatch(&shell_step("branch", &["git", "checkout", "-b", "x"]), &mut session)
            .expect("dispatch");
        assert!(!result.success());
        assert_eq!(runner.invocations()[0], vec!["git", "checkout", "-b", "x"]);
    }

    #[test]
    fn unresolvable_placeholder_fails_without_spawning() {
        let (_temp, workspace, mut session) = setup();
        let runner = ScriptedRunner::new(vec![]);
        let generator = ScriptedGenerator::default();
        let notifier = RecordingNotifier::default();
        let transform = TransformConfig::default();
        let dispatcher = StepDispatcher::new(&runner, &generator, &workspace, &transform, &notifier);

        let result = dispatcher
            .dispatch(&shell_step("cat", &["cat", "<TRANSFORM_SCRIPT>"]), &mut session)
            .expect("dispatch");
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("<TRANSFORM_SCRIPT>"));
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn generator_failure_is_an_error() {
        let (_temp, workspace, mut session) = setup();
        let runner = ScriptedRunner::new(vec![]);
        let generator = ScriptedGenerator::new(
            vec![Err(crate::io::generator::GeneratorError::Unusable("empty response".into()))],
            vec![],
        );
        let notifier = RecordingNotifier::default();
        let transform = TransformConfig::default();
        let dispatcher = StepDispatcher::new(&runner, &generator, &workspace, &transform, &notifier);

        let err = dispatcher
            .dispatch(&transform_step("add import"), &mut session)
            .unwrap_err();
        assert!(matches!(err, EngineError::Generator(_)));
        assert!(session.last_transform().is_none());
    }
}
