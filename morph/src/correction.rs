//! One-shot self-correction after a failed verification.
//!
//! Protocol: regenerate the transform script from the failure output, overwrite the
//! script file, restore the target to its baseline, re-apply the most recent transform
//! step, then re-run the verification. There is never a second round for the same
//! verification failure.

use tracing::{info, instrument, warn};

use crate::core::types::{CommandResult, Plan};
use crate::dispatch::StepDispatcher;
use crate::error::EngineError;
use crate::io::generator::ScriptGenerator;
use crate::io::notifier::Event;
use crate::io::process::CommandRunner;
use crate::session::ExecutionSession;

/// Result of a correction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// Verification passes after the corrected transform.
    Corrected,
    /// Correction was not possible or did not help; carries the overall failure message.
    Failed(String),
}

/// Try to recover the verification step at `index` that produced `failed`.
///
/// Generator and filesystem faults are returned as errors; everything else is a
/// [`CorrectionOutcome`].
#[instrument(skip_all, fields(index = index))]
pub fn self_correct<R: CommandRunner, G: ScriptGenerator>(
    dispatcher: &StepDispatcher<'_, R, G>,
    plan: &Plan,
    index: usize,
    failed: &CommandResult,
    session: &mut ExecutionSession,
) -> Result<CorrectionOutcome, EngineError> {
    let failure = failed.failure_detail();
    let Some(verification) = plan.step(index) else {
        return Ok(CorrectionOutcome::Failed(format!(
            "Verification failed: {failure}"
        )));
    };

    let Some((transform_index, transform_step)) = plan
        .last_transform_before(index)
        .and_then(|i| plan.step(i).map(|step| (i, step)))
    else {
        warn!("no transform step precedes the failed verification");
        return Ok(CorrectionOutcome::Failed(format!(
            "Verification failed and no transform step precedes it: {failure}"
        )));
    };
    let Some(script) = session.last_transform().cloned() else {
        warn!("no transform script was materialised before the failed verification");
        return Ok(CorrectionOutcome::Failed(format!(
            "Verification failed and no transform script exists to correct: {failure}"
        )));
    };

    if !session.corrections_mut().try_claim(index) {
        info!("correction budget spent; not retrying");
        return Ok(CorrectionOutcome::Failed(format!(
            "Verification failed: {failure}"
        )));
    }

    let notifier = dispatcher.notifier();
    notifier.notify(Event::info(
        "Verification failed. Analyzing errors and attempting self-correction...",
    ));
    info!(transform_index, "starting self-correction");

    let corrected = dispatcher.generator().generate_corrected_transform(
        session.baseline(),
        &script.content,
        &failed.stderr,
    )?;
    notifier.notify(Event::info("Generated a corrected script. Retrying..."));

    dispatcher
        .workspace()
        .overwrite_script(&script.path, &corrected)?;
    session.update_transform_content(corrected);
    dispatcher
        .workspace()
        .restore_target(session.target_path(), session.baseline())?;

    let reapplied = dispatcher.apply_transform(transform_step, session);
    if !reapplied.success() {
        warn!(exit_code = ?reapplied.exit_code, "corrected transform failed");
        return Ok(CorrectionOutcome::Failed(format!(
            "Corrected transform also failed: {}",
            reapplied.failure_detail()
        )));
    }

    let retest = dispatcher.run_command(verification, session);
    if !retest.success() {
        warn!(exit_code = ?retest.exit_code, "verification still failing after correction");
        return Ok(CorrectionOutcome::Failed(format!(
            "Self-correction failed. Verification still failing: {}",
            retest.failure_detail()
        )));
    }

    notifier.notify(Event::info(
        "Self-correction successful! Verification passed.",
    ));
    info!("self-correction succeeded");
    Ok(CorrectionOutcome::Corrected)
}
