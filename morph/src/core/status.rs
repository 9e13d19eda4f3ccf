//! Step status transition rules.
//!
//! Statuses only move forward: `Pending -> Running -> Success | Failed`, plus
//! `Pending -> Failed` when a step is cascaded without ever running.

use thiserror::Error;

use crate::core::types::StepStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    #[error("step {index} does not exist")]
    OutOfRange { index: usize },
    #[error("step {index} cannot move from {from:?} to {to:?}")]
    Regression {
        index: usize,
        from: StepStatus,
        to: StepStatus,
    },
}

pub fn check_transition(
    index: usize,
    from: StepStatus,
    to: StepStatus,
) -> Result<(), InvalidTransition> {
    let allowed = matches!(
        (from, to),
        (StepStatus::Pending, StepStatus::Running)
            | (StepStatus::Pending, StepStatus::Failed)
            | (StepStatus::Running, StepStatus::Success)
            | (StepStatus::Running, StepStatus::Failed)
    );
    if allowed {
        Ok(())
    } else {
        Err(InvalidTransition::Regression { index, from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        for (from, to) in [
            (StepStatus::Pending, StepStatus::Running),
            (StepStatus::Pending, StepStatus::Failed),
            (StepStatus::Running, StepStatus::Success),
            (StepStatus::Running, StepStatus::Failed),
        ] {
            assert!(check_transition(0, from, to).is_ok(), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn terminal_and_self_transitions_are_rejected() {
        for (from, to) in [
            (StepStatus::Success, StepStatus::Failed),
            (StepStatus::Failed, StepStatus::Running),
            (StepStatus::Running, StepStatus::Running),
            (StepStatus::Pending, StepStatus::Success),
            (StepStatus::Running, StepStatus::Pending),
        ] {
            let err = check_transition(2, from, to).unwrap_err();
            assert_eq!(err, InvalidTransition::Regression { index: 2, from, to });
        }
    }
}
