//! Self-correction budget bookkeeping.

use serde::{Deserialize, Serialize};

/// How many correction rounds a single plan execution may spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionPolicy {
    /// Every failing verification step gets its own single round.
    #[default]
    PerVerification,
    /// One round for the whole plan, spent by the first failing verification.
    PerPlan,
}

/// Tracks correction rounds spent during one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionBudget {
    policy: CorrectionPolicy,
    spent: Vec<usize>,
}

impl CorrectionBudget {
    pub fn new(policy: CorrectionPolicy) -> Self {
        Self {
            policy,
            spent: Vec::new(),
        }
    }

    /// Claim the round for the verification step at `index`.
    ///
    /// Returns `false` when the round was already spent (by this step, or by any step
    /// under [`CorrectionPolicy::PerPlan`]).
    pub fn try_claim(&mut self, index: usize) -> bool {
        let available = match self.policy {
            CorrectionPolicy::PerVerification => !self.spent.contains(&index),
            CorrectionPolicy::PerPlan => self.spent.is_empty(),
        };
        if available {
            self.spent.push(index);
        }
        available
    }

    pub fn rounds_spent(&self) -> usize {
        self.spent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_verification_allows_one_round_per_step() {
        let mut budget = CorrectionBudget::new(CorrectionPolicy::PerVerification);
        assert!(budget.try_claim(1));
        assert!(!budget.try_claim(1));
        assert!(budget.try_claim(4));
        assert_eq!(budget.rounds_spent(), 2);
    }

    #[test]
    fn per_plan_allows_a_single_round() {
        let mut budget = CorrectionBudget::new(CorrectionPolicy::PerPlan);
        assert!(budget.try_claim(1));
        assert!(!budget.try_claim(4));
        assert_eq!(budget.rounds_spent(), 1);
    }
}
