//! Semantic checks for plans beyond schema conformance.

use crate::core::types::{
    Plan, TARGET_FILE_PLACEHOLDER, TRANSFORM_SCRIPT_PLACEHOLDER, ToolKind,
};

/// Return human-readable violations; an empty list means the plan is runnable.
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen_transform = false;

    for (index, step) in plan.steps().iter().enumerate() {
        if step.description.trim().is_empty() {
            errors.push(format!("step {index}: description must not be empty"));
        }

        match step.tool {
            ToolKind::Transform => {
                seen_transform = true;
            }
            ToolKind::ShellCommand | ToolKind::Verification => {
                match step.params.first() {
                    None => errors.push(format!(
                        "step {index}: {} step needs a command in params[0]",
                        step.tool.as_str()
                    )),
                    Some(program) if program.trim().is_empty() => {
                        errors.push(format!("step {index}: params[0] must not be blank"));
                    }
                    Some(program)
                        if program == TRANSFORM_SCRIPT_PLACEHOLDER
                            || program == TARGET_FILE_PLACEHOLDER =>
                    {
                        errors.push(format!(
                            "step {index}: params[0] must be a program, not {program}"
                        ));
                    }
                    Some(_) => {}
                }
                if !seen_transform
                    && step
                        .params
                        .iter()
                        .any(|param| param == TRANSFORM_SCRIPT_PLACEHOLDER)
                {
                    errors.push(format!(
                        "step {index}: {TRANSFORM_SCRIPT_PLACEHOLDER} used before any transform step"
                    ));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PlanStep;

    fn step(description: &str, tool: ToolKind, params: &[&str]) -> PlanStep {
        PlanStep::new(
            description,
            tool,
            params.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[test]
    fn accepts_typical_refactor_plan() {
        let plan = Plan::new(vec![
            step("branch", ToolKind::ShellCommand, &["git", "checkout", "-b", "x"]),
            step(
                "add import",
                ToolKind::Transform,
                &["-t", "<TRANSFORM_SCRIPT>", "<TARGET_FILE>"],
            ),
            step("run tests", ToolKind::Verification, &["npm", "test"]),
        ]);
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn reports_missing_commands_and_early_script_use() {
        let plan = Plan::new(vec![
            step("", ToolKind::ShellCommand, &[]),
            step("cat", ToolKind::ShellCommand, &["cat", "<TRANSFORM_SCRIPT>"]),
            step("weird", ToolKind::Verification, &["<TARGET_FILE>"]),
        ]);
        let errors = validate_plan(&plan);
        assert!(errors.iter().any(|e| e.contains("description must not be empty")));
        assert!(errors.iter().any(|e| e.contains("needs a command")));
        assert!(errors.iter().any(|e| e.contains("before any transform step")));
        assert!(errors.iter().any(|e| e.contains("must be a program")));
    }
}
