//! Prompt rendering for the script generator.

use minijinja::{Environment, context};

const TRANSFORM_TEMPLATE: &str = include_str!("prompts/transform.md");
const CORRECTED_TRANSFORM_TEMPLATE: &str = include_str!("prompts/corrected_transform.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    transform_command: String,
}

impl PromptEngine {
    /// `transform_command` is the tool the generated scripts are fed to (e.g. `npx jscodeshift`).
    pub fn new(transform_command: impl Into<String>) -> Self {
        let mut env = Environment::new();
        env.add_template("transform", TRANSFORM_TEMPLATE)
            .expect("transform template should be valid");
        env.add_template("corrected_transform", CORRECTED_TRANSFORM_TEMPLATE)
            .expect("corrected_transform template should be valid");
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        Self {
            env,
            transform_command: transform_command.into(),
        }
    }

    pub fn render_transform(&self, source: &str, goal: &str) -> Result<String, minijinja::Error> {
        self.env.get_template("transform")?.render(context! {
            tool => self.transform_command.as_str(),
            goal => goal.trim(),
            source => source,
        })
    }

    pub fn render_corrected_transform(
        &self,
        source: &str,
        failed_script: &str,
        failure_output: &str,
    ) -> Result<String, minijinja::Error> {
        self.env.get_template("corrected_transform")?.render(context! {
            tool => self.transform_command.as_str(),
            source => source,
            failed_script => failed_script.trim(),
            failure_output => failure_output.trim(),
        })
    }

    pub fn render_plan(&self, source: &str, goal: &str) -> Result<String, minijinja::Error> {
        self.env.get_template("plan")?.render(context! {
            transform_command => self.transform_command.as_str(),
            goal => goal.trim(),
            source => source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_prompt_includes_goal_and_source() {
        let engine = PromptEngine::new("npx jscodeshift");
        let prompt = engine
            .render_transform("const a = 1;", "  rename a to b ")
            .expect("render");
        assert!(prompt.contains("npx jscodeshift"));
        assert!(prompt.contains("rename a to b\n"));
        assert!(prompt.contains("const a = 1;"));
    }

    #[test]
    fn corrected_prompt_carries_failure_output() {
        let engine = PromptEngine::new("npx jscodeshift");
        let prompt = engine
            .render_corrected_transform("src", "module.exports = () => {}", "assertion error\n")
            .expect("render");
        assert!(prompt.contains("module.exports = () => {}"));
        assert!(prompt.contains("assertion error"));
    }

    #[test]
    fn plan_prompt_mentions_placeholders() {
        let engine = PromptEngine::new("npx jscodeshift");
        let prompt = engine.render_plan("src", "extract hook").expect("render");
        assert!(prompt.contains("<TRANSFORM_SCRIPT>"));
        assert!(prompt.contains("<TARGET_FILE>"));
        assert!(prompt.contains("extract hook"));
    }
}
