//! Plan file loading and validation.
//!
//! Plans are JSON arrays of `{description, tool, params}` objects. Loading checks
//! schema conformance first, then the semantic rules in [`validate_plan`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::plan_check::validate_plan;
use crate::core::types::Plan;

pub const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Read and validate a plan file.
pub fn load_plan(path: &Path) -> Result<Plan> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_plan(&raw).with_context(|| format!("load plan {}", path.display()))
}

/// Parse and validate plan JSON: schema conformance + semantic checks.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let instance: Value = serde_json::from_str(raw).context("parse plan json")?;
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    validate_schema(&instance, &schema)?;
    let plan: Plan = serde_json::from_value(instance).context("parse plan steps")?;
    let errors = validate_plan(&plan);
    if !errors.is_empty() {
        bail!("plan violations:\n- {}", errors.join("\n- "));
    }
    debug!(steps = plan.len(), "plan validated");
    Ok(plan)
}

/// Pretty-printed JSON with trailing newline.
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(plan).context("serialize plan")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
