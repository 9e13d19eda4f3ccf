//! Engine configuration stored under `.morph/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::CorrectionPolicy;

/// Upper bound for configured timeouts (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Path of the config file relative to the workspace root.
pub const CONFIG_RELATIVE_PATH: &str = ".morph/config.toml";

/// Engine configuration (TOML).
///
/// Missing fields default to values that work for a JavaScript project driven by jscodeshift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MorphConfig {
    /// Directory (relative to the workspace root) for generated scripts and locks.
    pub work_dir: PathBuf,

    /// Per-invocation wall-clock limit for plan step commands.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// How many self-correction rounds one execution may spend.
    pub correction_budget: CorrectionPolicy,

    pub transform: TransformConfig,

    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransformConfig {
    /// Tool that applies a script to the target in place; step params are appended.
    pub command: Vec<String>,
    /// Extension for materialised script files.
    pub script_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and writes its answer to stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".to_string(), "jscodeshift".to_string()],
            script_extension: "js".to_string(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            timeout_secs: 5 * 60,
        }
    }
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(".morph"),
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
            correction_budget: CorrectionPolicy::default(),
            transform: TransformConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl MorphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(anyhow!("work_dir must not be empty"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.command_timeout_secs) {
            return Err(anyhow!(
                "command_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            ));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.generator.timeout_secs) {
            return Err(anyhow!(
                "generator.timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            ));
        }
        if !is_command(&self.transform.command) {
            return Err(anyhow!("transform.command must be a non-empty array"));
        }
        if !is_command(&self.generator.command) {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        let ext = self.transform.script_extension.trim();
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(anyhow!(
                "transform.script_extension must be a bare extension like \"js\""
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator.timeout_secs)
    }
}

fn is_command(command: &[String]) -> bool {
    command
        .first()
        .is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MorphConfig::default()`.
pub fn load_config(path: &Path) -> Result<MorphConfig> {
    if !path.exists() {
        let cfg = MorphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MorphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MorphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, MorphConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_RELATIVE_PATH);
        let cfg = MorphConfig {
            correction_budget: CorrectionPolicy::PerPlan,
            ..MorphConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "correction_budget = \"per_plan\"\n[transform]\ncommand = [\"node\", \"apply.js\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.correction_budget, CorrectionPolicy::PerPlan);
        assert_eq!(cfg.transform.command, vec!["node", "apply.js"]);
        assert_eq!(cfg.transform.script_extension, "js");
        assert_eq!(cfg.command_timeout_secs, 600);
    }

    #[test]
    fn rejects_empty_transform_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[transform]\ncommand = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("transform.command"));
    }

    #[test]
    fn rejects_timeouts_beyond_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "command_timeout_secs = 18446744073709551615\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("command_timeout_secs"));

        fs::write(&path, "[generator]\ntimeout_secs = 604801\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("generator.timeout_secs"));
    }
}
