//! Plan execution engine CLI.
//!
//! Runs refactoring plans (shell commands, generated transform scripts and
//! verification commands) against one target file, streaming progress events
//! as JSON lines on stdout.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use morph::core::types::Plan;
use morph::execute::PlanExecutor;
use morph::exit_codes;
use morph::io::config::{CONFIG_RELATIVE_PATH, MorphConfig, load_config, write_config};
use morph::io::generator::{CommandGenerator, PlanGenerator};
use morph::io::notifier::{FanOutNotifier, JsonLinesNotifier};
use morph::io::plan_file::{load_plan, write_plan};
use morph::io::process::SystemRunner;
use morph::io::prompt::PromptEngine;
use morph::logging;

#[derive(Parser)]
#[command(
    name = "morph",
    version,
    about = "Plan execution engine for automated code refactoring"
)]
struct Cli {
    /// Workspace root; relative targets and the working directory resolve against it.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.morph/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a plan file against the plan schema and step rules.
    Validate {
        /// Plan file (JSON array of steps).
        plan: PathBuf,
    },
    /// Ask the generator for a plan and print or save it.
    Plan {
        /// Refactoring goal in plain words.
        #[arg(long)]
        goal: String,
        /// File the plan will transform.
        #[arg(long)]
        target: PathBuf,
        /// Write the plan here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Execute a plan against a target file.
    Run {
        /// File transform steps rewrite.
        #[arg(long)]
        target: PathBuf,
        /// Plan file to execute.
        #[arg(long, conflicts_with = "goal", required_unless_present = "goal")]
        plan: Option<PathBuf>,
        /// Generate the plan from this goal first.
        #[arg(long)]
        goal: Option<String>,
        /// Also append events as JSON lines to this file.
        #[arg(long)]
        events: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.workspace;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Validate { plan } => cmd_validate(&plan),
        Command::Plan { goal, target, out } => cmd_plan(&root, &goal, &target, out.as_deref()),
        Command::Run {
            target,
            plan,
            goal,
            events,
        } => cmd_run(&root, &target, plan.as_deref(), goal.as_deref(), events.as_deref()),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = root.join(CONFIG_RELATIVE_PATH);
    if path.exists() && !force {
        info!(path = %path.display(), "config exists; leaving it untouched");
        return Ok(exit_codes::OK);
    }
    write_config(&path, &MorphConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let plan = load_plan(path)?;
    println!("{}: {} steps", path.display(), plan.len());
    Ok(exit_codes::OK)
}

fn cmd_plan(root: &Path, goal: &str, target: &Path, out: Option<&Path>) -> Result<i32> {
    let config = load_config(&root.join(CONFIG_RELATIVE_PATH))?;
    let plan = generate_plan(&command_generator(&config, root), root, target, goal)?;
    match out {
        Some(out) => write_plan(out, &plan)?,
        None => println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("serialize plan")?
        ),
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    root: &Path,
    target: &Path,
    plan_path: Option<&Path>,
    goal: Option<&str>,
    events: Option<&Path>,
) -> Result<i32> {
    let config = load_config(&root.join(CONFIG_RELATIVE_PATH))?;
    let generator = command_generator(&config, root);
    let mut plan = match (plan_path, goal) {
        (Some(path), _) => load_plan(path)?,
        (None, Some(goal)) => generate_plan(&generator, root, target, goal)?,
        (None, None) => bail!("either --plan or --goal is required"),
    };

    let event_file = events
        .map(|path| File::create(path).with_context(|| format!("create {}", path.display())))
        .transpose()?
        .map(JsonLinesNotifier::new);
    let stdout = JsonLinesNotifier::new(std::io::stdout());
    let mut notifier = FanOutNotifier::new().with(&stdout);
    if let Some(sink) = &event_file {
        notifier = notifier.with(sink);
    }

    let runner = SystemRunner::new(config.command_timeout(), config.output_limit_bytes);
    let executor = PlanExecutor::new(runner, generator, config).with_workspace_root(root);
    let report = executor.execute_plan(&mut plan, target, &notifier);
    info!(succeeded = report.succeeded(), "run finished");

    Ok(if report.succeeded() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn command_generator(config: &MorphConfig, root: &Path) -> CommandGenerator {
    CommandGenerator::new(
        config.generator.command.clone(),
        root,
        config.generator_timeout(),
        config.output_limit_bytes,
        PromptEngine::new(config.transform.command.join(" ")),
    )
}

fn generate_plan(
    generator: &impl PlanGenerator,
    root: &Path,
    target: &Path,
    goal: &str,
) -> Result<Plan> {
    let target_path = root.join(target);
    let source = fs::read_to_string(&target_path)
        .with_context(|| format!("read {}", target_path.display()))?;
    generator
        .generate_plan(&source, goal)
        .context("generate plan")
}
