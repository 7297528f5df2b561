use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use bminfra::config::Config;
use bminfra::core::{TaskGraph, Taskfile};
use bminfra::executor::{DryRunExecutor, ProcessExecutor};
use bminfra::vars::Vars;
use bminfra::{blog, blog_error, preflight, Error, Result, Sequencer, SequencerEvent};

/// bminfra - stand up and tear down the bare-metal installer test environment
#[derive(Parser, Debug)]
#[command(name = "bminfra")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:
    BMI_BRANCH            bm-inventory branch to deploy (default: master)
    IMAGE                 installer image path
    NUM_MASTERS           number of master nodes (default: 3, max: 3)
    BMINFRA_STAGING_DIR   staging directory (default: build)
    BMINFRA_STEP_TIMEOUT  per-step timeout in seconds
    BMINFRA_DEBUG=1       enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Taskfile to use instead of ./bminfra.toml or the built-in one
    #[arg(short = 'f', long, global = true)]
    pub taskfile: Option<PathBuf>,

    /// Enable debug logging (writes to ~/.bminfra/bminfra.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run tasks and everything they need
    Run {
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Print resolved steps without running them
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Show the order tasks would run in
    Plan {
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// List declared tasks
    List,

    /// Check that the programs a run needs are installed
    Check {
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Show the effective configuration and variables
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Ok(dir) = Config::bminfra_dir() {
        if let Err(e) = bminfra::log::init(&dir, cli.debug) {
            eprintln!("bminfra: logging disabled: {}", e);
        }
    }

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            blog_error!("{}", e);
            eprintln!("bminfra: {}", e);
            if bminfra::log::is_debug() {
                if let Some(path) = bminfra::log::path() {
                    eprintln!("bminfra: see {}", path.display());
                }
            }
            if matches!(e, Error::Interrupted) {
                ExitCode::from(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let cwd = std::env::current_dir()?;
    let taskfile = Taskfile::locate(cli.taskfile.as_deref(), &config, &cwd)?;
    blog!("bminfra starting, taskfile={}", taskfile.source);

    match cli.command {
        Command::Run {
            tasks,
            dry_run,
            json,
        } => run_tasks(&config, &taskfile, &tasks, dry_run, json),
        Command::Plan { tasks } => run_plan(&taskfile, &tasks),
        Command::List => run_list(&taskfile),
        Command::Check { tasks } => run_check(&config, &taskfile, &tasks),
        Command::Config => run_config(&config, &taskfile),
    }
}

/// Config variables plus taskfile defaults.
fn load_vars(config: &Config, taskfile: &Taskfile) -> Result<Vars> {
    let mut vars = config.to_vars(&taskfile.base_dir)?;
    vars.add_defaults(&taskfile.vars, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    })?;
    Ok(vars)
}

fn progress_printer() -> impl FnMut(&SequencerEvent) {
    let mut total = 0;
    move |event| match event {
        SequencerEvent::TaskStarted { task, steps } => {
            total = *steps;
            eprintln!("==> {}", task);
        }
        SequencerEvent::StepStarted {
            index, summary, ..
        } => eprintln!("  -> [{}/{}] {}", index, total, summary),
        SequencerEvent::StepSkipped { reason, .. } => eprintln!("     skipped: {}", reason),
        SequencerEvent::StepWarning { error, .. } => {
            eprintln!("     warning: {} (continuing)", error)
        }
        SequencerEvent::TaskFinished { .. } => {}
    }
}

fn run_tasks(
    config: &Config,
    taskfile: &Taskfile,
    tasks: &[String],
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let graph = taskfile.graph()?;
    let vars = load_vars(config, taskfile)?;
    let base_dir = taskfile.base_dir.clone();

    if dry_run {
        let mut seq = Sequencer::new(&graph, DryRunExecutor::new(), vars, base_dir)
            .on_event(progress_printer());
        seq.run(tasks)?;
        return Ok(());
    }

    let mut seq = Sequencer::new(&graph, ProcessExecutor::new()?, vars, base_dir)
        .with_step_timeout(config.step_timeout())
        .on_event(progress_printer());
    let result = seq.run(tasks);

    if json {
        if let Some(report) = seq.report() {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    let report = result?;
    if report.warnings.is_empty() {
        eprintln!("done: {}", report.executed().join(", "));
    } else {
        eprintln!(
            "done with {} warning(s): {}",
            report.warnings.len(),
            report.executed().join(", ")
        );
        for warning in &report.warnings {
            eprintln!("  {}", warning);
        }
    }
    Ok(())
}

fn run_plan(taskfile: &Taskfile, tasks: &[String]) -> Result<()> {
    let graph = taskfile.graph()?;
    for (i, task) in graph.resolve(tasks)?.iter().enumerate() {
        println!("{:>3}. {}", i + 1, task.name);
        for step in &task.steps {
            let marker = if step.best_effort { " (best effort)" } else { "" };
            println!("       - {}{}", step.summary(), marker);
        }
    }
    Ok(())
}

fn run_list(taskfile: &Taskfile) -> Result<()> {
    let graph = taskfile.graph()?;
    let width = graph
        .tasks()
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(0);
    for task in graph.tasks() {
        let description = task.description.as_deref().unwrap_or("");
        if task.needs.is_empty() {
            println!("{:width$}  {}", task.name, description, width = width);
        } else {
            println!(
                "{:width$}  {} [needs: {}]",
                task.name,
                description,
                task.needs.join(", "),
                width = width
            );
        }
    }
    Ok(())
}

fn run_check(config: &Config, taskfile: &Taskfile, tasks: &[String]) -> Result<()> {
    let graph: TaskGraph = taskfile.graph()?;
    let vars = load_vars(config, taskfile)?;
    let plan = graph.resolve(tasks)?;
    let statuses = preflight::check(&plan, &vars);
    for status in &statuses {
        match &status.path {
            Some(path) => println!("ok       {:<12} {}", status.program, path.display()),
            None => println!("missing  {}", status.program),
        }
    }
    preflight::ensure_installed(&statuses)
}

fn run_config(config: &Config, taskfile: &Taskfile) -> Result<()> {
    println!("config file: {}", display_path(&Config::config_path()?));
    println!("taskfile:    {}", taskfile.source);
    println!("step timeout: {:?}", config.step_timeout());
    println!();
    for (key, value) in load_vars(config, taskfile)?.iter() {
        println!("{}={}", key, value);
    }
    Ok(())
}

fn display_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not present)", path.display())
    }
}
