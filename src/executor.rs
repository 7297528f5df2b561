//! Step execution.
//!
//! The sequencer only decides what runs next; everything with a side
//! effect goes through a [`StepExecutor`]. [`ProcessExecutor`] performs
//! the real work and [`DryRunExecutor`] reports what would happen.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Number, Value};
use tokio::runtime::Runtime;

use crate::core::task::{Action, Step};
use crate::git::GitOps;
use crate::guard::{CommandLister, GuardOutcome, SingletonGuard};
use crate::process::{self, CommandSpec};
use crate::vars::{is_single_reference, Vars};
use crate::{blog, staging, util, Result};

/// Everything a step needs besides its own declaration.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub task: &'a str,
    /// 1-based position within the task.
    pub index: usize,
    pub vars: &'a Vars,
    pub base_dir: &'a Path,
    pub timeout: Option<Duration>,
}

impl StepContext<'_> {
    pub fn resolve_path(&self, path: &Path) -> Result<PathBuf> {
        let expanded = PathBuf::from(self.vars.expand(&path.to_string_lossy())?);
        Ok(if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        })
    }

    fn resolve_cwd(&self, cwd: Option<&PathBuf>) -> Result<PathBuf> {
        match cwd {
            Some(dir) => self.resolve_path(dir),
            None => Ok(self.base_dir.to_path_buf()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ran,
    /// Nothing to do; the reason is shown to the operator.
    Skipped { reason: String },
}

pub trait StepExecutor {
    fn execute(&mut self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome>;
}

/// Expand variables and resolve paths. Shell scripts are left alone since
/// the shell expands them from the environment.
pub fn resolve_action(action: &Action, ctx: &StepContext<'_>) -> Result<Action> {
    let vars = ctx.vars;
    Ok(match action {
        Action::Shell { script, cwd } => Action::Shell {
            script: script.clone(),
            cwd: Some(ctx.resolve_cwd(cwd.as_ref())?),
        },
        Action::Exec { program, args, cwd } => Action::Exec {
            program: vars.expand(program)?,
            args: args
                .iter()
                .map(|a| vars.expand(a))
                .collect::<Result<_>>()?,
            cwd: Some(ctx.resolve_cwd(cwd.as_ref())?),
        },
        Action::EnsureResource {
            name,
            list,
            pattern,
            create,
            cwd,
        } => Action::EnsureResource {
            name: vars.expand(name)?,
            list: list
                .iter()
                .map(|a| vars.expand(a))
                .collect::<Result<_>>()?,
            pattern: pattern.clone(),
            create: create.clone(),
            cwd: Some(ctx.resolve_cwd(cwd.as_ref())?),
        },
        Action::CopyIfAbsent { from, to } => Action::CopyIfAbsent {
            from: ctx.resolve_path(from)?,
            to: ctx.resolve_path(to)?,
        },
        Action::CloneIfAbsent { url, branch, dest } => Action::CloneIfAbsent {
            url: vars.expand(url)?,
            branch: vars.expand(branch)?,
            dest: ctx.resolve_path(dest)?,
        },
        Action::Tfvars { file, set } => Action::Tfvars {
            file: ctx.resolve_path(file)?,
            set: set.clone(),
        },
        Action::Remove { path } => Action::Remove {
            path: ctx.resolve_path(path)?,
        },
    })
}

/// Convert a TOML value to JSON, expanding variables in strings.
///
/// A string that is a lone `${NAME}` holding an integer becomes a JSON
/// number, so `"${NUM_MASTERS}"` lands in tfvars as `3`.
pub fn expand_value(vars: &Vars, value: &toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => {
            let expanded = vars.expand(s)?;
            match expanded.parse::<i64>() {
                Ok(n) if is_single_reference(s) => Value::Number(n.into()),
                _ => Value::String(expanded),
            }
        }
        toml::Value::Integer(i) => Value::Number((*i).into()),
        toml::Value::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| expand_value(vars, v))
                .collect::<Result<_>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(k, v)| Ok((k.clone(), expand_value(vars, v)?)))
                .collect::<Result<Map<_, _>>>()?,
        ),
    })
}

/// Runs steps for real.
pub struct ProcessExecutor {
    runtime: Runtime,
}

impl ProcessExecutor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            runtime: util::runtime()?,
        })
    }

    fn run(&self, spec: &CommandSpec, timeout: Option<Duration>) -> Result<()> {
        self.runtime.block_on(process::run(spec, timeout))
    }
}

impl StepExecutor for ProcessExecutor {
    fn execute(&mut self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        match resolve_action(&step.action, ctx)? {
            Action::Shell { script, cwd } => {
                let spec = CommandSpec::shell(&script).vars(ctx.vars).cwd(cwd);
                self.run(&spec, ctx.timeout)?;
                Ok(StepOutcome::Ran)
            }
            Action::Exec { program, args, cwd } => {
                let spec = CommandSpec::new(&program)
                    .args(args)
                    .vars(ctx.vars)
                    .cwd(cwd);
                self.run(&spec, ctx.timeout)?;
                Ok(StepOutcome::Ran)
            }
            Action::EnsureResource {
                name,
                list,
                pattern,
                create,
                cwd,
            } => {
                let list_spec = CommandSpec::from_argv(&list)?
                    .vars(ctx.vars)
                    .cwd(cwd.clone());
                let mut lister = CommandLister::new(list_spec);
                if let Some(pattern) = &pattern {
                    lister = lister.with_pattern(pattern)?;
                }

                let create_spec = CommandSpec::shell(&create).vars(ctx.vars).cwd(cwd);
                let outcome = SingletonGuard::new(lister)
                    .ensure(&name, || self.run(&create_spec, ctx.timeout))?;
                Ok(match outcome {
                    GuardOutcome::Initialized => StepOutcome::Ran,
                    GuardOutcome::AlreadyPresent => StepOutcome::Skipped {
                        reason: format!("'{}' already exists", name),
                    },
                })
            }
            Action::CopyIfAbsent { from, to } => {
                if staging::copy_tree_if_absent(&from, &to)? {
                    Ok(StepOutcome::Ran)
                } else {
                    Ok(StepOutcome::Skipped {
                        reason: format!("{} already exists", to.display()),
                    })
                }
            }
            Action::CloneIfAbsent { url, branch, dest } => {
                if dest.exists() {
                    blog!("{} already exists, not cloning", dest.display());
                    return Ok(StepOutcome::Skipped {
                        reason: format!("{} already exists", dest.display()),
                    });
                }
                GitOps::clone_branch(&url, &branch, &dest)?;
                Ok(StepOutcome::Ran)
            }
            Action::Tfvars { file, set } => {
                let values = set
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), expand_value(ctx.vars, v)?)))
                    .collect::<Result<Map<_, _>>>()?;
                staging::update_tfvars(&file, values)?;
                Ok(StepOutcome::Ran)
            }
            Action::Remove { path } => {
                if staging::remove_path(&path)? {
                    Ok(StepOutcome::Ran)
                } else {
                    Ok(StepOutcome::Skipped {
                        reason: format!("{} does not exist", path.display()),
                    })
                }
            }
        }
    }
}

/// Resolves steps without running them.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    /// `(task, resolved step)` in execution order.
    pub planned: Vec<(String, String)>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepExecutor for DryRunExecutor {
    fn execute(&mut self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        let resolved = resolve_action(&step.action, ctx)?.to_string();
        self.planned.push((ctx.task.to_string(), resolved.clone()));
        Ok(StepOutcome::Skipped {
            reason: format!("dry run: {}", resolved),
        })
    }
}
