//! Task declarations.
//!
//! A task is a named, ordered list of steps plus the names of the tasks
//! that must run before it. Tasks are parsed once from a taskfile and
//! never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What a single step does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Action {
    /// Run a script through `sh -c`. Variables reach it via the environment.
    Shell {
        script: String,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// Spawn a program directly.
    Exec {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// Create a named resource unless the enumeration already lists it.
    EnsureResource {
        name: String,
        /// Enumeration command, one argv element per entry.
        list: Vec<String>,
        /// Regex whose first capture group extracts a name from a line.
        #[serde(default)]
        pattern: Option<String>,
        /// Shell script that provisions the resource.
        create: String,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// Copy a template tree unless the destination already exists.
    CopyIfAbsent { from: PathBuf, to: PathBuf },
    /// Shallow single-branch clone unless the destination already exists.
    CloneIfAbsent {
        url: String,
        branch: String,
        dest: PathBuf,
    },
    /// Merge values into a JSON variable file.
    Tfvars {
        file: PathBuf,
        set: BTreeMap<String, toml::Value>,
    },
    /// Remove a file or directory tree.
    Remove { path: PathBuf },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Shell { .. } => "shell",
            Action::Exec { .. } => "exec",
            Action::EnsureResource { .. } => "ensure_resource",
            Action::CopyIfAbsent { .. } => "copy_if_absent",
            Action::CloneIfAbsent { .. } => "clone_if_absent",
            Action::Tfvars { .. } => "tfvars",
            Action::Remove { .. } => "remove",
        }
    }

    /// External programs this action needs on `PATH`.
    pub fn required_programs(&self) -> Vec<String> {
        match self {
            Action::Shell { .. } => vec!["sh".to_string()],
            Action::Exec { program, .. } => vec![program.clone()],
            Action::EnsureResource { list, .. } => {
                let mut programs = vec!["sh".to_string()];
                if let Some(first) = list.first() {
                    programs.push(first.clone());
                }
                programs
            }
            Action::CopyIfAbsent { .. }
            | Action::CloneIfAbsent { .. }
            | Action::Tfvars { .. }
            | Action::Remove { .. } => Vec::new(),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Shell { script, .. } => write!(f, "sh -c {:?}", script.trim()),
            Action::Exec { program, args, .. } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Action::EnsureResource { name, list, .. } => {
                write!(f, "ensure '{}' (listed by `{}`)", name, list.join(" "))
            }
            Action::CopyIfAbsent { from, to } => {
                write!(f, "copy {} -> {} (if absent)", from.display(), to.display())
            }
            Action::CloneIfAbsent { url, branch, dest } => write!(
                f,
                "clone {}@{} -> {} (if absent)",
                url,
                branch,
                dest.display()
            ),
            Action::Tfvars { file, set } => write!(
                f,
                "set {} in {}",
                set.keys().cloned().collect::<Vec<_>>().join(", "),
                file.display()
            ),
            Action::Remove { path } => write!(f, "remove {}", path.display()),
        }
    }
}

/// One entry in a task's step list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Optional label shown in progress output.
    #[serde(default)]
    pub label: Option<String>,
    /// Failures are reported as warnings and the task carries on.
    #[serde(default)]
    pub best_effort: bool,
    #[serde(flatten)]
    pub action: Action,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            label: None,
            best_effort: false,
            action,
        }
    }

    pub fn shell(script: &str) -> Self {
        Self::new(Action::Shell {
            script: script.to_string(),
            cwd: None,
        })
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    /// Text for progress output: the explicit label or the action summary.
    pub fn summary(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.action.to_string(),
        }
    }
}

/// A named task declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Prerequisites, run in this order before the task's own steps.
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Task {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            needs: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn needs(mut self, prereq: &str) -> Self {
        self.needs.push(prereq.to_string());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Tasks with no steps only group their prerequisites.
    pub fn is_aggregate(&self) -> bool {
        self.steps.is_empty()
    }
}

/// How a task ended within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    Completed,
    CompletedWithWarnings { warnings: usize },
    Failed { error: String },
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::CompletedWithWarnings { warnings } => {
                write!(f, "completed with {} warning(s)", warnings)
            }
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}
