//! Taskfile loading.
//!
//! A taskfile is TOML with a `[vars]` table of default variables and a
//! `[[task]]` array, each task carrying `[[task.step]]` entries tagged
//! by `kind`. When no taskfile is given, the built-in one describing the
//! bare-metal installer environment is used.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::core::dag::TaskGraph;
use crate::core::task::Task;
use crate::{blog_debug, Result};

/// File name looked up in the working directory.
pub const TASKFILE_NAME: &str = "bminfra.toml";

const BUILTIN: &str = include_str!("default_tasks.toml");

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    File(PathBuf),
    Builtin,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Builtin => write!(f, "<builtin>"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawTaskfile {
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default, rename = "task")]
    tasks: Vec<Task>,
}

#[derive(Debug)]
pub struct Taskfile {
    pub source: Source,
    /// Directory relative paths in steps resolve against.
    pub base_dir: PathBuf,
    pub vars: BTreeMap<String, String>,
    pub tasks: Vec<Task>,
}

impl Taskfile {
    pub fn parse(content: &str, source: Source, base_dir: PathBuf) -> Result<Self> {
        let raw: RawTaskfile = toml::from_str(content)?;
        blog_debug!(
            "Taskfile parsed from {}: {} tasks, {} vars",
            source,
            raw.tasks.len(),
            raw.vars.len()
        );
        Ok(Self {
            source,
            base_dir,
            vars: raw.vars,
            tasks: raw.tasks,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        Self::parse(&content, Source::File(path.to_path_buf()), base_dir)
    }

    /// The built-in taskfile, with paths relative to `base_dir`.
    pub fn builtin(base_dir: PathBuf) -> Result<Self> {
        Self::parse(BUILTIN, Source::Builtin, base_dir)
    }

    /// Find the taskfile to use.
    ///
    /// Order: explicit path, the config's `taskfile`, `bminfra.toml` in
    /// `cwd`, then the built-in one.
    pub fn locate(explicit: Option<&Path>, config: &Config, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = config.taskfile_path() {
            return Self::load(&cwd.join(path));
        }
        let local = cwd.join(TASKFILE_NAME);
        if local.is_file() {
            return Self::load(&local);
        }
        blog_debug!("No taskfile found, using builtin");
        Self::builtin(cwd.to_path_buf())
    }

    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::from_tasks(self.tasks.clone())
    }
}
