//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scratch directories holding a taskfile
//! - Running a taskfile with the real executor
//! - Local git repositories to clone from

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use bminfra::core::{TaskGraph, Taskfile};
use bminfra::executor::ProcessExecutor;
use bminfra::vars::Vars;
use bminfra::{Result, RunReport, Sequencer};

/// A scratch directory with a taskfile in it.
pub struct Workspace {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().to_path_buf();
        Self { temp_dir, path }
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path.join(rel)).unwrap_or_default()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path.join(rel).exists()
    }

    /// Lines appended to `log.txt` by steps, in order.
    pub fn log_lines(&self) -> Vec<String> {
        self.read("log.txt").lines().map(String::from).collect()
    }

    pub fn taskfile(&self, content: &str) -> Taskfile {
        let path = self.write("bminfra.toml", content);
        Taskfile::load(&path).expect("Failed to load taskfile")
    }

    /// Variables a run would see, with STAGING_DIR under the workspace.
    pub fn vars(&self, taskfile: &Taskfile) -> Vars {
        let mut vars = Vars::new();
        vars.set("STAGING_DIR", self.path.join("build").display().to_string());
        vars.set("BMI_BRANCH", "master");
        vars.set("NUM_MASTERS", "3");
        vars.set("IMAGE", "");
        vars.add_defaults(&taskfile.vars, |_| None)
            .expect("Failed to layer taskfile vars");
        vars
    }

    /// Run `targets` from `content` with the real executor.
    pub fn run(&self, content: &str, targets: &[&str]) -> (Result<RunReport>, Option<RunReport>) {
        self.run_with_timeout(content, targets, None)
    }

    /// Like [`Workspace::run`] with a per-step timeout.
    pub fn run_with_timeout(
        &self,
        content: &str,
        targets: &[&str],
        step_timeout: Option<Duration>,
    ) -> (Result<RunReport>, Option<RunReport>) {
        let taskfile = self.taskfile(content);
        let graph = taskfile.graph().expect("Invalid task graph");
        self.run_graph(&taskfile, &graph, targets, step_timeout)
    }

    pub fn run_graph(
        &self,
        taskfile: &Taskfile,
        graph: &TaskGraph,
        targets: &[&str],
        step_timeout: Option<Duration>,
    ) -> (Result<RunReport>, Option<RunReport>) {
        let executor = ProcessExecutor::new().expect("Failed to build runtime");
        let mut seq = Sequencer::new(graph, executor, self.vars(taskfile), self.path.clone())
            .with_step_timeout(step_timeout);
        let result = seq.run(targets);
        (result, seq.report().cloned())
    }
}

/// Create a git repository at `path` with one commit on `branch`.
pub fn git_repo(path: &Path, branch: &str, file: &str, content: &str) {
    let repo = git2::Repository::init(path).expect("Failed to init repo");
    fs::write(path.join(file), content).expect("Failed to write file");

    let mut index = repo.index().expect("Failed to open index");
    index.add_path(Path::new(file)).expect("Failed to add file");
    index.write().expect("Failed to write index");
    let tree_id = index.write_tree().expect("Failed to write tree");
    let tree = repo.find_tree(tree_id).expect("Failed to find tree");

    let sig = git2::Signature::now("Test User", "test@test.com").expect("Failed to create signature");
    let refname = format!("refs/heads/{}", branch);
    repo.commit(Some(&refname), &sig, &sig, "Initial commit", &tree, &[])
        .expect("Failed to commit");
    repo.set_head(&refname).expect("Failed to set HEAD");
}
