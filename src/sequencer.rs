//! Task sequencer.
//!
//! Resolves the requested tasks into an execution order and runs each
//! task's steps strictly one after another. A failing step aborts the
//! whole run unless it is marked best-effort, in which case the failure
//! becomes a warning and the next step runs. Ctrl-C always aborts.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskStatus};
use crate::executor::{StepContext, StepExecutor, StepOutcome};
use crate::vars::Vars;
use crate::{blog, blog_debug, blog_error, blog_warn, log, Error, Result};

/// Progress notifications emitted while a run is underway.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    TaskStarted { task: String, steps: usize },
    StepStarted { task: String, index: usize, summary: String },
    StepSkipped { task: String, index: usize, reason: String },
    StepWarning { task: String, index: usize, error: String },
    TaskFinished { task: String, status: TaskStatus },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub duration_ms: u128,
}

/// What happened during a run, including partial progress on failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub targets: Vec<String>,
    pub tasks: Vec<TaskReport>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new(targets: Vec<String>) -> Self {
        Self {
            targets,
            tasks: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn executed(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.finished_at.is_some()
            && !self
                .tasks
                .iter()
                .any(|t| matches!(t.status, TaskStatus::Failed { .. }))
    }
}

type Observer<'a> = Box<dyn FnMut(&SequencerEvent) + 'a>;

pub struct Sequencer<'a, E> {
    graph: &'a TaskGraph,
    executor: E,
    vars: Vars,
    base_dir: PathBuf,
    step_timeout: Option<Duration>,
    observer: Option<Observer<'a>>,
    report: Option<RunReport>,
}

impl<'a, E: StepExecutor> Sequencer<'a, E> {
    pub fn new(graph: &'a TaskGraph, executor: E, vars: Vars, base_dir: PathBuf) -> Self {
        Self {
            graph,
            executor,
            vars,
            base_dir,
            step_timeout: None,
            observer: None,
            report: None,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn on_event<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&SequencerEvent) + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Report of the last run, also available after it failed.
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    pub fn plan<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<&'a Task>> {
        self.graph.resolve(targets)
    }

    /// Run `targets` and their prerequisites.
    ///
    /// Unknown targets are rejected before anything runs.
    pub fn run<S: AsRef<str>>(&mut self, targets: &[S]) -> Result<RunReport> {
        let plan = self.plan(targets)?;
        blog!(
            "Running {} task(s): {}",
            plan.len(),
            plan.iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        self.report = Some(RunReport::new(
            targets.iter().map(|t| t.as_ref().to_string()).collect(),
        ));

        for task in plan {
            self.run_task(task)?;
        }

        let report = self.report_mut();
        report.finished_at = Some(Utc::now());
        blog!(
            "Run finished: {} task(s), {} warning(s)",
            report.tasks.len(),
            report.warnings.len()
        );
        Ok(report.clone())
    }

    fn run_task(&mut self, task: &Task) -> Result<()> {
        let started = Instant::now();
        blog!("Task '{}' started", task.name);
        self.emit(SequencerEvent::TaskStarted {
            task: task.name.clone(),
            steps: task.steps.len(),
        });

        let mut warnings = 0;
        for (i, step) in task.steps.iter().enumerate() {
            let index = i + 1;
            let summary = step.summary();
            let scope = log::step_scope(&task.name, index);
            blog_debug!("running {}", summary);
            self.emit(SequencerEvent::StepStarted {
                task: task.name.clone(),
                index,
                summary,
            });

            let ctx = StepContext {
                task: &task.name,
                index,
                vars: &self.vars,
                base_dir: &self.base_dir,
                timeout: self.step_timeout,
            };
            match self.executor.execute(step, &ctx) {
                Ok(StepOutcome::Ran) => {}
                Ok(StepOutcome::Skipped { reason }) => {
                    blog!("skipped: {}", reason);
                    self.emit(SequencerEvent::StepSkipped {
                        task: task.name.clone(),
                        index,
                        reason,
                    });
                }
                Err(e) if step.best_effort && !e.is_fatal() => {
                    blog_warn!("failed, continuing: {}", e);
                    warnings += 1;
                    self.report_mut()
                        .warnings
                        .push(format!("{} step {}: {}", task.name, index, e));
                    self.emit(SequencerEvent::StepWarning {
                        task: task.name.clone(),
                        index,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    blog_error!("failed: {}", e);
                    drop(scope);
                    let err = if e.is_fatal() {
                        e
                    } else {
                        Error::StepFailed {
                            task: task.name.clone(),
                            step: index,
                            reason: e.to_string(),
                        }
                    };
                    self.finish_task(
                        task,
                        TaskStatus::Failed {
                            error: err.to_string(),
                        },
                        started,
                    );
                    return Err(err);
                }
            }
        }

        let status = if warnings == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::CompletedWithWarnings { warnings }
        };
        self.finish_task(task, status, started);
        Ok(())
    }

    fn finish_task(&mut self, task: &Task, status: TaskStatus, started: Instant) {
        blog!("Task '{}' {}", task.name, status);
        self.report_mut().tasks.push(TaskReport {
            name: task.name.clone(),
            status: status.clone(),
            duration_ms: started.elapsed().as_millis(),
        });
        self.emit(SequencerEvent::TaskFinished {
            task: task.name.clone(),
            status,
        });
    }

    fn report_mut(&mut self) -> &mut RunReport {
        self.report
            .get_or_insert_with(|| RunReport::new(Vec::new()))
    }

    fn emit(&mut self, event: SequencerEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }
}
