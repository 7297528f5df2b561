//! Check that the external programs a plan needs are installed.

use std::path::PathBuf;

use crate::core::task::Task;
use crate::vars::Vars;
use crate::{blog_debug, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolStatus {
    pub program: String,
    /// Resolved location, `None` if not found.
    pub path: Option<PathBuf>,
}

/// Programs named by the steps of `plan`, deduplicated, in first-use order.
pub fn required_programs(plan: &[&Task], vars: &Vars) -> Vec<String> {
    let mut programs: Vec<String> = Vec::new();
    for task in plan {
        for step in &task.steps {
            for program in step.action.required_programs() {
                let program = vars.expand(&program).unwrap_or(program);
                if !programs.contains(&program) {
                    programs.push(program);
                }
            }
        }
    }
    programs
}

pub fn check(plan: &[&Task], vars: &Vars) -> Vec<ToolStatus> {
    required_programs(plan, vars)
        .into_iter()
        .map(|program| {
            let path = which::which(&program).ok();
            blog_debug!("preflight: {} -> {:?}", program, path);
            ToolStatus { program, path }
        })
        .collect()
}

/// Fail with `MissingTools` if any status has no path.
pub fn ensure_installed(statuses: &[ToolStatus]) -> Result<()> {
    let missing: Vec<String> = statuses
        .iter()
        .filter(|s| s.path.is_none())
        .map(|s| s.program.clone())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingTools(missing))
    }
}
