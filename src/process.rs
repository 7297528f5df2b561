//! Child process plumbing.
//!
//! Steps run with inherited stdio on the tokio runtime so the wait can be
//! cut short by Ctrl-C or a timeout. Enumeration commands are short and
//! captured synchronously.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use crate::util::{interruptible, with_timeout};
use crate::vars::Vars;
use crate::{blog_debug, blog_trace, Error, Result};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            ..Default::default()
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: &str) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Build from an argv list; the first element is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Validation("Command cannot be empty".to_string()))?;
        Ok(Self::new(program).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I: IntoIterator<Item = String>>(mut self, args: I) -> Self {
        self.args.extend(args);
        self
    }

    pub fn cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn vars(mut self, vars: &Vars) -> Self {
        self.envs
            .extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    fn to_std(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args).envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Run `spec` to completion with inherited stdio.
///
/// The child is killed if the wait times out or Ctrl-C arrives.
pub async fn run(spec: &CommandSpec, timeout: Option<Duration>) -> Result<()> {
    blog_debug!(
        "process::run {} cwd={:?} timeout={:?}",
        spec,
        spec.cwd,
        timeout
    );
    let mut cmd = tokio::process::Command::from(spec.to_std());
    cmd.stdin(Stdio::inherit()).kill_on_drop(true);
    let mut child = cmd.spawn()?;

    let status = interruptible(with_timeout(timeout, async {
        Ok::<_, Error>(child.wait().await?)
    }))
    .await?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            command: spec.to_string(),
            status: describe_status(status),
        })
    }
}

/// Run `spec` and return its stdout. Non-zero exit or non-UTF-8 output is an error.
pub fn capture(spec: &CommandSpec) -> Result<String> {
    blog_debug!("process::capture {}", spec);
    let output = spec.to_std().stdin(Stdio::null()).output()?;
    if !output.status.success() {
        return Err(Error::CommandFailed {
            command: spec.to_string(),
            status: format!(
                "{}: {}",
                describe_status(output.status),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    let stdout = String::from_utf8(output.stdout)
        .map_err(|e| Error::Validation(format!("`{}` printed non-UTF-8 output: {}", spec, e)))?;
    blog_trace!("capture: {} bytes", stdout.len());
    Ok(stdout)
}
