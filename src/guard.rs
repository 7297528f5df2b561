//! Singleton guard for side-effecting initialization.
//!
//! Before provisioning a named resource (the minikube VM profile), the
//! guard asks the platform which resources already exist and skips the
//! provisioning action when the name is listed. Nothing is remembered
//! between runs: the platform's listing is the only state consulted.
//!
//! There is no locking. Two invocations racing on the same name may both
//! provision it.

use regex::Regex;

use crate::process::{self, CommandSpec};
use crate::{blog, blog_trace, blog_warn, Result};

/// Source of existing resource names.
pub trait ResourceLister {
    fn list(&self) -> Result<Vec<String>>;
}

impl<F> ResourceLister for F
where
    F: Fn() -> Result<Vec<String>>,
{
    fn list(&self) -> Result<Vec<String>> {
        self()
    }
}

/// Lists resources by running a command and reading one name per line.
pub struct CommandLister {
    command: CommandSpec,
    pattern: Option<Regex>,
}

impl CommandLister {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            pattern: None,
        }
    }

    /// Extract names with the first capture group of `pattern`; lines that
    /// do not match are ignored.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn parse(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .filter_map(|line| match &self.pattern {
                Some(re) => re
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string()),
                None => Some(line.trim().to_string()),
            })
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl ResourceLister for CommandLister {
    fn list(&self) -> Result<Vec<String>> {
        let output = process::capture(&self.command)?;
        blog_trace!("CommandLister output: {:?}", output);
        Ok(self.parse(&output))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    AlreadyPresent,
    Initialized,
}

pub struct SingletonGuard<L> {
    lister: L,
}

impl<L: ResourceLister> SingletonGuard<L> {
    pub fn new(lister: L) -> Self {
        Self { lister }
    }

    /// Whether `name` is currently listed.
    ///
    /// A failed enumeration counts as "not listed".
    pub fn exists(&self, name: &str) -> bool {
        match self.lister.list() {
            Ok(names) => names.iter().any(|n| n == name),
            Err(e) => {
                blog_warn!(
                    "Listing resources failed ({}), assuming '{}' does not exist",
                    e,
                    name
                );
                false
            }
        }
    }

    /// Run `init` unless `name` already exists.
    pub fn ensure<F>(&self, name: &str, init: F) -> Result<GuardOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        if self.exists(name) {
            blog!("Resource '{}' already exists, skipping creation", name);
            return Ok(GuardOutcome::AlreadyPresent);
        }
        blog!("Resource '{}' not found, creating", name);
        init()?;
        Ok(GuardOutcome::Initialized)
    }
}
