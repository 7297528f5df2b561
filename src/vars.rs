//! Variables shared by every step of a run.
//!
//! Values are exported to child processes as environment variables and
//! substituted into `${NAME}` references inside non-shell step fields.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::{Error, Result};

static VAR_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());
static WHOLE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\{[A-Za-z_][A-Za-z0-9_]*\}$").unwrap());

/// True when `input` is exactly one `${NAME}` reference and nothing else.
pub fn is_single_reference(input: &str) -> bool {
    WHOLE_REF_RE.is_match(input)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Vars(BTreeMap<String, String>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer default values under the existing ones.
    ///
    /// A key already set keeps its value; otherwise `env` wins over the
    /// default. Defaults may reference variables set earlier.
    pub fn add_defaults<'a, I, F>(&mut self, defaults: I, env: F) -> Result<()>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
        F: Fn(&str) -> Option<String>,
    {
        for (key, default) in defaults {
            if self.0.contains_key(key) {
                continue;
            }
            let value = match env(key) {
                Some(v) => v,
                None => self.expand(default)?,
            };
            self.0.insert(key.clone(), value);
        }
        Ok(())
    }

    /// Substitute `${NAME}` references. Unknown names fall back to the
    /// process environment before failing.
    pub fn expand(&self, input: &str) -> Result<String> {
        self.expand_with(input, |key| std::env::var(key).ok())
    }

    pub fn expand_with<F>(&self, input: &str, env: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = None;
        let out = VAR_REF_RE.replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            match self.get(name).map(str::to_string).or_else(|| env(name)) {
                Some(value) => value,
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(Error::UndefinedVariable(name)),
            None => Ok(out.into_owned()),
        }
    }
}
