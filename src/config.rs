use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::vars::Vars;
use crate::{blog_debug, blog_warn, Error, Result};

pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_MASTER_COUNT: u32 = 3;
/// The installer does not support more than three control-plane nodes.
pub const MAX_MASTER_COUNT: u32 = 3;
pub const DEFAULT_STAGING_DIR: &str = "build";

pub const ENV_BRANCH: &str = "BMI_BRANCH";
pub const ENV_IMAGE: &str = "IMAGE";
pub const ENV_MASTER_COUNT: &str = "NUM_MASTERS";
pub const ENV_STAGING_DIR: &str = "BMINFRA_STAGING_DIR";
pub const ENV_STEP_TIMEOUT: &str = "BMINFRA_STEP_TIMEOUT";

/// Name of the staging directory variable exported to steps.
pub const VAR_STAGING_DIR: &str = "STAGING_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub branch: Option<String>,
    pub image: Option<String>,
    pub master_count: Option<u32>,
    pub staging_dir: Option<String>,
    pub taskfile: Option<String>,
    pub step_timeout_secs: Option<u64>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl Config {
    pub fn bminfra_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".bminfra"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::bminfra_dir()?.join("bminfra.toml"))
    }

    /// Load the user config file and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        blog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            blog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        blog_debug!(
            "Config loaded: branch={:?}, image={:?}, master_count={:?}, staging_dir={:?}",
            config.branch,
            config.image,
            config.master_count,
            config.staging_dir
        );
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`. Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(branch) = get(ENV_BRANCH) {
            self.branch = Some(branch);
        }
        if let Some(image) = get(ENV_IMAGE) {
            self.image = Some(image);
        }
        if let Some(count) = get(ENV_MASTER_COUNT) {
            let parsed = count.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("{} must be a number, got '{}'", ENV_MASTER_COUNT, count))
            })?;
            self.master_count = Some(parsed);
        }
        if let Some(dir) = get(ENV_STAGING_DIR) {
            self.staging_dir = Some(dir);
        }
        if let Some(secs) = get(ENV_STEP_TIMEOUT) {
            let parsed = secs.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{} must be seconds, got '{}'", ENV_STEP_TIMEOUT, secs))
            })?;
            self.step_timeout_secs = Some(parsed);
        }
        Ok(())
    }

    pub fn effective_branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    pub fn effective_image(&self) -> &str {
        self.image.as_deref().unwrap_or("")
    }

    /// Requested master count, validated and capped at [`MAX_MASTER_COUNT`].
    pub fn effective_master_count(&self) -> Result<u32> {
        let requested = self.master_count.unwrap_or(DEFAULT_MASTER_COUNT);
        if requested == 0 {
            return Err(Error::Config("master count must be at least 1".to_string()));
        }
        if requested > MAX_MASTER_COUNT {
            blog_warn!(
                "master count {} exceeds the supported maximum, using {}",
                requested,
                MAX_MASTER_COUNT
            );
        }
        Ok(requested.min(MAX_MASTER_COUNT))
    }

    /// Staging directory, resolved against `workdir` when relative.
    pub fn staging_dir(&self, workdir: &Path) -> PathBuf {
        let dir = expand_tilde(self.staging_dir.as_deref().unwrap_or(DEFAULT_STAGING_DIR));
        if dir.is_absolute() {
            dir
        } else {
            workdir.join(dir)
        }
    }

    pub fn taskfile_path(&self) -> Option<PathBuf> {
        self.taskfile.as_deref().map(expand_tilde)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Variables every step sees, before taskfile defaults are layered on.
    pub fn to_vars(&self, workdir: &Path) -> Result<Vars> {
        let mut vars = Vars::new();
        vars.set(ENV_BRANCH, self.effective_branch());
        vars.set(ENV_IMAGE, self.effective_image());
        vars.set(ENV_MASTER_COUNT, self.effective_master_count()?.to_string());
        vars.set(
            VAR_STAGING_DIR,
            self.staging_dir(workdir).display().to_string(),
        );
        for (key, value) in &self.vars {
            vars.set(key, value);
        }
        Ok(vars)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
