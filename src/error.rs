use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task '{task}' needs undeclared task '{prereq}'")]
    UnknownPrerequisite { task: String, prereq: String },

    #[error("Task declared twice: {0}")]
    DuplicateTask(String),

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Undefined variable: ${{{0}}}")]
    UndefinedVariable(String),

    #[error("`{command}` failed: {status}")]
    CommandFailed { command: String, status: String },

    #[error("Task '{task}' step {step} failed: {reason}")]
    StepFailed {
        task: String,
        step: usize,
        reason: String,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Interrupted")]
    Interrupted,

    #[error("Missing tools: {}", .0.join(", "))]
    MissingTools(Vec<String>),
}

impl Error {
    /// Errors that abort a run even inside a best-effort step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
