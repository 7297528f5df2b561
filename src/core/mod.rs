//! Task declarations and the dependency graph that orders them.

pub mod dag;
pub mod task;
pub mod taskfile;

pub use dag::TaskGraph;
pub use task::{Action, Step, Task, TaskStatus};
pub use taskfile::Taskfile;
