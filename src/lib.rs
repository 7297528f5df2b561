pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod git;
pub mod guard;
pub mod log;
pub mod preflight;
pub mod process;
pub mod sequencer;
pub mod staging;
pub mod util;
pub mod vars;

pub use error::{Error, Result};
pub use sequencer::{RunReport, Sequencer, SequencerEvent};
