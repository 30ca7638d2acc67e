//! Error type of the motion crate.

use bold_cm730::{CommError, LinkError};
use bold_common::config::ConfigError;
use thiserror::Error;

use crate::cycle::CycleError;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Motion loop already running")]
    AlreadyRunning,

    #[error("Motion loop not running")]
    NotRunning,

    #[error("Lifecycle transition rejected: {0}")]
    Rejected(&'static str),

    #[error("Failed to spawn motion thread: {0}")]
    ThreadSpawn(String),

    #[error("Motion thread panicked")]
    ThreadPanicked,

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Bus error: {0}")]
    Comm(#[from] CommError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
