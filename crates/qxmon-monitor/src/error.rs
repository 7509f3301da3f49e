//! Monitor error types.

use qxmon_core::TaskId;
use thiserror::Error;

/// Registration errors.
///
/// These only describe whether a task was accepted. Task outcomes are
/// delivered through the task's callbacks, never as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// A task with this id is still pending.
    #[error("Task already pending: {0}")]
    DuplicateTask(TaskId),

    #[error("Monitor is shutting down")]
    ShuttingDown,

    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
