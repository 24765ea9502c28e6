use crate::proto::TaskType;
use crate::proto::task_execution_response_message::TaskState;
use thiserror::Error;

/// Task-scoped failure taxonomy. These never cross the session boundary;
/// they are folded into the task response so the control plane decides
/// whether to retry.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("key '{0}' is required but has not been provided")]
    RequiredKey(String),

    #[error("{0}")]
    NonRetryable(String),

    #[error("{0}")]
    Retryable(String),

    #[error("cannot create executor of type '{}'", .0.as_str_name())]
    CannotCreate(TaskType),
}

impl ExecutorError {
    pub fn task_state(&self) -> TaskState {
        match self {
            Self::Retryable(_) => TaskState::FailedRetryable,
            Self::CannotCreate(_) => TaskState::FailedNonChargeable,
            Self::RequiredKey(_) | Self::NonRetryable(_) => TaskState::FailedNonRetryable,
        }
    }
}
