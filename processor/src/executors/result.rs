use super::error::ExecutorError;
use crate::proto::task_execution_response_message::TaskState;
use std::collections::HashMap;

/// Coarse outcome of one task execution.
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    pub output: HashMap<String, String>,
    pub status: TaskState,
    pub error: String,
}

impl ExecutorResult {
    pub fn completed(output: HashMap<String, String>) -> Self {
        Self {
            output,
            status: TaskState::Completed,
            error: String::new(),
        }
    }

    pub fn failed(err: &ExecutorError) -> Self {
        Self {
            output: HashMap::new(),
            status: err.task_state(),
            error: err.to_string(),
        }
    }

    /// A failure that still carries the (partial) output, e.g. an HTTP
    /// response outside the success set.
    pub fn failed_with_output(
        output: HashMap<String, String>,
        status: TaskState,
        error: String,
    ) -> Self {
        Self {
            output,
            status,
            error,
        }
    }
}
