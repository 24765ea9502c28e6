mod context;
mod error;
pub mod http;
pub mod kubernetes;
mod result;

pub use context::ExecutionContext;
pub use error::ExecutorError;
pub use result::ExecutorResult;

use crate::proto::TaskType;
use std::collections::HashMap;

const MESSAGE_KEY: &str = "message";

/// Dispatches one task to its executor. Unknown task types are reported as
/// non-chargeable, without retry.
pub async fn execute(task_type: TaskType, context: &ExecutionContext) -> ExecutorResult {
    match task_type {
        TaskType::Void => execute_void(context),
        TaskType::Http => http::HttpExecutor::new().execute(context).await,
        TaskType::KubernetesApiRequest => kubernetes::execute(context).await,
        TaskType::Unspecified => ExecutorResult::failed(&ExecutorError::CannotCreate(task_type)),
    }
}

fn execute_void(context: &ExecutionContext) -> ExecutorResult {
    let mut output = HashMap::new();
    output.insert(MESSAGE_KEY.to_string(), context.get_string(MESSAGE_KEY));
    ExecutorResult::completed(output)
}
