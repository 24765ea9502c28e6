use super::{Processor, ProcessorError};
use crate::executors::{self, ExecutionContext};
use crate::proto::{ClientMessage, TaskExecutionRequestMessage, TaskExecutionResponseMessage};
use async_trait::async_trait;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Executes one remotely submitted task and folds the outcome into a
/// `TaskExecutionResponse`. Task failures never escape as processor errors;
/// the control plane owns the retry semantics.
pub struct RemoteTaskProcessor {
    request: TaskExecutionRequestMessage,
    enabled: Arc<AtomicBool>,
}

impl RemoteTaskProcessor {
    pub fn new(request: TaskExecutionRequestMessage, enabled: Arc<AtomicBool>) -> Self {
        Self { request, enabled }
    }
}

#[async_trait]
impl Processor for RemoteTaskProcessor {
    async fn process(&mut self) -> Result<Option<ClientMessage>, ProcessorError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let task_type = self.request.r#type();
        println!(
            "{}",
            format!(
                "⚙️ Executing task {} ({})",
                self.request.execution_id,
                task_type.as_str_name()
            )
            .cyan()
        );

        let context = ExecutionContext::new(
            self.request.input.clone(),
            self.request.store.clone().into_iter().collect(),
        );
        let result = executors::execute(task_type, &context).await;

        Ok(Some(ClientMessage::task_execution_response(
            TaskExecutionResponseMessage {
                execution_id: self.request.execution_id,
                execution_version: self.request.execution_version,
                state: result.status.into(),
                output: result.output.into_iter().collect(),
                store: context.store().snapshot().into_iter().collect(),
                error: result.error,
                r#type: self.request.r#type,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::TaskType;
    use crate::proto::client_message::Body;
    use crate::proto::task_execution_response_message::TaskState;
    use std::collections::HashMap;

    fn void_request(store: HashMap<String, String>) -> TaskExecutionRequestMessage {
        TaskExecutionRequestMessage {
            execution_id: 7,
            execution_version: 2,
            r#type: TaskType::Void.into(),
            input: HashMap::from([("message".to_string(), "ping".to_string())]),
            store,
        }
    }

    fn response_of(reply: ClientMessage) -> TaskExecutionResponseMessage {
        match reply.body {
            Some(Body::TaskExecutionResponse(response)) => response,
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn void_task_echoes_the_message() {
        let mut processor =
            RemoteTaskProcessor::new(void_request(HashMap::new()), Arc::new(AtomicBool::new(true)));
        let response = response_of(processor.process().await.unwrap().unwrap());
        assert_eq!(response.execution_id, 7);
        assert_eq!(response.execution_version, 2);
        assert_eq!(response.state(), TaskState::Completed);
        assert_eq!(response.output.get("message").map(String::as_str), Some("ping"));
        assert!(response.error.is_empty());
    }

    #[tokio::test]
    async fn store_is_echoed_back_untouched_for_plain_tasks() {
        let store = HashMap::from([("cached".to_string(), "entry".to_string())]);
        let mut processor =
            RemoteTaskProcessor::new(void_request(store.clone()), Arc::new(AtomicBool::new(true)));
        let response = response_of(processor.process().await.unwrap().unwrap());
        assert_eq!(response.store, store);
    }

    #[tokio::test]
    async fn disabled_processor_produces_no_reply() {
        let mut processor =
            RemoteTaskProcessor::new(void_request(HashMap::new()), Arc::new(AtomicBool::new(false)));
        assert!(processor.process().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsupported_task_type_is_not_chargeable() {
        let mut request = void_request(HashMap::new());
        request.r#type = TaskType::Unspecified.into();
        let mut processor = RemoteTaskProcessor::new(request, Arc::new(AtomicBool::new(true)));
        let response = response_of(processor.process().await.unwrap().unwrap());
        assert_eq!(response.state(), TaskState::FailedNonChargeable);
        assert!(response.error.contains("cannot create executor"));
    }
}
