mod config;
mod task;
mod toggle;

use crate::proto::server_message::Body;
use crate::proto::{ClientMessage, ServerMessage};
use crate::watch::{ManagerEngine, WatchError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("failed to apply watch configuration: {0}")]
    WatchConfig(#[source] WatchError),
}

/// One-shot handler for a single server message. `Ok(None)` means no reply.
#[async_trait]
pub trait Processor: Send {
    async fn process(&mut self) -> Result<Option<ClientMessage>, ProcessorError>;
}

/// Builds a processor per inbound server message. Holds the handles the
/// processors share: the process-wide enabled flag, the watch manager engine
/// and the standalone switch.
pub struct ProcessorFactory {
    enabled: Arc<AtomicBool>,
    engine: Arc<ManagerEngine>,
    standalone: bool,
    root: CancellationToken,
}

impl ProcessorFactory {
    pub fn new(
        enabled: Arc<AtomicBool>,
        engine: Arc<ManagerEngine>,
        standalone: bool,
        root: CancellationToken,
    ) -> Self {
        Self {
            enabled,
            engine,
            standalone,
            root,
        }
    }

    /// `None` for message variants this processor does not understand; the
    /// caller logs and skips them without ending the session.
    pub fn create(&self, message: ServerMessage) -> Option<Box<dyn Processor>> {
        match message.body? {
            Body::TaskExecutionRequest(request) => Some(Box::new(task::RemoteTaskProcessor::new(
                request,
                self.enabled.clone(),
            ))),
            Body::UpdateConfigRequest(request) => {
                Some(Box::new(config::UpdateWatchConfigProcessor::new(
                    request,
                    self.enabled.clone(),
                    self.engine.clone(),
                    self.standalone,
                    self.root.clone(),
                )))
            }
            Body::EnableRequest(_) => Some(Box::new(toggle::EnableProcessor::new(
                self.enabled.clone(),
            ))),
            Body::DisableRequest(_) => Some(Box::new(toggle::DisableProcessor::new(
                self.enabled.clone(),
            ))),
        }
    }
}
