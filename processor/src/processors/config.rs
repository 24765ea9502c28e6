use super::{Processor, ProcessorError};
use crate::proto::{ClientMessage, UpdateConfigRequestMessage};
use crate::watch::ManagerEngine;
use async_trait::async_trait;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Applies a new watch configuration: a running manager is stopped and
/// drained before the replacement is started, so two managers never watch
/// the cluster at the same time.
pub struct UpdateWatchConfigProcessor {
    request: UpdateConfigRequestMessage,
    enabled: Arc<AtomicBool>,
    engine: Arc<ManagerEngine>,
    standalone: bool,
    root: CancellationToken,
}

impl UpdateWatchConfigProcessor {
    pub fn new(
        request: UpdateConfigRequestMessage,
        enabled: Arc<AtomicBool>,
        engine: Arc<ManagerEngine>,
        standalone: bool,
        root: CancellationToken,
    ) -> Self {
        Self {
            request,
            enabled,
            engine,
            standalone,
            root,
        }
    }
}

#[async_trait]
impl Processor for UpdateWatchConfigProcessor {
    async fn process(&mut self) -> Result<Option<ClientMessage>, ProcessorError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let config_version = self.request.config_version;
        if self.request.resources.is_empty() {
            return Ok(Some(ClientMessage::confirm_config_update(config_version)));
        }

        if self.standalone {
            eprintln!(
                "{}",
                "refusing watch configuration in standalone mode".yellow()
            );
            return Ok(None);
        }

        println!(
            "{}",
            format!(
                "🌱 Applying watch configuration v{config_version} ({} resources)",
                self.request.resources.len()
            )
            .green()
        );
        self.engine
            .reconfigure(std::mem::take(&mut self.request), &self.root)
            .await
            .map_err(ProcessorError::WatchConfig)?;

        Ok(Some(ClientMessage::confirm_config_update(config_version)))
    }
}
