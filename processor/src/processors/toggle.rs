use super::{Processor, ProcessorError};
use crate::proto::ClientMessage;
use async_trait::async_trait;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct EnableProcessor {
    enabled: Arc<AtomicBool>,
}

impl EnableProcessor {
    pub fn new(enabled: Arc<AtomicBool>) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Processor for EnableProcessor {
    async fn process(&mut self) -> Result<Option<ClientMessage>, ProcessorError> {
        println!("{}", "🟢 Enabling remote work processor".green());
        self.enabled.store(true, Ordering::SeqCst);
        Ok(Some(ClientMessage::confirm_enabled()))
    }
}

pub struct DisableProcessor {
    enabled: Arc<AtomicBool>,
}

impl DisableProcessor {
    pub fn new(enabled: Arc<AtomicBool>) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Processor for DisableProcessor {
    async fn process(&mut self) -> Result<Option<ClientMessage>, ProcessorError> {
        println!("{}", "⏸️ Disabling remote work processor".yellow());
        self.enabled.store(false, Ordering::SeqCst);
        Ok(Some(ClientMessage::confirm_disabled()))
    }
}
