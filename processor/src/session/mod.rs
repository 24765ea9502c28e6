mod client;
mod supervisor;
pub mod transport;

pub use client::{SessionClient, SessionError};
pub use supervisor::{Supervisor, drain_on_termination_signal};

use crate::proto::ClientMessage;
use owo_colors::OwoColorize;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared slot holding the currently bound session, if any.
///
/// Sessions come and go as the supervisor reconnects while the watch manager
/// keeps running, so reconcilers send through this handle instead of holding
/// a session directly. With no session bound, messages are dropped; the
/// control plane re-learns the watched state from the periodic reconciles
/// once a session is back.
#[derive(Clone, Default)]
pub struct SessionHandle {
    current: Arc<RwLock<Option<Arc<SessionClient>>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, session: Arc<SessionClient>) {
        *self.current.write() = Some(session);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    pub async fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        let session = self.current.read().clone();
        match session {
            Some(session) => session.send(message).await,
            None => {
                eprintln!("{}", "no active session, dropping client message".yellow());
                Ok(())
            }
        }
    }
}
