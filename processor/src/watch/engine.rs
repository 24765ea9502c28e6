use super::{WatchError, controller};
use crate::proto::UpdateConfigRequestMessage;
use crate::session::SessionHandle;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity-1 handover between a stopping manager and its successor.
///
/// The gate is primed with one token at creation, so the first configure
/// after startup never blocks waiting for a manager that does not exist; a
/// stopping manager re-inserts the token once all its controllers have
/// wound down.
struct DrainGate {
    signal: mpsc::Sender<()>,
    drained: Mutex<mpsc::Receiver<()>>,
}

impl DrainGate {
    fn new() -> Self {
        let (signal, drained) = mpsc::channel(1);
        signal.try_send(()).expect("prime the drain channel");
        Self {
            signal,
            drained: Mutex::new(drained),
        }
    }

    async fn wait(&self) {
        self.drained.lock().await.recv().await;
    }

    fn signaller(&self) -> mpsc::Sender<()> {
        self.signal.clone()
    }
}

/// Lifecycle of the dynamic controller set. At most one manager runs at a
/// time; a reconfigure stops and drains the previous manager before the new
/// controllers start.
pub struct ManagerEngine {
    session: SessionHandle,
    enabled: Arc<AtomicBool>,
    gate: DrainGate,
    running: Mutex<Option<CancellationToken>>,
}

impl ManagerEngine {
    pub fn new(session: SessionHandle, enabled: Arc<AtomicBool>) -> Self {
        Self {
            session,
            enabled,
            gate: DrainGate::new(),
            running: Mutex::new(None),
        }
    }

    pub async fn reconfigure(
        &self,
        config: UpdateConfigRequestMessage,
        parent: &CancellationToken,
    ) -> Result<(), WatchError> {
        {
            let mut running = self.running.lock().await;
            if let Some(token) = running.take() {
                println!("{}", "stopping watch manager...".yellow());
                token.cancel();
            }
        }
        self.gate.wait().await;

        let client = kube::Client::try_default()
            .await
            .map_err(WatchError::Client)?;
        let discovery = kube::discovery::Discovery::new(client.clone())
            .run()
            .await
            .map_err(WatchError::Discovery)?;

        let token = parent.child_token();
        let mut controllers = Vec::new();
        for (reconciler_name, resource) in config.resources {
            controllers.push(controller::build(
                client.clone(),
                &discovery,
                reconciler_name,
                resource,
                self.session.clone(),
                self.enabled.clone(),
                token.clone(),
            )?);
        }

        let drained = self.gate.signaller();
        tokio::spawn(async move {
            futures::future::join_all(controllers).await;
            drained.try_send(()).ok();
            println!("{}", "watch manager stopped".yellow());
        });

        *self.running.lock().await = Some(token);
        Ok(())
    }

    /// Stops a running manager and waits for its teardown. No-op when
    /// nothing runs.
    pub async fn shutdown(&self) {
        let was_running = {
            let mut running = self.running.lock().await;
            match running.take() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            }
        };
        if was_running {
            self.gate.wait().await;
        }
    }
}
