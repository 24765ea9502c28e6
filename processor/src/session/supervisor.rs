use super::transport::TransportConfig;
use super::{SessionClient, SessionError, SessionHandle};
use crate::metadata::Metadata;
use crate::processors::ProcessorFactory;
use crate::watch::ManagerEngine;
use anyhow::anyhow;
use owo_colors::OwoColorize;
use rwp_common::retry::RetryConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

enum SessionOutcome {
    /// Clean server EOF: reconnect without consuming an attempt.
    ServerClosed,
    /// Connect, send or receive failure: reconnect after a backoff.
    Lost(SessionError),
    /// Root cancellation observed mid-session.
    Cancelled,
    /// Unrecoverable processing failure: drain and terminate non-zero.
    Fatal(anyhow::Error),
}

/// Ties process termination signals to the supervisor: the first SIGINT or
/// SIGTERM cancels the root token, which moves the state machine into DRAIN
/// on its next turn. A second signal is not handled specially; teardown is
/// bounded by the manager drain.
pub fn drain_on_termination_signal(root: &CancellationToken) {
    let root = root.clone();
    tokio::spawn(async move {
        let signal = termination_signal().await;
        eprintln!(
            "{}",
            format!("received {signal}, draining the remote work processor").red()
        );
        root.cancel();
    });
}

#[cfg(unix)]
async fn termination_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt =
        signal(SignalKind::interrupt()).expect("failed to install the SIGINT handler");
    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install the SIGTERM handler");

    tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> &'static str {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install the Ctrl+C handler");
    "Ctrl+C"
}

/// Top-level state machine: INIT-PENDING -> RUNNING -> DRAIN -> TERMINATE.
///
/// A single-slot retry channel, primed with one token, gates connection
/// attempts; the token is re-inserted immediately on a clean server EOF and
/// after the backoff delay on a failure.
pub struct Supervisor {
    metadata: Metadata,
    transport: TransportConfig,
    retry: RetryConfig,
    factory: ProcessorFactory,
    handle: SessionHandle,
    engine: Arc<ManagerEngine>,
    root: CancellationToken,
}

impl Supervisor {
    pub fn new(
        metadata: Metadata,
        transport: TransportConfig,
        retry: RetryConfig,
        factory: ProcessorFactory,
        handle: SessionHandle,
        engine: Arc<ManagerEngine>,
        root: CancellationToken,
    ) -> Self {
        Self {
            metadata,
            transport,
            retry,
            factory,
            handle,
            engine,
            root,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let (retry_tx, mut retry_rx) = mpsc::channel::<()>(1);
        retry_tx.try_send(()).expect("prime the retry channel");
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;

                _ = self.root.cancelled() => {
                    return self.drain().await;
                }

                Some(()) = retry_rx.recv() => {
                    match self.run_session().await {
                        SessionOutcome::ServerClosed => {
                            // Graceful server restart: no attempt consumed.
                            retry_tx.try_send(()).ok();
                        }
                        SessionOutcome::Lost(err) => {
                            attempt += 1;
                            eprintln!(
                                "{}",
                                format!("session lost (attempt {attempt}): {err}").red()
                            );
                            if self.retry.exhausted(attempt) {
                                return Err(anyhow!(
                                    "giving up on the AutoPi session after {attempt} attempts: {err}"
                                ));
                            }
                            let delay = self.retry.delay_for(attempt);
                            println!(
                                "{}",
                                format!("retrying session in {delay:?}").yellow()
                            );
                            let tx = retry_tx.clone();
                            let cancelled = self.root.clone();
                            tokio::spawn(async move {
                                tokio::select! {
                                    _ = cancelled.cancelled() => {}
                                    _ = tokio::time::sleep(delay) => {
                                        tx.try_send(()).ok();
                                    }
                                }
                            });
                        }
                        SessionOutcome::Cancelled => {
                            // The next loop turn observes the root token.
                        }
                        SessionOutcome::Fatal(err) => {
                            self.root.cancel();
                            self.engine.shutdown().await;
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// One RUNNING phase: connect, then the receive/dispatch/reply loop.
    async fn run_session(&mut self) -> SessionOutcome {
        let session =
            match SessionClient::connect(&self.metadata, &self.transport, &self.root).await {
                Ok(session) => session,
                Err(err) => return SessionOutcome::Lost(err),
            };
        println!("{}", "⚙️ Session established".green());
        self.handle.bind(session.clone());

        let outcome = self.serve(&session).await;
        self.handle.clear();
        outcome
    }

    async fn serve(&mut self, session: &Arc<SessionClient>) -> SessionOutcome {
        loop {
            if self.root.is_cancelled() {
                session.close();
                return SessionOutcome::Cancelled;
            }

            match session.receive().await {
                Ok(Some(message)) => {
                    let Some(mut processor) = self.factory.create(message) else {
                        eprintln!(
                            "{}",
                            "unknown server message variant, skipping".yellow()
                        );
                        continue;
                    };
                    match processor.process().await {
                        Ok(Some(reply)) => {
                            if let Err(err) = session.send(reply).await {
                                return SessionOutcome::Lost(err);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            // Only manager wiring failures reach this arm;
                            // everything task-scoped was already folded into
                            // the reply.
                            session.close();
                            return SessionOutcome::Fatal(err.into());
                        }
                    }
                }
                Ok(None) => {
                    return if self.root.is_cancelled() {
                        SessionOutcome::Cancelled
                    } else if session.failed() {
                        SessionOutcome::Lost(SessionError::SendClosed)
                    } else {
                        SessionOutcome::ServerClosed
                    };
                }
                Err(err) => return SessionOutcome::Lost(err),
            }
        }
    }

    /// DRAIN: let the watch manager wind down before terminating.
    async fn drain(&mut self) -> anyhow::Result<()> {
        println!("{}", "draining before shutdown...".yellow());
        self.engine.shutdown().await;
        println!("{}", "remote work processor stopped".green());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::remote_work_processor_service_server::{
        RemoteWorkProcessorService, RemoteWorkProcessorServiceServer,
    };
    use crate::proto::server_message::Body;
    use crate::proto::{
        ClientMessage, DisableMessage, EnableMessage, ServerMessage, TaskExecutionRequestMessage,
        TaskType, client_message,
    };
    use futures::StreamExt;
    use rwp_common::retry::RetryStrategy;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::pin::Pin;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::{Mutex, mpsc};
    use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
    use tonic::{Request, Response, Status, Streaming};

    /// Control-plane stand-in: hands one scripted message stream to each
    /// session in turn and forwards everything the client sends back to the
    /// test.
    struct MockAutoPi {
        scripts: Mutex<Vec<mpsc::Receiver<ServerMessage>>>,
        received: mpsc::Sender<ClientMessage>,
    }

    #[tonic::async_trait]
    impl RemoteWorkProcessorService for MockAutoPi {
        type SessionStream =
            Pin<Box<dyn futures::Stream<Item = Result<ServerMessage, Status>> + Send>>;

        async fn session(
            &self,
            request: Request<Streaming<ClientMessage>>,
        ) -> Result<Response<Self::SessionStream>, Status> {
            let mut inbound = request.into_inner();
            let received = self.received.clone();
            tokio::spawn(async move {
                while let Ok(Some(message)) = inbound.message().await {
                    let _ = received.send(message).await;
                }
            });

            let mut scripts = self.scripts.lock().await;
            if scripts.is_empty() {
                return Err(Status::resource_exhausted("mock script exhausted"));
            }
            let script = scripts.remove(0);
            Ok(Response::new(Box::pin(ReceiverStream::new(script).map(Ok))))
        }
    }

    async fn spawn_mock(
        scripts: Vec<mpsc::Receiver<ServerMessage>>,
    ) -> (SocketAddr, mpsc::Receiver<ClientMessage>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received_rx) = mpsc::channel(32);
        let mock = MockAutoPi {
            scripts: Mutex::new(scripts),
            received: received_tx,
        };
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(RemoteWorkProcessorServiceServer::new(mock))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .ok();
        });
        (addr, received_rx)
    }

    fn supervisor(addr: SocketAddr, retry: RetryConfig, root: CancellationToken) -> Supervisor {
        let enabled = Arc::new(AtomicBool::new(true));
        let handle = SessionHandle::new();
        let engine = Arc::new(ManagerEngine::new(handle.clone(), enabled.clone()));
        let factory = ProcessorFactory::new(enabled, engine.clone(), false, root.clone());
        Supervisor::new(
            Metadata::for_tests("127.0.0.1", addr.port()),
            TransportConfig::Plaintext,
            retry,
            factory,
            handle,
            engine,
            root,
        )
    }

    fn void_task(execution_id: u64) -> ServerMessage {
        ServerMessage {
            body: Some(Body::TaskExecutionRequest(TaskExecutionRequestMessage {
                execution_id,
                execution_version: 1,
                r#type: TaskType::Void.into(),
                input: HashMap::from([("message".to_string(), "ping".to_string())]),
                store: HashMap::new(),
            })),
        }
    }

    async fn script_send(tx: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
        tx.send(message).await.unwrap();
    }

    async fn next_reply(received: &mut mpsc::Receiver<ClientMessage>) -> client_message::Body {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), received.recv())
                .await
                .expect("reply in time")
                .expect("stream open");
            match message.body.expect("reply carries a body") {
                // Heartbeats interleave with replies; skip them.
                client_message::Body::ProbeSession(_) => continue,
                body => return body,
            }
        }
    }

    #[tokio::test]
    async fn replies_follow_receive_order_and_disable_gates_tasks() {
        let (script_tx, script_rx) = mpsc::channel(8);
        let (addr, mut received) = spawn_mock(vec![script_rx]).await;
        let root = CancellationToken::new();
        let supervisor = supervisor(
            addr,
            RetryConfig::new(Duration::from_millis(10), RetryStrategy::Fixed, 3),
            root.clone(),
        );
        let run = tokio::spawn(supervisor.run());

        script_tx
            .send(ServerMessage {
                body: Some(Body::DisableRequest(DisableMessage {})),
            })
            .await
            .unwrap();
        // Dropped silently while disabled.
        script_tx.send(void_task(1)).await.unwrap();
        script_tx
            .send(ServerMessage {
                body: Some(Body::EnableRequest(EnableMessage {})),
            })
            .await
            .unwrap();
        script_tx.send(void_task(2)).await.unwrap();

        assert!(matches!(
            next_reply(&mut received).await,
            client_message::Body::ConfirmDisabled(_)
        ));
        assert!(matches!(
            next_reply(&mut received).await,
            client_message::Body::ConfirmEnabled(_)
        ));
        match next_reply(&mut received).await {
            client_message::Body::TaskExecutionResponse(response) => {
                assert_eq!(response.execution_id, 2);
                assert_eq!(
                    response.output.get("message").map(String::as_str),
                    Some("ping")
                );
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        root.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("supervisor stops")
            .unwrap()
            .expect("clean drain");
    }

    #[tokio::test]
    async fn unknown_variants_are_skipped_without_ending_the_session() {
        let (script_tx, script_rx) = mpsc::channel(8);
        let (addr, mut received) = spawn_mock(vec![script_rx]).await;
        let root = CancellationToken::new();
        let supervisor = supervisor(
            addr,
            RetryConfig::new(Duration::from_millis(10), RetryStrategy::Fixed, 3),
            root.clone(),
        );
        let run = tokio::spawn(supervisor.run());

        script_tx.send(ServerMessage { body: None }).await.unwrap();
        script_tx.send(void_task(7)).await.unwrap();

        match next_reply(&mut received).await {
            client_message::Body::TaskExecutionResponse(response) => {
                assert_eq!(response.execution_id, 7);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        root.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("supervisor stops")
            .unwrap()
            .expect("clean drain");
    }

    #[tokio::test]
    async fn server_eof_reconnects_without_consuming_an_attempt() {
        let (first_tx, first_rx) = mpsc::channel(8);
        let (second_tx, second_rx) = mpsc::channel(8);
        let (addr, mut received) = spawn_mock(vec![first_rx, second_rx]).await;
        let root = CancellationToken::new();
        // Budget of 1: any consumed attempt would terminate the supervisor.
        let supervisor = supervisor(
            addr,
            RetryConfig::new(Duration::from_millis(10), RetryStrategy::Fixed, 1),
            root.clone(),
        );
        let run = tokio::spawn(supervisor.run());

        script_send(&first_tx, void_task(1)).await;
        match next_reply(&mut received).await {
            client_message::Body::TaskExecutionResponse(response) => {
                assert_eq!(response.execution_id, 1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Clean server EOF on the first session.
        drop(first_tx);

        script_send(&second_tx, void_task(2)).await;
        match next_reply(&mut received).await {
            client_message::Body::TaskExecutionResponse(response) => {
                assert_eq!(response.execution_id, 2);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        root.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("supervisor stops")
            .unwrap()
            .expect("EOF must not consume the attempt budget");
    }

    #[tokio::test]
    async fn connect_failures_exhaust_the_attempt_budget() {
        // Grab a port nobody is listening on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let root = CancellationToken::new();
        let supervisor = supervisor(
            addr,
            RetryConfig::new(Duration::from_millis(5), RetryStrategy::Fixed, 2),
            root,
        );
        let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .expect("terminates before the timeout");
        let err = result.expect_err("attempt budget exhausted");
        assert!(err.to_string().contains("after 2 attempts"));
    }
}
