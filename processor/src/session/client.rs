use super::transport::TransportConfig;
use crate::metadata::{BINARY_VERSION_HEADER, Metadata, SESSION_ID_HEADER};
use crate::proto::remote_work_processor_service_client::RemoteWorkProcessorServiceClient;
use crate::proto::{ClientMessage, ServerMessage};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::transport::Endpoint;
use tonic::{Code, Request, Streaming};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);
const OUTBOUND_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect to AutoPi server at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("could not start a session with the server: {0}")]
    Open(#[source] tonic::Status),

    #[error("invalid session metadata: {0}")]
    Metadata(String),

    #[error("session stream closed while sending client message")]
    SendClosed,

    #[error("error receiving server message: {0}")]
    Receive(#[source] tonic::Status),
}

/// One live bidirectional session with the control plane.
///
/// Outbound messages are serialized through `send`; the heartbeat task and
/// the reconcilers share the same path, so a client message is never torn.
pub struct SessionClient {
    outbound: Mutex<mpsc::Sender<ClientMessage>>,
    inbound: Mutex<Streaming<ServerMessage>>,
    token: CancellationToken,
    failed: AtomicBool,
}

impl SessionClient {
    pub async fn connect(
        metadata: &Metadata,
        transport: &TransportConfig,
        root: &CancellationToken,
    ) -> Result<Arc<Self>, SessionError> {
        let endpoint = metadata.endpoint();
        let connect_error = |source| SessionError::Connect {
            endpoint: endpoint.clone(),
            source,
        };

        let mut builder = Endpoint::from_shared(endpoint.clone()).map_err(connect_error)?;
        if let TransportConfig::Tls(tls) = transport {
            builder = builder.tls_config(tls.clone()).map_err(connect_error)?;
        }
        let channel = builder.connect().await.map_err(connect_error)?;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let mut request = Request::new(ReceiverStream::new(outbound_rx));
        let headers = request.metadata_mut();
        headers.insert(SESSION_ID_HEADER, ascii_value(&metadata.session_id())?);
        headers.insert(
            BINARY_VERSION_HEADER,
            ascii_value(metadata.binary_version())?,
        );

        let inbound = RemoteWorkProcessorServiceClient::new(channel)
            .session(request)
            .await
            .map_err(SessionError::Open)?
            .into_inner();

        let session = Arc::new(Self {
            outbound: Mutex::new(outbound_tx),
            inbound: Mutex::new(inbound),
            token: root.child_token(),
            failed: AtomicBool::new(false),
        });
        tokio::spawn(run_heartbeat(session.clone()));
        Ok(session)
    }

    /// Sends one client message. Sends are serialized and delivered in
    /// program order; a failure closes the session.
    pub async fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        if self.token.is_cancelled() {
            return Ok(());
        }

        let outbound = self.outbound.lock().await;
        if outbound.send(message).await.is_err() {
            self.failed.store(true, Ordering::SeqCst);
            self.close();
            return Err(SessionError::SendClosed);
        }
        Ok(())
    }

    /// Blocks until a server message arrives. `Ok(None)` means the stream
    /// ended cleanly (server EOF or local cancellation); any other failure
    /// is surfaced for the supervisor to decide on.
    pub async fn receive(&self) -> Result<Option<ServerMessage>, SessionError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.token.cancelled() => Ok(None),
            message = inbound.message() => match message {
                Ok(Some(message)) => Ok(Some(message)),
                Ok(None) => {
                    println!("{}", "server closed the session".yellow());
                    self.close();
                    Ok(None)
                }
                Err(status) if status.code() == Code::Cancelled => Ok(None),
                Err(status) => {
                    self.failed.store(true, Ordering::SeqCst);
                    self.close();
                    Err(SessionError::Receive(status))
                }
            }
        }
    }

    /// Half-closes the session: the outbound stream ends once the sender is
    /// dropped and every task holding the token winds down.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether the session was torn down by a send/receive failure rather
    /// than a clean end of stream.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

fn ascii_value(value: &str) -> Result<MetadataValue<tonic::metadata::Ascii>, SessionError> {
    value
        .parse()
        .map_err(|_| SessionError::Metadata(format!("'{value}' is not valid header material")))
}

/// Probes the session every 30 seconds until it is closed. A failing probe
/// tears the session down, which the supervisor observes on its next
/// receive.
async fn run_heartbeat(session: Arc<SessionClient>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
    ticker.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            _ = session.token.cancelled() => break,
            _ = ticker.tick() => {
                if session.send(ClientMessage::probe_session()).await.is_err() {
                    eprintln!("{}", "session heartbeat failed".red());
                    break;
                }
            }
        }
    }
}
