use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use rwp_common::retry::RetryConfig;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

mod args;
mod executors;
mod metadata;
mod processors;
mod session;
mod watch;

pub mod proto {
    tonic::include_proto!("autopilot.remote.work.processor.v1");

    use client_message::Body;

    impl ClientMessage {
        pub fn probe_session() -> Self {
            Self {
                body: Some(Body::ProbeSession(ProbeSessionMessage {})),
            }
        }

        pub fn confirm_enabled() -> Self {
            Self {
                body: Some(Body::ConfirmEnabled(ConfirmEnabledMessage {})),
            }
        }

        pub fn confirm_disabled() -> Self {
            Self {
                body: Some(Body::ConfirmDisabled(ConfirmDisabledMessage {})),
            }
        }

        pub fn confirm_config_update(config_version: u64) -> Self {
            Self {
                body: Some(Body::ConfirmConfigUpdate(ConfirmConfigUpdateMessage {
                    config_version,
                })),
            }
        }

        pub fn reconcile_event(event: ReconcileEventMessage) -> Self {
            Self {
                body: Some(Body::ReconcileEvent(event)),
            }
        }

        pub fn task_execution_response(response: TaskExecutionResponseMessage) -> Self {
            Self {
                body: Some(Body::TaskExecutionResponse(response)),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = args::Options::parse();
    let metadata = metadata::Metadata::load(&opts).context("failed to load session metadata")?;
    let transport = session::transport::TransportConfig::load(opts.standalone_mode)
        .context("failed to load transport credentials")?;

    let root = CancellationToken::new();
    session::drain_on_termination_signal(&root);

    let enabled = Arc::new(AtomicBool::new(true));
    let handle = session::SessionHandle::new();
    let engine = Arc::new(watch::ManagerEngine::new(handle.clone(), enabled.clone()));
    let factory = processors::ProcessorFactory::new(
        enabled,
        engine.clone(),
        opts.standalone_mode,
        root.clone(),
    );

    println!(
        "{} {}",
        "🚀 Starting remote work processor".green(),
        metadata.session_id().green(),
    );

    let retry = RetryConfig::new(opts.retry_interval, opts.retry_strategy, opts.conn_retries);
    session::Supervisor::new(metadata, transport, retry, factory, handle, engine, root)
        .run()
        .await
}
