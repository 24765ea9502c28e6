mod controller;
mod engine;
mod selector;

pub use engine::ManagerEngine;
pub use selector::{FieldSelector, LabelSelector, Selector};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create Kubernetes client: {0}")]
    Client(#[source] kube::Error),

    #[error("failed to run API discovery: {0}")]
    Discovery(#[source] kube::Error),

    #[error("cannot resolve '{0}' to a served resource")]
    UnknownKind(String),

    #[error("Kubernetes reported error: {0}")]
    Kube(#[from] kube::Error),
}
