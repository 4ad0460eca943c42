//! Orchestration error types.

use appgrid_core::{AppKey, InstanceId, InstanceStatus};
use thiserror::Error;

use crate::engine::EngineError;
use crate::manifest::ManifestError;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("invalid app key: {0}")]
    InvalidAppKey(String),

    #[error("invalid instance id: {0}")]
    InvalidInstanceId(String),

    #[error(transparent)]
    InvalidManifest(#[from] ManifestError),

    #[error("app {0} is not installed")]
    AppNotInstalled(AppKey),

    #[error("instance {0} does not exist")]
    InstanceNotFound(InstanceId),

    #[error("instance {0} cannot be started in state {1}")]
    InstanceNotRunnable(InstanceId, InstanceStatus),

    #[error("no free address left in network {0}")]
    NetworkExhausted(String),

    #[error("refusing to remove system app {0}")]
    SystemApp(AppKey),

    #[error("illegal transition of {subject} from {from} to {to}")]
    IllegalTransition {
        subject: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("container engine: {0}")]
    Engine(#[from] EngineError),

    #[error("registry: {0}")]
    State(#[from] appgrid_state::StateError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OpsResult<T> = Result<T, OpsError>;
