//! appgrid-ops — app and instance orchestration.
//!
//! Every state-changing operation is split in two: a synchronous half that
//! validates client input and queues a job, and the job body that drives
//! the app or instance state machine through the container engine.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ── submit ──► JobScheduler ──► job thread
//!                                               │
//!                    ┌──────────────────────────┤
//!                    ▼                          ▼
//!             Registry (redb)          ContainerEngine (docker CLI)
//!                    ▲
//!             ManifestSource (mirror) ─► ManifestStore (local copies)
//! ```

mod apps;
pub mod engine;
pub mod error;
mod instances;
pub mod manifest;
pub mod network;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ContainerEngine, ContainerSpec, DockerCli, EngineError, EngineResult};
pub use error::{OpsError, OpsResult};
pub use manifest::{
    AppManifest, DirManifestSource, ManifestError, ManifestSource, ManifestStore, VolumeMount,
    VolumeSource,
};
pub use network::Subnet;
pub use orchestrator::{
    InstanceDetails, Orchestrator, ReconcileReport, parse_app_key, parse_instance_id,
};
