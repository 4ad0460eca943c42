//! appgrid-core — shared vocabulary of the AppGrid daemon.
//!
//! Status state machines for apps, instances and jobs, the identity types
//! that key the registry, and the daemon configuration file.

pub mod app_key;
pub mod config;
pub mod instance_id;
pub mod status;

pub use app_key::{AppKey, AppName};
pub use config::{DaemonConfig, EngineConfig};
pub use instance_id::{InstanceId, InvalidInstanceId, JobId};
pub use status::{AppStatus, InstanceStatus, JobStatus};
