//! appgrid-jobs — serialized background job execution.
//!
//! Every state-changing daemon operation runs as a job. Jobs are queued in
//! submission order and executed strictly one at a time, each on its own
//! named OS thread, while clients poll their progress by id.
//!
//! # Architecture
//!
//! ```text
//! JobScheduler (Clone)
//!   ├── mpsc queue ──► worker loop (tokio task)
//!   │                    └── thread "job_<id>" per job, joined before the next
//!   └── progress registry: JobId → Progress (Arc<Mutex<JobProgress>>)
//! ```
//!
//! The worker loop and every pending `wait_for` stop when the shutdown
//! `watch` channel flips to `true`.

pub mod error;
pub mod job;
pub mod progress;
pub mod scheduler;

pub use error::{JobsError, JobsResult};
pub use job::{CurrentStep, Job, JobProgress, JobResult};
pub use progress::Progress;
pub use scheduler::JobScheduler;
