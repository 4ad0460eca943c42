//! Job scheduler error types.

use appgrid_core::JobId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobsError {
    #[error("no such job: {0}")]
    NotFound(JobId),

    #[error("job {0} is still active")]
    StillActive(JobId),

    #[error("job {0} has already finished")]
    AlreadyFinished(JobId),

    #[error("scheduler is shutting down")]
    Shutdown,
}

pub type JobsResult<T> = Result<T, JobsError>;
