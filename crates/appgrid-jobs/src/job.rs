//! Job bodies, results and the progress record shown to clients.

use std::fmt;

use appgrid_core::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::progress::Progress;

/// Outcome of a job body. Code 0 means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub code: i32,
    pub message: String,
}

impl JobResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: -1,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

type JobBody = Box<dyn FnOnce(&Progress) -> JobResult + Send + 'static>;

/// A unit of work for the scheduler.
pub struct Job {
    pub(crate) description: String,
    pub(crate) body: JobBody,
}

impl Job {
    pub fn new(
        description: impl Into<String>,
        body: impl FnOnce(&Progress) -> JobResult + Send + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            body: Box::new(body),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStep {
    pub description: String,
    pub num: u32,
    pub unit: String,
    pub units_total: u64,
    pub units_done: u64,
    pub rate: u64,
}

/// Snapshot of one job as reported by `jobs list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub id: JobId,
    pub status: JobStatus,
    pub description: String,
    pub num_steps: u32,
    pub current_step: CurrentStep,
    pub result: JobResult,
}

impl JobProgress {
    pub fn new(id: JobId, description: impl Into<String>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            description: description.into(),
            num_steps: 0,
            current_step: CurrentStep::default(),
            result: JobResult::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes() {
        assert!(JobResult::ok().is_success());
        assert!(JobResult::ok_with("00c0ffee").is_success());
        let failed = JobResult::failed("boom");
        assert!(!failed.is_success());
        assert_eq!(failed.message, "boom");
    }

    #[test]
    fn progress_wire_shape() {
        let mut progress = JobProgress::new(JobId::new(7), "Installing app");
        progress.num_steps = 4;
        progress.current_step.units_total = 10;
        let json = serde_json::to_value(&progress).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["numSteps"], 4);
        assert_eq!(json["currentStep"]["unitsTotal"], 10);
        assert_eq!(json["currentStep"]["unitsDone"], 0);
        assert_eq!(json["result"]["code"], 0);
    }
}
