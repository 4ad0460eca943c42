//! Shared handle onto one job's progress record.

use std::sync::{Arc, Mutex, MutexGuard};

use appgrid_core::{JobId, JobStatus};

use crate::job::{CurrentStep, JobProgress, JobResult};

/// Cloneable handle; the scheduler keeps one copy, the job body gets another.
#[derive(Debug, Clone)]
pub struct Progress(Arc<Mutex<JobProgress>>);

impl Progress {
    pub(crate) fn new(id: JobId, description: &str) -> Self {
        Self(Arc::new(Mutex::new(JobProgress::new(id, description))))
    }

    fn lock(&self) -> MutexGuard<'_, JobProgress> {
        self.0.lock().expect("job progress lock")
    }

    pub fn id(&self) -> JobId {
        self.lock().id
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> JobProgress {
        self.lock().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.lock().description = description.into();
    }

    pub fn set_num_steps(&self, num_steps: u32) {
        self.lock().num_steps = num_steps;
    }

    /// Advance to the next step, clearing unit counters.
    pub fn next_step(&self, description: impl Into<String>) {
        let mut p = self.lock();
        let num = p.current_step.num + 1;
        p.current_step = CurrentStep {
            description: description.into(),
            num,
            ..CurrentStep::default()
        };
    }

    /// Advance to a step that reports progress in `unit`s.
    pub fn next_step_with_units(
        &self,
        description: impl Into<String>,
        unit: impl Into<String>,
        units_total: u64,
    ) {
        let mut p = self.lock();
        let num = p.current_step.num + 1;
        p.current_step = CurrentStep {
            description: description.into(),
            num,
            unit: unit.into(),
            units_total,
            ..CurrentStep::default()
        };
    }

    pub fn units_done(&self, units_done: u64) {
        self.lock().current_step.units_done = units_done;
    }

    pub fn rate(&self, rate: u64) {
        self.lock().current_step.rate = rate;
    }

    /// `Pending` → `Queued`. Any later status is left alone.
    pub(crate) fn mark_queued(&self) {
        let mut p = self.lock();
        if p.status == JobStatus::Pending {
            p.status = JobStatus::Queued;
        }
    }

    /// Move a queued job to `Running`. Fails if it was cancelled meanwhile.
    pub(crate) fn try_start(&self) -> bool {
        let mut p = self.lock();
        if p.status.is_terminal() {
            return false;
        }
        p.status = JobStatus::Running;
        true
    }

    pub(crate) fn finish(&self, result: JobResult) {
        let mut p = self.lock();
        p.status = if result.is_success() {
            JobStatus::Successful
        } else {
            JobStatus::Failed
        };
        p.result = result;
    }

    /// Cancel a job that has not started yet.
    pub(crate) fn cancel(&self) -> Result<(), JobStatus> {
        let mut p = self.lock();
        match p.status {
            JobStatus::Pending | JobStatus::Queued => {
                p.status = JobStatus::Cancelled;
                p.result = JobResult::failed("cancelled");
                Ok(())
            }
            other => Err(other),
        }
    }
}
