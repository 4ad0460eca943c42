//! JobScheduler — FIFO queue drained by a single worker loop.
//!
//! `submit` returns as soon as the job is queued. The worker loop takes one
//! job at a time, runs it on a dedicated thread named `job_<id>`, and joins
//! that thread before it looks at the queue again.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use appgrid_core::{JobId, JobStatus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{JobsError, JobsResult};
use crate::job::{Job, JobProgress, JobResult};
use crate::progress::Progress;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct QueuedJob {
    id: JobId,
    job: Job,
    progress: Progress,
}

struct Inner {
    next_id: AtomicU32,
    jobs: RwLock<BTreeMap<JobId, Progress>>,
    queue_tx: mpsc::UnboundedSender<QueuedJob>,
    /// Taken by the worker loop when it starts.
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedJob>>>,
    shutdown: watch::Receiver<bool>,
}

/// Cheaply cloneable handle onto the job queue and progress registry.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    /// Create a scheduler that stops when `shutdown` flips to `true`.
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU32::new(1),
                jobs: RwLock::new(BTreeMap::new()),
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
                shutdown,
            }),
        }
    }

    /// Start the worker loop on the current tokio runtime.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Worker loop. Returns on shutdown; only the first call does any work.
    pub async fn run(self) {
        let Some(mut queue) = self.inner.queue_rx.lock().expect("job queue lock").take() else {
            warn!("job scheduler already running");
            return;
        };
        let mut shutdown = self.inner.shutdown.clone();
        info!("job scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = queue.recv() => match next {
                    Some(queued) => self.execute(queued).await,
                    None => break,
                },
            }
        }

        info!("job scheduler stopped");
    }

    async fn execute(&self, queued: QueuedJob) {
        let QueuedJob { id, job, progress } = queued;
        if !progress.try_start() {
            debug!(%id, "skipping cancelled job");
            return;
        }
        info!(%id, description = %job.description, "job started");

        let worker_progress = progress.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let handle = thread::Builder::new()
                .name(format!("job_{id}"))
                .spawn(move || (job.body)(&worker_progress))?;
            Ok::<_, std::io::Error>(handle.join())
        })
        .await;

        let result = match joined {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(panic))) => {
                let message = panic_message(panic.as_ref());
                error!(%id, %message, "job panicked");
                JobResult::failed(format!("job panicked: {message}"))
            }
            Ok(Err(e)) => {
                error!(%id, error = %e, "could not spawn job thread");
                JobResult::failed(format!("could not spawn job thread: {e}"))
            }
            Err(e) => {
                error!(%id, error = %e, "job worker task failed");
                JobResult::failed(e.to_string())
            }
        };

        if result.is_success() {
            info!(%id, "job finished");
        } else {
            warn!(%id, code = result.code, message = %result.message, "job failed");
        }
        progress.finish(result);
    }

    /// Queue a job and return its id without waiting for it to run.
    pub fn submit(&self, job: Job) -> JobId {
        let id = JobId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let progress = Progress::new(id, &job.description);
        self.inner
            .jobs
            .write()
            .expect("job registry lock")
            .insert(id, progress.clone());

        debug!(%id, description = %job.description, "job submitted");
        // Queued before it is sent: the worker may pick it up immediately.
        progress.mark_queued();
        let queued = QueuedJob {
            id,
            job,
            progress: progress.clone(),
        };
        if self.inner.queue_tx.send(queued).is_err() {
            progress.finish(JobResult::failed("job scheduler is not running"));
        }
        id
    }

    fn get(&self, id: JobId) -> JobsResult<Progress> {
        if id.is_none() {
            return Err(JobsError::NotFound(id));
        }
        self.inner
            .jobs
            .read()
            .expect("job registry lock")
            .get(&id)
            .cloned()
            .ok_or(JobsError::NotFound(id))
    }

    /// Wait until the job reaches a terminal state and return its result.
    pub async fn wait_for(&self, id: JobId) -> JobsResult<JobResult> {
        let progress = self.get(id)?;
        let mut shutdown = self.inner.shutdown.clone();
        loop {
            let snapshot = progress.snapshot();
            if snapshot.status.is_terminal() {
                return Ok(snapshot.result);
            }
            if *shutdown.borrow() {
                return Err(JobsError::Shutdown);
            }
            tokio::select! {
                _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
                _ = shutdown.changed() => return Err(JobsError::Shutdown),
            }
        }
    }

    /// All jobs ordered by id, or just the one asked for.
    pub fn list(&self, id: Option<JobId>) -> JobsResult<Vec<JobProgress>> {
        match id {
            Some(id) => Ok(vec![self.get(id)?.snapshot()]),
            None => Ok(self
                .inner
                .jobs
                .read()
                .expect("job registry lock")
                .values()
                .map(Progress::snapshot)
                .collect()),
        }
    }

    /// Forget a finished job.
    pub fn delete(&self, id: JobId) -> JobsResult<()> {
        let mut jobs = self.inner.jobs.write().expect("job registry lock");
        let progress = jobs.get(&id).ok_or(JobsError::NotFound(id))?;
        if !progress.status().is_terminal() {
            return Err(JobsError::StillActive(id));
        }
        jobs.remove(&id);
        debug!(%id, "job deleted");
        Ok(())
    }

    /// Cancel a job that has not started running.
    pub fn cancel(&self, id: JobId) -> JobsResult<()> {
        let progress = self.get(id)?;
        match progress.cancel() {
            Ok(()) => {
                info!(%id, "job cancelled");
                Ok(())
            }
            Err(JobStatus::Running) => Err(JobsError::StillActive(id)),
            Err(_) => Err(JobsError::AlreadyFinished(id)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
