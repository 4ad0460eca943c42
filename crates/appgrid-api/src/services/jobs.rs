//! `jobs` — inspect, wait for, cancel and forget background jobs.

use appgrid_core::JobId;
use appgrid_jobs::JobScheduler;
use async_trait::async_trait;

use crate::protocol::{Reply, ReplyCode};
use crate::service::{Service, error, json, ok, usage_of};

const USAGE: &str = "\
list [job-id]
    wait <job-id>
    delete <job-id>
    cancel <job-id>
";

pub struct JobsService {
    jobs: JobScheduler,
}

impl JobsService {
    pub fn new(jobs: JobScheduler) -> Self {
        Self { jobs }
    }
}

fn parse_job_id(s: &str) -> Result<JobId, String> {
    s.parse().map_err(|_| format!("invalid job id: {s}"))
}

#[async_trait]
impl Service for JobsService {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn usage(&self) -> &'static str {
        USAGE
    }

    async fn process(&self, args: &[String]) -> Reply {
        let Some((command, args)) = args.split_first() else {
            return usage_of(self);
        };
        match (command.as_str(), args) {
            ("list", []) => match self.jobs.list(None) {
                Ok(jobs) => json(&jobs),
                Err(e) => error(e),
            },
            ("list", [id]) => match parse_job_id(id) {
                Ok(id) => match self.jobs.list(Some(id)) {
                    Ok(jobs) => json(&jobs),
                    Err(e) => error(e),
                },
                Err(e) => error(e),
            },
            ("wait", [id]) => {
                let id = match parse_job_id(id) {
                    Ok(id) => id,
                    Err(e) => return error(e),
                };
                match self.jobs.wait_for(id).await {
                    Ok(result) => {
                        let mut reply = json(&result);
                        if !result.is_success() {
                            reply.code = ReplyCode::ServiceError;
                        }
                        reply
                    }
                    Err(e) => error(e),
                }
            }
            ("delete", [id]) => match parse_job_id(id) {
                Ok(id) => match self.jobs.delete(id) {
                    Ok(()) => ok(""),
                    Err(e) => error(e),
                },
                Err(e) => error(e),
            },
            ("cancel", [id]) => match parse_job_id(id) {
                Ok(id) => match self.jobs.cancel(id) {
                    Ok(()) => ok(""),
                    Err(e) => error(e),
                },
                Err(e) => error(e),
            },
            _ => usage_of(self),
        }
    }
}
