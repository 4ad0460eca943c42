//! `app-manager` — app and instance lifecycle commands.

use appgrid_core::JobId;
use appgrid_ops::{OpsResult, Orchestrator, parse_app_key, parse_instance_id};
use async_trait::async_trait;
use serde_json::json;

use crate::protocol::{MAX_MESSAGE_LEN, Reply, ReplyCode};
use crate::service::{Service, error, usage_of};

const USAGE: &str = "\
install <app> <version> [license-key]
    sideload <manifest-json> [license-key]
    uninstall <app> <version> [--force]
    list
    versions <app>
    create-instance <app> <version> [description]
    start-instance <id>
    stop-instance <id>
    delete-instance <id>
    update-instance <id> <version>
    instances [app [version]]
    details <id>
    instance-log <id>
    export <app> <version>
    import <manifest-path>
";

pub struct AppManagerService {
    orchestrator: Orchestrator,
}

impl AppManagerService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

/// The newest output that fits into one reply.
fn log_tail(logs: String) -> Reply {
    let bytes = logs.into_bytes();
    let start = bytes.len().saturating_sub(MAX_MESSAGE_LEN);
    Reply::new(ReplyCode::Ok, bytes[start..].to_vec())
}

fn submitted(job: OpsResult<JobId>) -> Reply {
    match job {
        Ok(id) => crate::service::json(&json!({ "jobId": id })),
        Err(e) => error(e),
    }
}

#[async_trait]
impl Service for AppManagerService {
    fn name(&self) -> &'static str {
        "app-manager"
    }

    fn usage(&self) -> &'static str {
        USAGE
    }

    async fn process(&self, args: &[String]) -> Reply {
        let o = &self.orchestrator;
        let Some((command, args)) = args.split_first() else {
            return usage_of(self);
        };

        let job = match (command.as_str(), args) {
            ("install", [app, version]) => parse_app_key(app, version).and_then(|k| o.install(k, "")),
            ("install", [app, version, license]) => {
                parse_app_key(app, version).and_then(|k| o.install(k, license.as_str()))
            }
            ("sideload", [manifest]) => o.sideload(manifest.clone().into_bytes(), ""),
            ("sideload", [manifest, license]) => {
                o.sideload(manifest.clone().into_bytes(), license.as_str())
            }
            ("uninstall", [app, version]) => {
                parse_app_key(app, version).and_then(|k| o.uninstall(k, false))
            }
            ("uninstall", [app, version, flag]) if flag == "--force" => {
                parse_app_key(app, version).and_then(|k| o.uninstall(k, true))
            }
            ("create-instance", [app, version]) => {
                parse_app_key(app, version).and_then(|k| o.create_instance(k, ""))
            }
            ("create-instance", [app, version, description]) => parse_app_key(app, version)
                .and_then(|k| o.create_instance(k, description.as_str())),
            ("start-instance", [id]) => parse_instance_id(id).and_then(|id| o.start_instance(id)),
            ("stop-instance", [id]) => parse_instance_id(id).and_then(|id| o.stop_instance(id)),
            ("delete-instance", [id]) => parse_instance_id(id).and_then(|id| o.delete_instance(id)),
            ("update-instance", [id, version]) => {
                parse_instance_id(id).and_then(|id| o.update_instance(id, version.as_str()))
            }
            ("export", [app, version]) => parse_app_key(app, version).and_then(|k| o.export_app(k)),
            ("import", [path]) => o.import_app(path),

            ("list", []) => return crate::service::json(&o.list_apps()),
            ("versions", [app]) => return crate::service::json(&o.list_versions(app)),
            ("instances", filter) if filter.len() <= 2 => {
                let app = filter.first().map(String::as_str);
                let version = filter.get(1).map(String::as_str);
                return crate::service::json(&o.list_instances(app, version));
            }
            ("details", [id]) => {
                return match parse_instance_id(id).and_then(|id| o.instance_details(id)) {
                    Ok(details) => crate::service::json(&details),
                    Err(e) => error(e),
                };
            }
            ("instance-log", [id]) => {
                let id = match parse_instance_id(id) {
                    Ok(id) => id,
                    Err(e) => return error(e),
                };
                let o = o.clone();
                return match tokio::task::spawn_blocking(move || o.instance_logs(id)).await {
                    Ok(Ok(logs)) => log_tail(logs),
                    Ok(Err(e)) => error(e),
                    Err(e) => error(e),
                };
            }
            _ => return usage_of(self),
        };
        submitted(job)
    }
}
