//! appgrid-api — the daemon's control socket.
//!
//! Clients send an argv-style request over a Unix stream socket and get
//! back a status code plus the command's output. Requests are routed by
//! service name to a [`Service`] implementation.
//!
//! # Services
//!
//! | Service | Commands |
//! |---|---|
//! | `app-manager` | install, sideload, uninstall, list, versions, create-instance, start-instance, stop-instance, delete-instance, update-instance, instances, details, instance-log, export, import |
//! | `jobs` | list, wait, delete, cancel |
//! | `help` | full command reference |
//! | `usage` | short synopsis; also answers unknown services |
//!
//! Commands that queue work print `{"jobId": n}`; queries print JSON.

pub mod client;
pub mod protocol;
pub mod server;
pub mod service;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

use appgrid_ops::Orchestrator;

pub use client::{ClientError, call};
pub use protocol::{
    MAX_MESSAGE_LEN, PROGRAM_NAME, ProtocolError, Reply, ReplyCode, Request, decode_reply,
    encode_reply, encode_request, parse_request,
};
pub use service::{Dispatcher, Service};

/// The standard dispatch table: `app-manager`, `jobs`, `help` and `usage`.
pub fn dispatcher(orchestrator: Orchestrator) -> Dispatcher {
    let mut table: Vec<Box<dyn Service>> = vec![
        Box::new(services::JobsService::new(orchestrator.jobs().clone())),
        Box::new(services::AppManagerService::new(orchestrator)),
    ];
    table.sort_by_key(|s| s.name());

    let help = services::HelpService::new(&table);
    let mut names: Vec<&str> = table.iter().map(|s| s.name()).collect();
    names.extend(["help", "usage"]);
    let usage = services::UsageService::new(&names);

    table.push(Box::new(help));
    table.push(Box::new(usage));
    Dispatcher::new(table)
}
