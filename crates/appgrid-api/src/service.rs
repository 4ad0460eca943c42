//! Service trait and the dispatch table keyed by service name.

use std::collections::HashMap;
use std::fmt::Display;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::protocol::{DEFAULT_SERVICE, Reply, ReplyCode, Request, parse_request};

/// One top-level command namespace, e.g. `app-manager` or `jobs`.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// Command synopsis, one line per command.
    fn usage(&self) -> &'static str;

    async fn process(&self, args: &[String]) -> Reply;
}

// ── Reply helpers ──────────────────────────────────────────────────

pub fn ok(text: impl Into<String>) -> Reply {
    Reply::new(ReplyCode::Ok, text.into())
}

pub fn error(e: impl Display) -> Reply {
    Reply::new(ReplyCode::ServiceError, format!("{e}\n"))
}

/// Usage text of `service`, with the usage status code.
pub fn usage_of(service: &dyn Service) -> Reply {
    Reply::new(
        ReplyCode::Usage,
        format!("Usage: {} {}\n", service.name(), service.usage().trim_end()),
    )
}

/// `value` as one line of JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Reply {
    match serde_json::to_string(value) {
        Ok(text) => ok(text + "\n"),
        Err(e) => error(e),
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Routes requests to services by name; unknown names get the usage text.
pub struct Dispatcher {
    services: HashMap<&'static str, Box<dyn Service>>,
}

impl Dispatcher {
    pub fn new(services: Vec<Box<dyn Service>>) -> Self {
        Self {
            services: services.into_iter().map(|s| (s.name(), s)).collect(),
        }
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub async fn dispatch(&self, request: &Request) -> Reply {
        let service = self
            .services
            .get(request.service.as_str())
            .or_else(|| self.services.get(DEFAULT_SERVICE));
        match service {
            Some(service) => {
                debug!(service = service.name(), args = ?request.args, "dispatching request");
                service.process(&request.args).await
            }
            None => Reply::new(
                ReplyCode::Usage,
                format!("unknown service {:?}\n", request.service),
            ),
        }
    }

    /// Parse raw request bytes and dispatch them.
    pub async fn handle(&self, bytes: &[u8]) -> Reply {
        match parse_request(bytes) {
            Ok(request) => self.dispatch(&request).await,
            Err(e) => Reply::new(ReplyCode::Usage, format!("{e}\n")),
        }
    }
}
