//! `help` and `usage` — describe the available services.

use async_trait::async_trait;

use crate::protocol::{PROGRAM_NAME, Reply, ReplyCode};
use crate::service::{Service, ok};

/// Full command reference, built from the services it describes.
pub struct HelpService {
    text: String,
}

impl HelpService {
    pub fn new(services: &[Box<dyn Service>]) -> Self {
        let mut text = format!("Usage: {PROGRAM_NAME} <service> [args...]\n\n");
        for service in services {
            text.push_str(&format!("{}\n    {}\n", service.name(), service.usage().trim_end()));
        }
        text.push_str("help\nusage\n");
        Self { text }
    }
}

#[async_trait]
impl Service for HelpService {
    fn name(&self) -> &'static str {
        "help"
    }

    fn usage(&self) -> &'static str {
        ""
    }

    async fn process(&self, _args: &[String]) -> Reply {
        ok(self.text.clone())
    }
}

/// Short synopsis; also the fallback for unknown services.
pub struct UsageService {
    text: String,
}

impl UsageService {
    pub fn new(names: &[&str]) -> Self {
        Self {
            text: format!(
                "Usage: {PROGRAM_NAME} <service> [args...]\nservices: {}\n",
                names.join(", ")
            ),
        }
    }
}

#[async_trait]
impl Service for UsageService {
    fn name(&self) -> &'static str {
        "usage"
    }

    fn usage(&self) -> &'static str {
        ""
    }

    async fn process(&self, _args: &[String]) -> Reply {
        Reply::new(ReplyCode::Usage, self.text.clone())
    }
}
