//! Built-in services.

mod app_manager;
mod help;
mod jobs;

pub use app_manager::AppManagerService;
pub use help::{HelpService, UsageService};
pub use jobs::JobsService;
