//! appgrid-state — persistent app and instance registry.
//!
//! # Architecture
//!
//! The `Registry` keeps every entry in memory. Reads and upserts never touch
//! the disk; `persist()` snapshots the whole cache into a fresh
//! [redb](https://docs.rs/redb) file after renaming the previous one to
//! `<path>.sav`. Rows are JSON-serialized entries:
//!
//! | Table       | Key                 | Value                 |
//! |-------------|---------------------|-----------------------|
//! | `apps`      | `(name, version)`   | `AppEntry` JSON       |
//! | `instances` | 8 hex digit id      | `InstanceEntry` JSON  |
//! | `meta`      | `"user_version"`    | `u32`                 |
//!
//! Files written by an older schema are migrated on open.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{CURRENT_USER_VERSION, Registry, backup_path};
pub use types::*;
