//! redb table definitions for the registry file.
//!
//! Values are JSON-serialized entries. The file is rewritten as a whole on
//! every persist, so there are no secondary indexes to keep in sync.

use redb::TableDefinition;

/// App entries keyed by `(name, version)`.
pub const APPS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("apps");

/// Instance entries keyed by the 8-hex-digit instance id.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Schema bookkeeping; currently only `user_version`.
pub const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

pub const USER_VERSION_KEY: &str = "user_version";
