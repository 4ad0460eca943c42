//! Registry — in-memory cache of apps and instances, snapshotted to redb.
//!
//! Mutations only touch the cache. `persist()` writes the whole cache to a
//! fresh file after moving the previous generation aside to `<path>.sav`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tracing::{debug, info, warn};

use appgrid_core::{AppKey, InstanceId};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// On-disk schema marker written by this build.
///
/// 1: every instance has at least one network attachment.
pub const CURRENT_USER_VERSION: u32 = 1;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

#[derive(Debug, Default)]
struct Cache {
    apps: BTreeMap<AppKey, AppData>,
    instances: BTreeMap<InstanceId, InstanceData>,
    user_version: u32,
}

/// Thread-safe app and instance registry.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Registry {
    path: PathBuf,
    cache: RwLock<Cache>,
    /// `None` only while `persist()` swaps the file.
    db: Mutex<Option<Database>>,
}

impl Registry {
    /// Open (or create) the registry file and hydrate the cache from it.
    ///
    /// Files written by an older schema are migrated and persisted at once.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = path.exists();
        let db = Database::create(&path).map_err(map_err!(Open))?;

        let cache = if existed {
            load(&db)?
        } else {
            let cache = Cache {
                user_version: CURRENT_USER_VERSION,
                ..Cache::default()
            };
            write_snapshot(&db, &cache)?;
            cache
        };
        debug!(
            ?path,
            apps = cache.apps.len(),
            instances = cache.instances.len(),
            user_version = cache.user_version,
            "registry opened"
        );

        let needs_migration = cache.user_version < CURRENT_USER_VERSION;
        let registry = Self {
            path,
            cache: RwLock::new(cache),
            db: Mutex::new(Some(db)),
        };
        if needs_migration {
            registry.migrate()?;
        }
        Ok(registry)
    }

    fn migrate(&self) -> StateResult<()> {
        {
            let mut cache = self.cache.write().expect("registry cache lock");
            let from = cache.user_version;
            let mut attached = 0usize;
            if from < 1 {
                for data in cache.instances.values_mut() {
                    if data.networks.is_empty() {
                        data.networks.push(NetworkAttachment::new(DEFAULT_NETWORK));
                        attached += 1;
                    }
                }
            }
            cache.user_version = CURRENT_USER_VERSION;
            info!(from, to = CURRENT_USER_VERSION, attached, "registry migrated");
        }
        self.persist()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user_version(&self) -> u32 {
        self.cache.read().expect("registry cache lock").user_version
    }

    // ── Apps ───────────────────────────────────────────────────────

    /// Insert or replace an app entry.
    pub fn insert_app(&self, entry: AppEntry) {
        let mut cache = self.cache.write().expect("registry cache lock");
        cache.apps.insert(entry.key, entry.data);
    }

    /// Returns true if the app was present.
    pub fn delete_app(&self, key: &AppKey) -> bool {
        let mut cache = self.cache.write().expect("registry cache lock");
        cache.apps.remove(key).is_some()
    }

    pub fn has_app(&self, key: &AppKey) -> bool {
        self.cache.read().expect("registry cache lock").apps.contains_key(key)
    }

    pub fn query_app(&self, key: &AppKey) -> Option<AppEntry> {
        let cache = self.cache.read().expect("registry cache lock");
        cache.apps.get(key).map(|data| AppEntry {
            key: key.clone(),
            data: data.clone(),
        })
    }

    /// Snapshot of every app, ordered by key.
    pub fn all_apps(&self) -> Vec<AppEntry> {
        let cache = self.cache.read().expect("registry cache lock");
        cache
            .apps
            .iter()
            .map(|(key, data)| AppEntry {
                key: key.clone(),
                data: data.clone(),
            })
            .collect()
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or replace an instance entry.
    pub fn insert_instance(&self, entry: InstanceEntry) {
        let mut cache = self.cache.write().expect("registry cache lock");
        cache.instances.insert(entry.id, entry.data);
    }

    /// Returns true if the instance was present.
    pub fn delete_instance(&self, id: InstanceId) -> bool {
        let mut cache = self.cache.write().expect("registry cache lock");
        cache.instances.remove(&id).is_some()
    }

    pub fn has_instance(&self, id: InstanceId) -> bool {
        self.cache
            .read()
            .expect("registry cache lock")
            .instances
            .contains_key(&id)
    }

    pub fn query_instance(&self, id: InstanceId) -> Option<InstanceEntry> {
        let cache = self.cache.read().expect("registry cache lock");
        cache.instances.get(&id).map(|data| InstanceEntry {
            id,
            data: data.clone(),
        })
    }

    /// Snapshot of every instance, ordered by id.
    pub fn all_instances(&self) -> Vec<InstanceEntry> {
        self.instances_where(|_| true)
    }

    /// Instances of any version of the named app.
    pub fn instances_of(&self, app: &str) -> Vec<InstanceEntry> {
        self.instances_where(|data| data.app == app)
    }

    pub fn instances_of_version(&self, app: &str, version: &str) -> Vec<InstanceEntry> {
        self.instances_where(|data| data.app == app && data.version == version)
    }

    fn instances_where(&self, pred: impl Fn(&InstanceData) -> bool) -> Vec<InstanceEntry> {
        let cache = self.cache.read().expect("registry cache lock");
        cache
            .instances
            .iter()
            .filter(|(_, data)| pred(data))
            .map(|(id, data)| InstanceEntry {
                id: *id,
                data: data.clone(),
            })
            .collect()
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Write the whole cache to a fresh file, keeping the previous file as
    /// `<path>.sav`.
    ///
    /// A failed backup rename is logged and ignored. All rows go through one
    /// write transaction, so on error the fresh file holds no partial
    /// generation and `.sav` still holds the last good one.
    pub fn persist(&self) -> StateResult<()> {
        let mut slot = self.db.lock().expect("registry store lock");
        drop(slot.take());

        let backup = backup_path(&self.path);
        if let Err(e) = std::fs::rename(&self.path, &backup) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?self.path, error = %e, "could not back up registry file");
            }
        }

        let db = slot.insert(Database::create(&self.path).map_err(map_err!(Open))?);
        let cache = self.cache.read().expect("registry cache lock");
        write_snapshot(db, &cache)?;
        debug!(
            path = ?self.path,
            apps = cache.apps.len(),
            instances = cache.instances.len(),
            "registry persisted"
        );
        Ok(())
    }
}

/// `<path>.sav`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sav");
    PathBuf::from(name)
}

fn load(db: &Database) -> StateResult<Cache> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    let mut cache = Cache::default();

    if let Some(table) = open_optional(&txn, APPS)? {
        for row in table.iter().map_err(map_err!(Read))? {
            let (_, value) = row.map_err(map_err!(Read))?;
            let entry: AppEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            cache.apps.insert(entry.key, entry.data);
        }
    }

    if let Some(table) = open_optional(&txn, INSTANCES)? {
        for row in table.iter().map_err(map_err!(Read))? {
            let (_, value) = row.map_err(map_err!(Read))?;
            let entry: InstanceEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            cache.instances.insert(entry.id, entry.data);
        }
    }

    if let Some(table) = open_optional(&txn, META)? {
        if let Some(version) = table.get(USER_VERSION_KEY).map_err(map_err!(Read))? {
            cache.user_version = version.value();
        }
    }

    Ok(cache)
}

/// A missing table reads as empty.
fn open_optional<K, V>(
    txn: &ReadTransaction,
    def: TableDefinition<K, V>,
) -> StateResult<Option<redb::ReadOnlyTable<K, V>>>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    match txn.open_table(def) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(StateError::Table(e.to_string())),
    }
}

fn write_snapshot(db: &Database, cache: &Cache) -> StateResult<()> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    // Stale rows survive when the backup rename failed and the old file was reopened.
    txn.delete_table(APPS).map_err(map_err!(Table))?;
    txn.delete_table(INSTANCES).map_err(map_err!(Table))?;
    {
        let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
        meta.insert(USER_VERSION_KEY, cache.user_version)
            .map_err(map_err!(Write))?;

        let mut apps = txn.open_table(APPS).map_err(map_err!(Table))?;
        for (key, data) in &cache.apps {
            let row = serde_json::to_vec(&AppEntry {
                key: key.clone(),
                data: data.clone(),
            })
            .map_err(map_err!(Serialize))?;
            apps.insert((key.name(), key.version()), row.as_slice())
                .map_err(map_err!(Write))?;
        }

        let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        for (id, data) in &cache.instances {
            let row = serde_json::to_vec(&InstanceEntry {
                id: *id,
                data: data.clone(),
            })
            .map_err(map_err!(Serialize))?;
            instances
                .insert(id.hex().as_str(), row.as_slice())
                .map_err(map_err!(Write))?;
        }
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(())
}
