mod watching;

pub use watching::Watching;

use crate::{
    aof::Aof,
    client::{ClientId, ClientInfo},
    config::Config,
    db::{Db, DbIndex},
    evict::Eviction,
    pubsub::Pubsub,
    rdb::Snapshot,
    reply::ReplyError,
    request::Request,
    time::now_ms,
};
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use respite::RespConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use triomphe::Arc;
use web_time::Instant;

/// How many expire entries one active-expire cycle samples per database.
const ACTIVE_EXPIRE_SAMPLES: usize = 20;

/// Server-wide counters, surfaced by INFO.
#[derive(Debug)]
pub struct Stats {
    /// Commands executed.
    pub commands: AtomicU64,

    /// Connections accepted.
    pub connections: AtomicU64,

    /// Keys removed by active or lazy expiry.
    pub expired: AtomicU64,

    /// Changes since the last completed snapshot. Shared with the
    /// background save, which resets it.
    pub dirty: Arc<AtomicU64>,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            commands: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            dirty: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Everything the command handlers can reach: the databases and every
/// manager, owned here and passed around explicitly.
pub struct Store {
    pub dbs: Vec<Db>,

    pub watching: Mutex<Watching>,

    pub pubsub: Mutex<Pubsub>,

    pub eviction: Eviction,

    pub aof: Aof,

    pub snapshot: Snapshot,

    /// Cached scripts, keyed by lowercase SHA-1 hex.
    pub scripts: Mutex<HashMap<String, Bytes>>,

    /// Connected clients.
    pub clients: Mutex<HashMap<ClientId, ClientInfo>>,

    /// Ordinary dispatch holds this shared; EXEC holds it exclusively so
    /// its dirty check and queued batch see no interleaved writers.
    pub exec_lock: RwLock<()>,

    /// Set while replaying the command log; suppresses propagation.
    pub loading: AtomicBool,

    pub stats: Stats,

    /// Limits shared with every connection's protocol reader.
    pub reader_config: RespConfig,

    pub config: Config,

    pub started_at: Instant,
}

impl Store {
    pub fn new(config: Config) -> Arc<Store> {
        let kind = config.maxmemory_policy.lru_kind();
        let dbs = (0..config.databases)
            .map(|index| Db::new(DbIndex(index), kind))
            .collect();

        let aof = Aof::new(config.appendonly, config.appendfsync, config.aof_path())
            .unwrap_or_else(|error| {
                tracing::error!(%error, "can't open the command log; continuing without it");
                Aof::new(false, config.appendfsync, config.aof_path())
                    .expect("disabled log never opens a file")
            });

        Arc::new(Store {
            dbs,
            watching: Mutex::new(Watching::new(config.databases)),
            pubsub: Mutex::new(Pubsub::default()),
            eviction: Eviction::new(
                config.maxmemory,
                config.maxmemory_policy,
                config.maxmemory_samples,
            ),
            aof,
            snapshot: Snapshot::new(config.dump_path()),
            scripts: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            exec_lock: RwLock::new(()),
            loading: AtomicBool::new(false),
            stats: Stats::default(),
            reader_config: RespConfig::default(),
            config,
            started_at: Instant::now(),
        })
    }

    pub fn db(&self, index: DbIndex) -> Result<&Db, ReplyError> {
        self.dbs.get(index.0).ok_or(ReplyError::DBIndex)
    }

    /// Total approximate memory held by the keyspace.
    pub fn used_memory(&self) -> usize {
        self.dbs.iter().map(Db::mem_used).sum()
    }

    /// The commit phase of a command: delete lazily-expired keys under
    /// the write lock and fire the dirty hook for everything mutated.
    pub fn commit(&self) {
        for db in &self.dbs {
            if !db.needs_commit() {
                continue;
            }

            let (index, mut touched) = {
                let mut inner = db.write();
                inner.reap_expired();
                (inner.index(), inner.take_touched())
            };

            if touched.is_empty() {
                continue;
            }

            // The hook fires once per key however many times a command
            // marked it.
            touched.sort();
            touched.dedup();

            self.stats
                .dirty
                .fetch_add(u64::try_from(touched.len()).unwrap_or(0), Ordering::Relaxed);

            let mut watching = self.watching.lock();
            for key in &touched {
                watching.touch(index, key);
            }
        }
    }

    /// Propagate an executed write command to the durability log.
    pub fn propagate(&self, db: DbIndex, request: &Request) {
        if self.loading.load(Ordering::Acquire) {
            return;
        }
        self.aof.append(db, request);
    }

    pub fn connect(&self, info: ClientInfo) {
        self.stats.connections.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(info.id, info);
    }

    /// A connection closed: clear its transaction, watch and pub/sub
    /// state.
    pub fn disconnect(&self, id: ClientId) {
        self.watching.lock().remove(id);
        self.pubsub.lock().disconnect(id);
        self.clients.lock().remove(&id);
    }

    pub fn watch(&self, db: DbIndex, key: Bytes, id: ClientId) {
        self.watching.lock().add(db, key, id);
    }

    pub fn unwatch(&self, id: ClientId) {
        self.watching.lock().remove(id);
    }

    pub fn is_dirty(&self, id: ClientId) -> bool {
        self.watching.lock().is_dirty(id)
    }

    /// Mark every watcher of a flushed database dirty.
    pub fn touch_db(&self, db: DbIndex) {
        self.watching.lock().touch_db(db);
    }

    /// Mark every watcher dirty.
    pub fn touch_all(&self) {
        self.watching.lock().touch_all();
    }

    /// One periodic timer tick: active expiry, the eviction check, the
    /// per-second log fsync, and any due snapshot trigger.
    pub fn cron(&self) {
        let mut expired = 0;
        for db in &self.dbs {
            expired += db.write().active_expire(ACTIVE_EXPIRE_SAMPLES);
        }
        if expired > 0 {
            self.stats
                .expired
                .fetch_add(u64::try_from(expired).unwrap_or(0), Ordering::Relaxed);
            self.commit();
        }

        _ = self.eviction.check(&self.dbs);
        self.aof.tick();
        self.maybe_snapshot();
    }

    /// Fire a background save when any `save <sec> <changes>` trigger is
    /// due.
    fn maybe_snapshot(&self) {
        if self.config.save_points.is_empty() || self.snapshot.is_saving() {
            return;
        }

        let dirty = self.stats.dirty.load(Ordering::Relaxed);
        let elapsed = (now_ms() / 1000).saturating_sub(self.snapshot.last_save_secs());

        let due = self
            .config
            .save_points
            .iter()
            .any(|&(seconds, changes)| dirty >= changes && elapsed >= seconds);

        if due {
            tracing::info!(dirty, elapsed, "snapshot trigger due, starting background save");
            _ = self.snapshot.background(&self.dbs, self.stats.dirty.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Str, Value};

    fn store() -> Arc<Store> {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            dir: dir.keep(),
            ..Config::default()
        };
        Store::new(config)
    }

    #[test]
    fn commit_marks_watchers_dirty() {
        let store = store();
        let id = ClientId(900);
        store.watch(DbIndex(0), Bytes::from("k"), id);
        assert!(!store.is_dirty(id));

        store.dbs[0]
            .write()
            .set(b"k", Value::Str(Str::from(&b"v"[..])));
        store.commit();
        assert!(store.is_dirty(id));

        store.unwatch(id);
        assert!(!store.is_dirty(id));
    }

    #[test]
    fn commit_counts_changes() {
        let store = store();
        store.dbs[0]
            .write()
            .set(b"a", Value::Str(Str::from(&b"v"[..])));
        store.dbs[1]
            .write()
            .set(b"b", Value::Str(Str::from(&b"v"[..])));
        store.commit();
        assert_eq!(store.stats.dirty.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn db_lookup_bounds() {
        let store = store();
        assert!(store.db(DbIndex(0)).is_ok());
        assert!(store.db(DbIndex(99)).is_err());
    }
}
