use crate::{client::ClientId, db::DbIndex};
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};

/// WATCH bookkeeping: which clients watch which keys, plus the set of
/// clients whose watched keys have since been written. A client goes
/// dirty the moment a watched key is touched; its watches are dropped at
/// the same time, so every mark is the result of a write that happened
/// inside the watch window.
#[derive(Debug)]
pub struct Watching {
    /// Per database: key → watching clients.
    watchers: Vec<HashMap<Bytes, HashSet<ClientId>>>,

    /// Reverse index for cheap unwatch on EXEC/DISCARD/disconnect.
    clients: HashMap<ClientId, HashSet<(usize, Bytes)>>,

    /// Clients whose EXEC must abort.
    dirty: HashSet<ClientId>,
}

impl Watching {
    pub fn new(databases: usize) -> Self {
        Watching {
            watchers: (0..databases).map(|_| HashMap::new()).collect(),
            clients: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Start watching a key. The watch window begins now; any earlier
    /// write to the key is irrelevant.
    pub fn add(&mut self, db: DbIndex, key: Bytes, id: ClientId) {
        let Some(keys) = self.watchers.get_mut(db.0) else {
            return;
        };
        keys.entry(key.clone()).or_default().insert(id);
        self.clients.entry(id).or_default().insert((db.0, key));
    }

    /// Drop every watch a client holds and its dirty mark. Marks for keys
    /// no longer watched by anyone disappear with the client entry.
    pub fn remove(&mut self, id: ClientId) {
        if let Some(keys) = self.clients.remove(&id) {
            for (db, key) in keys {
                if let Some(watchers) = self.watchers.get_mut(db) {
                    if let Some(ids) = watchers.get_mut(&key) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            watchers.remove(&key);
                        }
                    }
                }
            }
        }
        self.dirty.remove(&id);
    }

    pub fn is_dirty(&self, id: ClientId) -> bool {
        self.dirty.contains(&id)
    }

    /// A key was written: mark everyone watching it and retire their
    /// watches.
    pub fn touch(&mut self, db: DbIndex, key: &[u8]) {
        let Some(watchers) = self.watchers.get_mut(db.0) else {
            return;
        };
        let Some(ids) = watchers.remove(key) else {
            return;
        };
        for id in ids {
            if let Some(keys) = self.clients.get_mut(&id) {
                keys.remove(&(db.0, Bytes::copy_from_slice(key)));
                if keys.is_empty() {
                    self.clients.remove(&id);
                }
            }
            self.dirty.insert(id);
        }
    }

    /// A whole database was flushed.
    pub fn touch_db(&mut self, db: DbIndex) {
        let Some(watchers) = self.watchers.get_mut(db.0) else {
            return;
        };
        let keys: Vec<Bytes> = watchers.keys().cloned().collect();
        for key in keys {
            self.touch(db, &key);
        }
    }

    /// Every database was flushed.
    pub fn touch_all(&mut self) {
        for db in 0..self.watchers.len() {
            self.touch_db(DbIndex(db));
        }
    }
}
