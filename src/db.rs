mod value;

pub use value::{
    Consumer, Edge, Group, Hash, IdTooSmall, List, Pending, Placement, Set, SortedSet, Str,
    Stream, StreamEntry, StreamId, Value, ValueError, EMBED_MAX,
};

use crate::{
    dict::Dict,
    glob,
    time::{now_minutes, now_ms, now_secs32},
};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use triomphe::Arc;

/// How many draws RANDOMKEY makes before giving up on finding an
/// unexpired key.
const RANDOM_KEY_BUDGET: usize = 16;

/// New LFU counters start here so fresh keys survive the next sweep.
const LFU_INIT: u32 = 5;

/// The accounting overhead charged per main-dict entry.
const ENTRY_OVERHEAD: usize = 64;

/// The accounting overhead charged per expire entry.
const EXPIRE_OVERHEAD: usize = 32;

/// Which clock the object `lru` field runs on, per the eviction policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LruKind {
    #[default]
    Lru,
    Lfu,
}

/// The index of a database in the selector.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DbIndex(pub usize);

impl std::fmt::Display for DbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored value plus the packed access clock used by eviction.
#[derive(Debug)]
pub struct Object {
    pub value: Value,
    lru: AtomicU32,
    mem: u32,
}

impl Clone for Object {
    fn clone(&self) -> Self {
        Object {
            value: self.value.clone(),
            lru: AtomicU32::new(self.lru.load(Ordering::Relaxed)),
            mem: self.mem,
        }
    }
}

impl Object {
    pub fn new(value: Value, kind: LruKind) -> Self {
        let lru = match kind {
            LruKind::Lru => now_secs32(),
            LruKind::Lfu => (now_minutes() << 8) | LFU_INIT,
        };
        Object {
            value,
            lru: AtomicU32::new(lru),
            mem: 0,
        }
    }

    /// Update the access clock: refresh the LRU timestamp, or decay and
    /// probabilistically bump the LFU counter.
    pub fn touch_clock(&self, kind: LruKind) {
        match kind {
            LruKind::Lru => self.lru.store(now_secs32(), Ordering::Relaxed),
            LruKind::Lfu => {
                let raw = self.lru.load(Ordering::Relaxed);
                let minutes = raw >> 8;
                let counter = raw & 0xff;

                let now = now_minutes();
                let elapsed = now.wrapping_sub(minutes) & 0x00ff_ffff;
                let mut counter = counter.saturating_sub(elapsed);

                // The counter approximates log(frequency): the higher it
                // gets, the rarer an increment becomes.
                let gate = 1.0 / (f64::from(counter) * 10.0 + 1.0);
                if counter < 255 && rand::thread_rng().r#gen::<f64>() < gate {
                    counter += 1;
                }

                self.lru.store((now << 8) | counter, Ordering::Relaxed);
            }
        }
    }

    /// Seconds since the last access, under the LRU clock.
    pub fn idle_seconds(&self) -> u32 {
        now_secs32().wrapping_sub(self.lru.load(Ordering::Relaxed))
    }

    /// The LFU counter, decayed to now.
    pub fn frequency(&self) -> u32 {
        let raw = self.lru.load(Ordering::Relaxed);
        let elapsed = now_minutes().wrapping_sub(raw >> 8) & 0x00ff_ffff;
        (raw & 0xff).saturating_sub(elapsed)
    }
}

/// One logical database: the main dict, the expire dict, and the buffers
/// feeding the dirty-key hook.
#[derive(Debug)]
pub struct DbInner {
    index: DbIndex,
    kind: LruKind,
    dict: Dict<Object>,
    expires: Dict<u64>,

    /// Keys mutated since the last commit; drained into the watch manager.
    touched: Vec<Bytes>,

    /// Keys observed expired on the read path, deleted at commit under the
    /// write lock after a double-check.
    pending_expire: Mutex<Vec<Bytes>>,

    /// Approximate bytes used, mirrored into the shared gauge.
    mem: usize,
    gauge: Arc<AtomicUsize>,
}

/// A database behind its reader-writer lock.
#[derive(Debug)]
pub struct Db {
    inner: RwLock<DbInner>,
    gauge: Arc<AtomicUsize>,
}

impl Db {
    pub fn new(index: DbIndex, kind: LruKind) -> Self {
        let gauge = Arc::new(AtomicUsize::new(0));
        Db {
            inner: RwLock::new(DbInner {
                index,
                kind,
                dict: Dict::default(),
                expires: Dict::default(),
                touched: Vec::new(),
                pending_expire: Mutex::new(Vec::new()),
                mem: 0,
                gauge: gauge.clone(),
            }),
            gauge,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, DbInner> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, DbInner> {
        self.inner.write()
    }

    /// Approximate bytes used, readable without the lock.
    pub fn mem_used(&self) -> usize {
        self.gauge.load(Ordering::Relaxed)
    }

    /// Does this database have anything for the commit path to do?
    pub fn needs_commit(&self) -> bool {
        let inner = self.inner.read();
        !inner.touched.is_empty() || !inner.pending_expire.lock().is_empty()
    }

    /// Replace the contents wholesale (snapshot/AOF load). Past-due
    /// deadlines are kept as-is and fall to lazy expiry.
    pub fn load(&self, entries: Vec<(Bytes, Value, Option<u64>)>) {
        let mut inner = self.inner.write();
        inner.clear();
        for (key, value, at) in entries {
            inner.set(&key, value);
            if let Some(at) = at {
                if inner.expires.set(&key, at).is_none() {
                    inner.credit(key.len() + EXPIRE_OVERHEAD);
                }
            }
        }
        // Loading is not a client mutation; nothing watches yet.
        inner.touched.clear();
    }
}

impl DbInner {
    pub fn index(&self) -> DbIndex {
        self.index
    }

    pub fn lru_kind(&self) -> LruKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn expires_len(&self) -> usize {
        self.expires.len()
    }

    fn is_due(&self, key: &[u8]) -> bool {
        match self.expires.get(key) {
            Some(at) => *at <= now_ms(),
            None => false,
        }
    }

    /// Read a key. An expired key reads as absent and is queued for
    /// deletion at commit.
    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        if self.is_due(key) {
            self.pending_expire.lock().push(Bytes::copy_from_slice(key));
            return None;
        }
        let object = self.dict.get(key)?;
        object.touch_clock(self.kind);
        Some(object)
    }

    /// Read a key for mutation. An expired key is deleted on the spot.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        if self.is_due(key) {
            self.remove_silent(key);
            self.touched.push(Bytes::copy_from_slice(key));
            return None;
        }
        self.dict.get_mut(key)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// The TYPE of a key: `None` when absent.
    pub fn kind_of(&self, key: &[u8]) -> Option<&'static str> {
        self.get(key).map(|object| object.value.kind())
    }

    /// Remove a key without firing the dirty hook or returning the value.
    fn remove_silent(&mut self, key: &[u8]) {
        if let Some(object) = self.dict.remove(key) {
            self.debit(key.len() + ENTRY_OVERHEAD + usize::try_from(object.mem).unwrap_or(0));
        }
        if self.expires.remove(key).is_some() {
            self.debit(key.len() + EXPIRE_OVERHEAD);
        }
    }

    fn credit(&mut self, bytes: usize) {
        self.mem = self.mem.saturating_add(bytes);
        self.gauge.store(self.mem, Ordering::Relaxed);
    }

    fn debit(&mut self, bytes: usize) {
        self.mem = self.mem.saturating_sub(bytes);
        self.gauge.store(self.mem, Ordering::Relaxed);
    }

    /// Upsert, clearing any expiry (plain SET semantics). Returns the
    /// replaced value.
    pub fn set(&mut self, key: &[u8], value: Value) -> Option<Value> {
        let old = self.overwrite(key, value);
        if self.expires.remove(key).is_some() {
            self.debit(key.len() + EXPIRE_OVERHEAD);
        }
        old
    }

    /// Upsert, keeping any expiry (SET KEEPTTL, GETSET-style overwrites).
    pub fn overwrite(&mut self, key: &[u8], value: Value) -> Option<Value> {
        let expired = self.is_due(key);
        if expired {
            self.remove_silent(key);
        }

        let mut object = Object::new(value, self.kind);
        object.mem = u32::try_from(object.value.mem_usage()).unwrap_or(u32::MAX);
        let mem = usize::try_from(object.mem).unwrap_or(0);

        let old = self.dict.set(key, object);
        match &old {
            Some(previous) => {
                self.debit(usize::try_from(previous.mem).unwrap_or(0));
                self.credit(mem);
            }
            None => self.credit(key.len() + ENTRY_OVERHEAD + mem),
        }
        self.touched.push(Bytes::copy_from_slice(key));

        if expired {
            None
        } else {
            old.map(|object| object.value)
        }
    }

    /// Remove a key, firing the dirty hook. Returns the removed value.
    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        let expired = self.is_due(key);
        let present = self.dict.contains(key);
        if !present {
            return None;
        }

        let object = self.dict.remove(key)?;
        self.debit(key.len() + ENTRY_OVERHEAD + usize::try_from(object.mem).unwrap_or(0));
        if self.expires.remove(key).is_some() {
            self.debit(key.len() + EXPIRE_OVERHEAD);
        }
        self.touched.push(Bytes::copy_from_slice(key));

        if expired {
            None
        } else {
            Some(object.value)
        }
    }

    /// Record a mutation of `key`: re-measure it, drop it when its
    /// container emptied, and queue the dirty hook.
    pub fn touch(&mut self, key: &[u8]) {
        if let Some(object) = self.dict.get_mut(key) {
            let mem = u32::try_from(object.value.mem_usage()).unwrap_or(u32::MAX);
            let old = std::mem::replace(&mut object.mem, mem);
            let spent = object.value.is_spent();
            let old = usize::try_from(old).unwrap_or(0);
            let new = usize::try_from(mem).unwrap_or(0);
            if new >= old {
                self.credit(new - old);
            } else {
                self.debit(old - new);
            }
            if spent {
                self.remove_silent(key);
            }
        }
        self.touched.push(Bytes::copy_from_slice(key));
    }

    /// Set the absolute expiry of an existing key, in unix milliseconds.
    /// A deadline at or before now deletes the key immediately. Returns
    /// `false` when the key does not exist.
    pub fn expire_at(&mut self, key: &[u8], at_ms: u64) -> bool {
        if self.get(key).is_none() {
            return false;
        }
        if at_ms <= now_ms() {
            self.remove(key);
            return true;
        }
        if self.expires.set(key, at_ms).is_none() {
            self.credit(key.len() + EXPIRE_OVERHEAD);
        }
        self.touched.push(Bytes::copy_from_slice(key));
        true
    }

    /// Drop the expiry of a key. Returns `true` when a TTL was removed.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.get(key).is_none() {
            return false;
        }
        if self.expires.remove(key).is_some() {
            self.debit(key.len() + EXPIRE_OVERHEAD);
            self.touched.push(Bytes::copy_from_slice(key));
            true
        } else {
            false
        }
    }

    /// Remaining TTL: `None` when the key is absent, `Some(None)` when it
    /// has no expiry.
    pub fn ttl_ms(&self, key: &[u8]) -> Option<Option<u64>> {
        if self.get(key).is_none() {
            return None;
        }
        match self.expires.get(key) {
            Some(at) => Some(Some(at.saturating_sub(now_ms()))),
            None => Some(None),
        }
    }

    /// The absolute expiry in unix milliseconds, when one is set.
    pub fn expires_at(&self, key: &[u8]) -> Option<u64> {
        self.expires.get(key).copied()
    }

    /// Rename `src` to `dst`, carrying the value and any TTL. With
    /// `if_absent`, fails (returns `Ok(false)`) when `dst` exists.
    pub fn rename(&mut self, src: &[u8], dst: &[u8], if_absent: bool) -> Option<bool> {
        if self.get(src).is_none() {
            return None;
        }
        if if_absent && self.exists(dst) {
            return Some(false);
        }

        let at = self.expires_at(src);
        let value = self.remove(src)?;
        self.set(dst, value);
        if let Some(at) = at {
            self.expire_at(dst, at);
        }
        Some(true)
    }

    /// A random live key, or `None` when the database reads as empty.
    pub fn random_key(&self) -> Option<Bytes> {
        for _ in 0..RANDOM_KEY_BUDGET {
            let (key, _) = self.dict.random_entry()?;
            if !self.is_due(key) {
                return Some(key.clone());
            }
            self.pending_expire.lock().push(key.clone());
        }
        None
    }

    /// Every live key matching `pattern`.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        self.dict
            .iter()
            .filter(|(key, _)| glob::matches(key, pattern) && !self.is_due(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// One SCAN page: walks scan buckets until roughly `count` keys have
    /// been gathered or the cursor wraps to zero.
    pub fn scan(&self, cursor: u64, count: usize, pattern: Option<&[u8]>) -> (u64, Vec<Bytes>) {
        let mut keys = Vec::new();
        let mut cursor = cursor;
        loop {
            cursor = self.dict.scan(cursor, |key, _| {
                let matched = pattern.is_none_or(|pattern| glob::matches(key, pattern));
                if matched && !self.is_due(key) {
                    keys.push(key.clone());
                }
            });
            if cursor == 0 || keys.len() >= count {
                return (cursor, keys);
            }
        }
    }

    /// Sample up to `limit` expire entries and delete the ones past due.
    /// Returns how many were removed.
    pub fn active_expire(&mut self, limit: usize) -> usize {
        let now = now_ms();
        let mut due = Vec::new();
        for _ in 0..limit {
            let Some((key, at)) = self.expires.random_entry() else {
                break;
            };
            if *at <= now && !due.contains(key) {
                due.push(key.clone());
            }
        }

        for key in &due {
            self.remove_silent(key);
            self.touched.push(key.clone());
        }
        due.len()
    }

    /// Delete the keys queued by expired reads, re-checking the deadline
    /// under this (exclusive) borrow.
    pub fn reap_expired(&mut self) {
        let pending = std::mem::take(&mut *self.pending_expire.lock());
        for key in pending {
            if self.is_due(&key) {
                self.remove_silent(&key);
                self.touched.push(key);
            }
        }
    }

    /// Hand the dirty-key buffer to the commit path.
    pub fn take_touched(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.touched)
    }

    /// Drop every key. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.dict.len();
        self.dict.clear();
        self.expires.clear();
        self.pending_expire.lock().clear();
        self.mem = 0;
        self.gauge.store(0, Ordering::Relaxed);
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Object)> {
        self.dict.iter().filter(|(key, _)| !self.is_due(key))
    }

    /// A random candidate for eviction sampling, with its expiry.
    pub fn sample(&self, volatile: bool) -> Option<(Bytes, u64, &Object)> {
        if volatile {
            let (key, at) = self.expires.random_entry()?;
            let object = self.dict.get(key)?;
            Some((key.clone(), *at, object))
        } else {
            let (key, object) = self.dict.random_entry()?;
            let at = self.expires.get(key).copied().unwrap_or(u64::MAX);
            Some((key.clone(), at, object))
        }
    }

    /// Evict a key outright (no expiry bookkeeping beyond removal).
    /// Returns the bytes freed.
    pub fn evict(&mut self, key: &[u8]) -> usize {
        let before = self.mem;
        if self.dict.contains(key) {
            self.remove_silent(key);
            self.touched.push(Bytes::copy_from_slice(key));
        }
        before.saturating_sub(self.mem)
    }

    // Typed accessors, used by the command handlers.

    pub fn get_str(&self, key: &[u8]) -> Result<Option<&Str>, ValueError> {
        self.get(key).map(|object| object.value.as_str()).transpose()
    }

    pub fn mut_str(&mut self, key: &[u8]) -> Result<Option<&mut Str>, ValueError> {
        self.get_mut(key)
            .map(|object| object.value.mut_str())
            .transpose()
    }

    pub fn str_or_default(&mut self, key: &[u8]) -> Result<&mut Str, ValueError> {
        self.or_default(key, || Value::Str(Str::empty()))?.mut_str()
    }

    pub fn get_list(&self, key: &[u8]) -> Result<Option<&List>, ValueError> {
        self.get(key).map(|object| object.value.as_list()).transpose()
    }

    pub fn mut_list(&mut self, key: &[u8]) -> Result<Option<&mut List>, ValueError> {
        self.get_mut(key)
            .map(|object| object.value.mut_list())
            .transpose()
    }

    pub fn list_or_default(&mut self, key: &[u8]) -> Result<&mut List, ValueError> {
        self.or_default(key, || Value::List(List::default()))?.mut_list()
    }

    pub fn get_hash(&self, key: &[u8]) -> Result<Option<&Hash>, ValueError> {
        self.get(key).map(|object| object.value.as_hash()).transpose()
    }

    pub fn mut_hash(&mut self, key: &[u8]) -> Result<Option<&mut Hash>, ValueError> {
        self.get_mut(key)
            .map(|object| object.value.mut_hash())
            .transpose()
    }

    pub fn hash_or_default(&mut self, key: &[u8]) -> Result<&mut Hash, ValueError> {
        self.or_default(key, || Value::Hash(Hash::default()))?.mut_hash()
    }

    pub fn get_set(&self, key: &[u8]) -> Result<Option<&Set>, ValueError> {
        self.get(key).map(|object| object.value.as_set()).transpose()
    }

    pub fn mut_set(&mut self, key: &[u8]) -> Result<Option<&mut Set>, ValueError> {
        self.get_mut(key)
            .map(|object| object.value.mut_set())
            .transpose()
    }

    pub fn set_or_default(&mut self, key: &[u8]) -> Result<&mut Set, ValueError> {
        self.or_default(key, || Value::Set(Set::default()))?.mut_set()
    }

    pub fn get_sorted_set(&self, key: &[u8]) -> Result<Option<&SortedSet>, ValueError> {
        self.get(key)
            .map(|object| object.value.as_sorted_set())
            .transpose()
    }

    pub fn mut_sorted_set(&mut self, key: &[u8]) -> Result<Option<&mut SortedSet>, ValueError> {
        self.get_mut(key)
            .map(|object| object.value.mut_sorted_set())
            .transpose()
    }

    pub fn sorted_set_or_default(&mut self, key: &[u8]) -> Result<&mut SortedSet, ValueError> {
        self.or_default(key, || Value::SortedSet(SortedSet::default()))?
            .mut_sorted_set()
    }

    pub fn get_stream(&self, key: &[u8]) -> Result<Option<&Stream>, ValueError> {
        self.get(key)
            .map(|object| object.value.as_stream())
            .transpose()
    }

    pub fn mut_stream(&mut self, key: &[u8]) -> Result<Option<&mut Stream>, ValueError> {
        self.get_mut(key)
            .map(|object| object.value.mut_stream())
            .transpose()
    }

    pub fn stream_or_default(&mut self, key: &[u8]) -> Result<&mut Stream, ValueError> {
        self.or_default(key, || Value::Stream(Stream::default()))?
            .mut_stream()
    }

    fn or_default(
        &mut self,
        key: &[u8],
        default: impl FnOnce() -> Value,
    ) -> Result<&mut Value, ValueError> {
        if self.get_mut(key).is_none() {
            let value = default();
            let mut object = Object::new(value, self.kind);
            object.mem = u32::try_from(object.value.mem_usage()).unwrap_or(u32::MAX);
            let mem = usize::try_from(object.mem).unwrap_or(0);
            self.dict.set(key, object);
            self.credit(key.len() + ENTRY_OVERHEAD + mem);
        }
        let object = self.get_mut(key).expect("entry was just ensured");
        Ok(&mut object.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Db {
        Db::new(DbIndex(0), LruKind::Lru)
    }

    fn str_value(text: &str) -> Value {
        Value::Str(Str::from(text.as_bytes()))
    }

    #[test]
    fn set_get_remove() {
        let handle = db();
        let mut inner = handle.write();
        assert!(inner.set(b"a", str_value("x")).is_none());
        assert!(inner.exists(b"a"));
        assert_eq!(inner.kind_of(b"a"), Some("string"));
        let old = inner.set(b"a", str_value("y")).unwrap();
        assert_eq!(old.as_str().unwrap(), &Str::from(&b"x"[..]));
        assert!(inner.remove(b"a").is_some());
        assert!(!inner.exists(b"a"));
    }

    #[test]
    fn expired_reads_are_absent_and_reaped() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"a", str_value("x"));
        assert!(inner.expire_at(b"a", now_ms() + 10_000));
        assert!(inner.exists(b"a"));

        // Force the deadline into the past.
        inner.expires.set(b"a", now_ms().saturating_sub(5));
        assert!(!inner.exists(b"a"));
        assert_eq!(inner.ttl_ms(b"a"), None);

        inner.reap_expired();
        assert!(inner.dict.get(b"a").is_none());
        assert!(inner.take_touched().contains(&Bytes::from_static(b"a")));
    }

    #[test]
    fn expire_in_the_past_deletes() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"a", str_value("x"));
        assert!(inner.expire_at(b"a", now_ms().saturating_sub(1)));
        assert!(inner.dict.get(b"a").is_none());
    }

    #[test]
    fn persist_and_ttl() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"a", str_value("x"));
        assert_eq!(inner.ttl_ms(b"a"), Some(None));
        inner.expire_at(b"a", now_ms() + 10_000);
        let remaining = inner.ttl_ms(b"a").unwrap().unwrap();
        assert!(remaining <= 10_000 && remaining > 9_000);
        assert!(inner.persist(b"a"));
        assert!(!inner.persist(b"a"));
        assert_eq!(inner.ttl_ms(b"a"), Some(None));
    }

    #[test]
    fn set_clears_ttl_overwrite_keeps_it() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"a", str_value("x"));
        inner.expire_at(b"a", now_ms() + 10_000);

        inner.overwrite(b"a", str_value("y"));
        assert!(inner.ttl_ms(b"a").unwrap().is_some());

        inner.set(b"a", str_value("z"));
        assert_eq!(inner.ttl_ms(b"a"), Some(None));
    }

    #[test]
    fn rename_carries_ttl() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"src", str_value("x"));
        inner.expire_at(b"src", now_ms() + 10_000);
        assert_eq!(inner.rename(b"src", b"dst", false), Some(true));
        assert!(!inner.exists(b"src"));
        assert!(inner.ttl_ms(b"dst").unwrap().is_some());

        inner.set(b"other", str_value("y"));
        assert_eq!(inner.rename(b"other", b"dst", true), Some(false));
        assert_eq!(inner.rename(b"missing", b"dst", false), None);
    }

    #[test]
    fn wrong_type_accessors() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"a", str_value("x"));
        assert_eq!(inner.get_list(b"a").unwrap_err(), ValueError::WrongType);
        assert_eq!(inner.hash_or_default(b"a").unwrap_err(), ValueError::WrongType);
        assert!(inner.get_str(b"a").unwrap().is_some());
        assert!(inner.get_str(b"missing").unwrap().is_none());
    }

    #[test]
    fn empty_containers_are_dropped_on_touch() {
        let handle = db();
        let mut inner = handle.write();
        inner.list_or_default(b"q").unwrap().push(Edge::Right, "x".into());
        inner.touch(b"q");
        assert!(inner.exists(b"q"));

        inner.mut_list(b"q").unwrap().unwrap().pop(Edge::Right);
        inner.touch(b"q");
        assert!(!inner.exists(b"q"));
    }

    #[test]
    fn active_expire_removes_due_keys() {
        let handle = db();
        let mut inner = handle.write();
        for i in 0..20 {
            let key = format!("k{i}");
            inner.set(key.as_bytes(), str_value("x"));
            inner.expires.set(key.as_bytes(), 1);
        }
        let mut removed = 0;
        for _ in 0..50 {
            removed += inner.active_expire(20);
        }
        assert_eq!(removed, 20);
        assert_eq!(inner.len(), 0);
    }

    #[test]
    fn scan_pages_cover_the_keyspace() {
        let handle = db();
        let mut inner = handle.write();
        for i in 0..500 {
            inner.set(format!("k{i}").as_bytes(), str_value("x"));
        }
        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0;
        loop {
            let (next, keys) = inner.scan(cursor, 50, None);
            seen.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn keys_filters_by_pattern() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"user:1", str_value("x"));
        inner.set(b"user:2", str_value("x"));
        inner.set(b"other", str_value("x"));
        let mut keys = inner.keys(b"user:*");
        keys.sort();
        assert_eq!(keys, vec![Bytes::from("user:1"), Bytes::from("user:2")]);
        assert_eq!(inner.keys(b"*").len(), 3);
    }

    #[test]
    fn memory_gauge_tracks_mutations() {
        let handle = db();
        {
            let mut inner = handle.write();
            inner.set(b"a", str_value("some value worth counting"));
        }
        let used = handle.mem_used();
        assert!(used > 0);
        {
            let mut inner = handle.write();
            inner.remove(b"a");
        }
        assert!(handle.mem_used() < used);
    }

    #[test]
    fn random_key_skips_expired() {
        let handle = db();
        let mut inner = handle.write();
        inner.set(b"live", str_value("x"));
        inner.set(b"dead", str_value("x"));
        inner.expires.set(b"dead", 1);
        for _ in 0..32 {
            if let Some(key) = inner.random_key() {
                assert_eq!(key, Bytes::from_static(b"live"));
            }
        }
    }
}
