//! Point-in-time snapshots of the keyspace. The format is our own: a
//! magic header, then per-database records of type-tagged key/value pairs
//! with optional expiry, little-endian throughout. A server reads back
//! exactly what it wrote.

use crate::{
    db::{Consumer, Db, Group, Hash, List, Pending, Set, SortedSet, Str, Stream, StreamEntry,
        StreamId, Value},
    time::now_ms,
};
use bytes::Bytes;
use hashbrown::HashMap;
use ordered_float::NotNan;
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
use thiserror::Error;
use triomphe::Arc;

const MAGIC: &[u8] = b"CINNABAR01";

/// Marks the start of a database section.
const OP_SELECT: u8 = 0xfe;

/// Marks the end of the file.
const OP_EOF: u8 = 0xff;

const TAG_STR: u8 = 0;
const TAG_LIST: u8 = 1;
const TAG_HASH: u8 = 2;
const TAG_SET: u8 = 3;
const TAG_ZSET: u8 = 4;
const TAG_STREAM: u8 = 5;

const FLAG_EXPIRES: u8 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("snapshot is corrupt: {0}")]
    Corrupt(&'static str),
}

/// Everything captured from one database.
pub type DbDump = Vec<(Bytes, Value, Option<u64>)>;

/// Clone the live keyspace under brief read locks.
pub fn capture(dbs: &[Db]) -> Vec<DbDump> {
    dbs.iter()
        .map(|db| {
            let inner = db.read();
            inner
                .iter()
                .map(|(key, object)| {
                    (key.clone(), object.value.clone(), inner.expires_at(key))
                })
                .collect()
        })
        .collect()
}

// Writing.

fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buffer: &mut Vec<u8>, value: u64) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_f64(buffer: &mut Vec<u8>, value: f64) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_bytes(buffer: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buffer, u32::try_from(bytes.len()).unwrap_or(u32::MAX));
    buffer.extend_from_slice(bytes);
}

fn put_id(buffer: &mut Vec<u8>, id: StreamId) {
    put_u64(buffer, id.ms);
    put_u64(buffer, id.seq);
}

fn put_value(buffer: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Str(string) => {
            put_bytes(buffer, &string.to_bytes());
        }
        Value::List(list) => {
            put_u32(buffer, u32::try_from(list.len()).unwrap_or(u32::MAX));
            for item in list.iter() {
                put_bytes(buffer, item);
            }
        }
        Value::Hash(hash) => {
            put_u32(buffer, u32::try_from(hash.len()).unwrap_or(u32::MAX));
            for (field, item) in hash.iter() {
                put_bytes(buffer, field);
                put_bytes(buffer, item);
            }
        }
        Value::Set(set) => {
            put_u32(buffer, u32::try_from(set.len()).unwrap_or(u32::MAX));
            for member in set.iter() {
                put_bytes(buffer, member);
            }
        }
        Value::SortedSet(set) => {
            put_u32(buffer, u32::try_from(set.len()).unwrap_or(u32::MAX));
            for (score, member) in set.iter() {
                put_f64(buffer, score);
                put_bytes(buffer, member);
            }
        }
        Value::Stream(stream) => {
            put_id(buffer, stream.last_id);
            put_u32(buffer, u32::try_from(stream.len()).unwrap_or(u32::MAX));
            for entry in stream.range(StreamId::ZERO, StreamId::MAX) {
                put_id(buffer, entry.id);
                put_u32(buffer, u32::try_from(entry.fields.len()).unwrap_or(u32::MAX));
                for (field, item) in &entry.fields {
                    put_bytes(buffer, field);
                    put_bytes(buffer, item);
                }
            }
            put_u32(buffer, u32::try_from(stream.groups.len()).unwrap_or(u32::MAX));
            for (name, group) in &stream.groups {
                put_bytes(buffer, name);
                put_id(buffer, group.last_delivered);
                put_u32(
                    buffer,
                    u32::try_from(group.consumers.len()).unwrap_or(u32::MAX),
                );
                for (consumer, state) in &group.consumers {
                    put_bytes(buffer, consumer);
                    put_u32(
                        buffer,
                        u32::try_from(state.pending.len()).unwrap_or(u32::MAX),
                    );
                    for (id, pending) in &state.pending {
                        put_id(buffer, *id);
                        put_u64(buffer, pending.claimed_ms);
                        put_u64(buffer, pending.deliveries);
                    }
                }
            }
        }
    }
}

fn value_tag(value: &Value) -> u8 {
    match value {
        Value::Str(_) => TAG_STR,
        Value::List(_) => TAG_LIST,
        Value::Hash(_) => TAG_HASH,
        Value::Set(_) => TAG_SET,
        Value::SortedSet(_) => TAG_ZSET,
        Value::Stream(_) => TAG_STREAM,
    }
}

/// Serialise the captured keyspace.
pub fn serialize(dumps: &[DbDump]) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(MAGIC);

    for (index, dump) in dumps.iter().enumerate() {
        if dump.is_empty() {
            continue;
        }
        buffer.push(OP_SELECT);
        put_u32(&mut buffer, u32::try_from(index).unwrap_or(u32::MAX));

        for (key, value, expires) in dump {
            buffer.push(value_tag(value));
            match expires {
                Some(at) => {
                    buffer.push(FLAG_EXPIRES);
                    put_u64(&mut buffer, *at);
                }
                None => buffer.push(0),
            }
            put_bytes(&mut buffer, key);
            put_value(&mut buffer, value);
        }
    }

    buffer.push(OP_EOF);
    buffer
}

// Reading.

struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.bytes.len() < n {
            return Err(SnapshotError::Corrupt("unexpected end of file"));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("four bytes")))
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("eight bytes")))
    }

    fn f64(&mut self) -> Result<f64, SnapshotError> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("eight bytes")))
    }

    fn bytes(&mut self) -> Result<Bytes, SnapshotError> {
        let len = usize::try_from(self.u32()?)
            .map_err(|_| SnapshotError::Corrupt("length overflow"))?;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    fn id(&mut self) -> Result<StreamId, SnapshotError> {
        Ok(StreamId {
            ms: self.u64()?,
            seq: self.u64()?,
        })
    }
}

fn read_value(cursor: &mut Cursor<'_>, tag: u8) -> Result<Value, SnapshotError> {
    Ok(match tag {
        TAG_STR => Value::Str(Str::from(cursor.bytes()?)),
        TAG_LIST => {
            let mut list = List::default();
            for _ in 0..cursor.u32()? {
                list.push(crate::db::Edge::Right, cursor.bytes()?);
            }
            Value::List(list)
        }
        TAG_HASH => {
            let mut hash = Hash::default();
            for _ in 0..cursor.u32()? {
                let field = cursor.bytes()?;
                let value = cursor.bytes()?;
                hash.set(&field, value);
            }
            Value::Hash(hash)
        }
        TAG_SET => {
            let mut set = Set::default();
            for _ in 0..cursor.u32()? {
                let member = cursor.bytes()?;
                set.add(&member);
            }
            Value::Set(set)
        }
        TAG_ZSET => {
            let mut set = SortedSet::default();
            for _ in 0..cursor.u32()? {
                let score = cursor.f64()?;
                let member = cursor.bytes()?;
                let score = NotNan::new(score)
                    .map_err(|_| SnapshotError::Corrupt("NaN score"))?;
                set.insert(score, member);
            }
            Value::SortedSet(set)
        }
        TAG_STREAM => {
            let last_id = cursor.id()?;
            let mut entries = Vec::new();
            for _ in 0..cursor.u32()? {
                let id = cursor.id()?;
                let mut fields = Vec::new();
                for _ in 0..cursor.u32()? {
                    let field = cursor.bytes()?;
                    let value = cursor.bytes()?;
                    fields.push((field, value));
                }
                entries.push(StreamEntry { id, fields });
            }
            let mut groups = HashMap::new();
            for _ in 0..cursor.u32()? {
                let name = cursor.bytes()?;
                let last_delivered = cursor.id()?;
                let mut group = Group {
                    last_delivered,
                    consumers: HashMap::new(),
                };
                for _ in 0..cursor.u32()? {
                    let consumer = cursor.bytes()?;
                    let mut state = Consumer::default();
                    for _ in 0..cursor.u32()? {
                        let id = cursor.id()?;
                        let claimed_ms = cursor.u64()?;
                        let deliveries = cursor.u64()?;
                        state.pending.insert(
                            id,
                            Pending {
                                claimed_ms,
                                deliveries,
                            },
                        );
                    }
                    group.consumers.insert(consumer, state);
                }
                groups.insert(name, group);
            }
            Value::Stream(Stream::restore(last_id, entries, groups))
        }
        _ => return Err(SnapshotError::Corrupt("unknown value tag")),
    })
}

/// Parse serialised bytes back into per-database dumps.
pub fn deserialize(bytes: &[u8]) -> Result<Vec<(usize, DbDump)>, SnapshotError> {
    let mut cursor = Cursor { bytes };
    if cursor.take(MAGIC.len())? != MAGIC {
        return Err(SnapshotError::Corrupt("bad magic"));
    }

    let mut dumps: Vec<(usize, DbDump)> = Vec::new();
    let mut current: Option<usize> = None;

    loop {
        let op = cursor.u8()?;
        match op {
            OP_EOF => break,
            OP_SELECT => {
                let index = usize::try_from(cursor.u32()?)
                    .map_err(|_| SnapshotError::Corrupt("db index overflow"))?;
                dumps.push((index, Vec::new()));
                current = Some(dumps.len() - 1);
            }
            tag => {
                let Some(current) = current else {
                    return Err(SnapshotError::Corrupt("record before db header"));
                };
                let flags = cursor.u8()?;
                let expires = if flags & FLAG_EXPIRES != 0 {
                    Some(cursor.u64()?)
                } else {
                    None
                };
                let key = cursor.bytes()?;
                let value = read_value(&mut cursor, tag)?;
                dumps[current].1.push((key, value, expires));
            }
        }
    }

    Ok(dumps)
}

/// Serialise `dumps` to a temp file and atomically rename it over the
/// target.
fn write_file(path: &Path, dumps: &[DbDump]) -> Result<(), SnapshotError> {
    use std::io::Write;

    let bytes = serialize(dumps);
    let temp = path.with_extension("rdb.tmp");
    let mut file = std::fs::File::create(&temp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&temp, path)?;
    Ok(())
}

/// The snapshot manager: target path, single-flight flag, last-save
/// timestamp. The flag and timestamp are shared with the background task.
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    saving: Arc<AtomicBool>,
    last_save: Arc<AtomicU64>,
}

impl Snapshot {
    pub fn new(path: PathBuf) -> Self {
        Snapshot {
            path,
            saving: Arc::new(AtomicBool::new(false)),
            last_save: Arc::new(AtomicU64::new(now_ms() / 1000)),
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Unix seconds of the last completed save.
    pub fn last_save_secs(&self) -> u64 {
        self.last_save.load(Ordering::Relaxed)
    }

    /// A foreground save. Fails when a background save is running.
    pub fn save(&self, dbs: &[Db]) -> Result<(), SnapshotError> {
        if self.saving.swap(true, Ordering::AcqRel) {
            return Err(SnapshotError::Corrupt("save already in progress"));
        }
        let result = write_file(&self.path, &capture(dbs));
        if result.is_ok() {
            self.last_save.store(now_ms() / 1000, Ordering::Relaxed);
        }
        self.saving.store(false, Ordering::Release);
        result
    }

    /// Start a background save: capture now, serialise and write on a
    /// blocking task. `Err(())` when one is already running. The dirty
    /// counter resets once the file lands.
    #[allow(clippy::result_unit_err)]
    pub fn background(&self, dbs: &[Db], dirty: Arc<AtomicU64>) -> Result<(), ()> {
        if self.saving.swap(true, Ordering::AcqRel) {
            return Err(());
        }

        let dumps = capture(dbs);
        let path = self.path.clone();
        let saving = self.saving.clone();
        let last_save = self.last_save.clone();
        tokio::task::spawn_blocking(move || {
            match write_file(&path, &dumps) {
                Ok(()) => {
                    last_save.store(now_ms() / 1000, Ordering::Relaxed);
                    dirty.store(0, Ordering::Relaxed);
                    tracing::info!("background save complete");
                }
                Err(error) => {
                    tracing::error!(%error, "background save failed");
                }
            }
            saving.store(false, Ordering::Release);
        });

        Ok(())
    }

    /// Load the snapshot into the databases, if the file exists. Returns
    /// how many keys were restored.
    pub fn load(&self, dbs: &[Db]) -> Result<usize, SnapshotError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        let mut keys = 0;
        for (index, dump) in deserialize(&bytes)? {
            let Some(db) = dbs.get(index) else {
                return Err(SnapshotError::Corrupt("db index out of range"));
            };
            keys += dump.len();
            db.load(dump);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbIndex, Edge, LruKind};

    fn sample_dbs() -> Vec<Db> {
        let dbs: Vec<Db> = (0..2).map(|i| Db::new(DbIndex(i), LruKind::Lru)).collect();
        {
            let mut inner = dbs[0].write();
            inner.set(b"name", Value::Str(Str::from(&b"value"[..])));
            inner.set(b"count", Value::Str(Str::from(42i64)));
            inner.expire_at(b"name", now_ms() + 60_000);

            let list = inner.list_or_default(b"queue").unwrap();
            list.push(Edge::Right, Bytes::from_static(b"a"));
            list.push(Edge::Right, Bytes::from_static(b"b"));

            let hash = inner.hash_or_default(b"obj").unwrap();
            hash.set(b"f", Bytes::from_static(b"v"));

            let set = inner.set_or_default(b"tags").unwrap();
            set.add(b"x");
            set.add(b"y");

            let zset = inner.sorted_set_or_default(b"board").unwrap();
            zset.insert(NotNan::new(1.5).unwrap(), Bytes::from_static(b"alice"));
            zset.insert(NotNan::new(2.5).unwrap(), Bytes::from_static(b"bob"));

            let stream = inner.stream_or_default(b"log").unwrap();
            stream
                .add(
                    Some(StreamId { ms: 1, seq: 0 }),
                    vec![(Bytes::from_static(b"k"), Bytes::from_static(b"v"))],
                )
                .unwrap();
            stream.groups.insert(
                Bytes::from_static(b"workers"),
                Group {
                    last_delivered: StreamId { ms: 1, seq: 0 },
                    consumers: HashMap::new(),
                },
            );
        }
        {
            let mut inner = dbs[1].write();
            inner.set(b"other-db", Value::Str(Str::from(&b"here"[..])));
        }
        dbs
    }

    #[test]
    fn roundtrip() {
        let dbs = sample_dbs();
        let bytes = serialize(&capture(&dbs));
        let restored: Vec<Db> = (0..2).map(|i| Db::new(DbIndex(i), LruKind::Lru)).collect();
        for (index, dump) in deserialize(&bytes).unwrap() {
            restored[index].load(dump);
        }

        let inner = restored[0].read();
        assert_eq!(
            inner.get_str(b"name").unwrap().unwrap().to_bytes(),
            Bytes::from_static(b"value")
        );
        assert!(inner.ttl_ms(b"name").unwrap().is_some());
        assert_eq!(inner.get_str(b"count").unwrap().unwrap().as_int(), Some(42));
        assert_eq!(inner.get_list(b"queue").unwrap().unwrap().len(), 2);
        assert_eq!(inner.get_hash(b"obj").unwrap().unwrap().len(), 1);
        assert_eq!(inner.get_set(b"tags").unwrap().unwrap().len(), 2);

        let zset = inner.get_sorted_set(b"board").unwrap().unwrap();
        assert_eq!(zset.score(b"alice"), Some(1.5));
        assert_eq!(zset.rank(b"bob"), Some(1));

        let stream = inner.get_stream(b"log").unwrap().unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.last_id, StreamId { ms: 1, seq: 0 });
        assert!(stream.groups.contains_key(&Bytes::from_static(b"workers")));

        let inner = restored[1].read();
        assert!(inner.exists(b"other-db"));
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.rdb");
        let dbs = sample_dbs();

        let snapshot = Snapshot::new(path.clone());
        snapshot.save(&dbs).unwrap();
        assert!(path.exists());

        let restored: Vec<Db> = (0..2).map(|i| Db::new(DbIndex(i), LruKind::Lru)).collect();
        let loaded = Snapshot::new(path);
        let keys = loaded.load(&restored).unwrap();
        assert_eq!(keys, 8);
        assert!(restored[0].read().exists(b"board"));
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path().join("absent.rdb"));
        let dbs = vec![Db::new(DbIndex(0), LruKind::Lru)];
        assert_eq!(snapshot.load(&dbs).unwrap(), 0);
    }

    #[test]
    fn corrupt_files_are_rejected() {
        assert!(deserialize(b"WRONG").is_err());
        let mut bytes = serialize(&capture(&sample_dbs()));
        bytes.truncate(bytes.len() / 2);
        assert!(deserialize(&bytes).is_err());
    }
}
