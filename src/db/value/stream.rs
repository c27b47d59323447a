use crate::{bytes::parse, radix::Radix, time::now_ms};
use bytes::Bytes;
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// A stream entry id: milliseconds and a sequence number breaking ties
/// within the same millisecond.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    /// The smallest id strictly greater than this one.
    pub fn next(self) -> StreamId {
        match self.seq.checked_add(1) {
            Some(seq) => StreamId { ms: self.ms, seq },
            None => StreamId {
                ms: self.ms + 1,
                seq: 0,
            },
        }
    }

    /// Parse `ms` or `ms-seq`, filling a missing sequence with
    /// `default_seq`. `-` and `+` parse to the extremes.
    pub fn parse(bytes: &[u8], default_seq: u64) -> Option<StreamId> {
        match bytes {
            b"-" => return Some(StreamId::ZERO),
            b"+" => return Some(StreamId::MAX),
            _ => {}
        }
        match bytes.iter().position(|&b| b == b'-') {
            Some(dash) => {
                let ms = parse(&bytes[..dash])?;
                let seq = parse(&bytes[dash + 1..])?;
                Some(StreamId { ms, seq })
            }
            None => Some(StreamId {
                ms: parse(bytes)?,
                seq: default_seq,
            }),
        }
    }

    pub fn to_bytes(self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Clone, Debug)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// An unacknowledged delivery.
#[derive(Clone, Copy, Debug)]
pub struct Pending {
    /// When the entry was last delivered or claimed.
    pub claimed_ms: u64,

    pub deliveries: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Consumer {
    pub pending: BTreeMap<StreamId, Pending>,
}

/// A named cursor over the stream shared by its consumers.
#[derive(Clone, Debug, Default)]
pub struct Group {
    pub last_delivered: StreamId,
    pub consumers: HashMap<Bytes, Consumer>,
}

impl Group {
    pub fn pending_len(&self) -> usize {
        self.consumers
            .values()
            .map(|consumer| consumer.pending.len())
            .sum()
    }

    /// Acknowledge an id in whichever consumer holds it.
    pub fn ack(&mut self, id: StreamId) -> bool {
        self.consumers
            .values_mut()
            .any(|consumer| consumer.pending.remove(&id).is_some())
    }

    /// The consumer currently holding a pending id.
    pub fn holder(&self, id: StreamId) -> Option<&Bytes> {
        self.consumers
            .iter()
            .find(|(_, consumer)| consumer.pending.contains_key(&id))
            .map(|(name, _)| name)
    }
}

/// An append-only log of `(id, fields)` entries with a radix index from
/// the stringified id, plus the consumer groups reading it.
#[derive(Clone, Debug, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    index: Radix<StreamId>,
    pub last_id: StreamId,
    pub groups: HashMap<Bytes, Group>,
}

/// XADD with an explicit id that does not advance the stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdTooSmall;

impl Stream {
    /// Rebuild a stream from persisted parts, reindexing every entry.
    pub fn restore(
        last_id: StreamId,
        entries: Vec<StreamEntry>,
        groups: HashMap<Bytes, Group>,
    ) -> Stream {
        let mut index = Radix::default();
        for entry in &entries {
            index.insert(entry.id.to_string().as_bytes(), entry.id);
        }
        Stream {
            entries,
            index,
            last_id,
            groups,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The id an auto-generated XADD would use right now.
    fn next_auto_id(&self) -> StreamId {
        let now = now_ms();
        if now > self.last_id.ms {
            StreamId { ms: now, seq: 0 }
        } else {
            self.last_id.next()
        }
    }

    /// Append an entry. An explicit id must be strictly greater than every
    /// id ever used.
    pub fn add(
        &mut self,
        id: Option<StreamId>,
        fields: Vec<(Bytes, Bytes)>,
    ) -> Result<StreamId, IdTooSmall> {
        let id = match id {
            Some(id) if id <= self.last_id => return Err(IdTooSmall),
            Some(id) => id,
            None => self.next_auto_id(),
        };

        self.index.insert(id.to_string().as_bytes(), id);
        self.entries.push(StreamEntry { id, fields });
        self.last_id = id;
        Ok(id)
    }

    /// Entries with `start <= id <= end`.
    pub fn range(&self, start: StreamId, end: StreamId) -> &[StreamEntry] {
        let from = self.entries.partition_point(|entry| entry.id < start);
        let to = self.entries.partition_point(|entry| entry.id <= end);
        &self.entries[from..to]
    }

    /// Entries with `id > after`.
    pub fn after(&self, after: StreamId) -> &[StreamEntry] {
        let from = self.entries.partition_point(|entry| entry.id <= after);
        &self.entries[from..]
    }

    pub fn first(&self) -> Option<&StreamEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&StreamEntry> {
        self.entries.last()
    }

    /// Exact lookup through the radix index.
    pub fn get(&self, id: StreamId) -> Option<&StreamEntry> {
        let id = *self.index.get(id.to_string().as_bytes())?;
        let at = self.entries.partition_point(|entry| entry.id < id);
        self.entries.get(at).filter(|entry| entry.id == id)
    }

    /// Delete entries by id. Returns how many existed.
    pub fn remove(&mut self, ids: &[StreamId]) -> usize {
        let mut removed = 0;
        for &id in ids {
            if self.index.remove(id.to_string().as_bytes()).is_none() {
                continue;
            }
            let at = self.entries.partition_point(|entry| entry.id < id);
            if self.entries.get(at).is_some_and(|entry| entry.id == id) {
                self.entries.remove(at);
                removed += 1;
            }
        }
        removed
    }

    /// Keep only the newest `maxlen` entries. Returns how many were
    /// dropped. The index is rebuilt from the surviving slice.
    pub fn trim_maxlen(&mut self, maxlen: usize) -> usize {
        if self.entries.len() <= maxlen {
            return 0;
        }
        let excess = self.entries.len() - maxlen;
        self.entries.drain(..excess);
        self.index.clear();
        for entry in &self.entries {
            self.index.insert(entry.id.to_string().as_bytes(), entry.id);
        }
        excess
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| {
                entry
                    .fields
                    .iter()
                    .map(|(field, value)| field.len() + value.len() + 32)
                    .sum::<usize>()
                    + 48
            })
            .sum::<usize>()
            + 128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
        pairs
            .iter()
            .map(|(field, value)| {
                (
                    Bytes::copy_from_slice(field.as_bytes()),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect()
    }

    #[test]
    fn parse_ids() {
        assert_eq!(
            StreamId::parse(b"5-3", 0),
            Some(StreamId { ms: 5, seq: 3 })
        );
        assert_eq!(StreamId::parse(b"5", 7), Some(StreamId { ms: 5, seq: 7 }));
        assert_eq!(StreamId::parse(b"-", 0), Some(StreamId::ZERO));
        assert_eq!(StreamId::parse(b"+", 0), Some(StreamId::MAX));
        assert_eq!(StreamId::parse(b"x", 0), None);
        assert_eq!(StreamId::parse(b"1-", 0), None);
    }

    #[test]
    fn explicit_ids_must_increase() {
        let mut stream = Stream::default();
        let id = StreamId { ms: 5, seq: 0 };
        assert_eq!(stream.add(Some(id), fields(&[("a", "1")])), Ok(id));
        assert_eq!(
            stream.add(Some(id), fields(&[("a", "2")])),
            Err(IdTooSmall)
        );
        assert_eq!(
            stream.add(Some(StreamId { ms: 4, seq: 9 }), fields(&[])),
            Err(IdTooSmall)
        );
        assert!(stream.add(Some(id.next()), fields(&[("a", "3")])).is_ok());
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn auto_ids_are_monotonic() {
        let mut stream = Stream::default();
        let a = stream.add(None, fields(&[("k", "1")])).unwrap();
        let b = stream.add(None, fields(&[("k", "2")])).unwrap();
        let c = stream.add(None, fields(&[("k", "3")])).unwrap();
        assert!(a < b && b < c);
        assert_eq!(stream.last_id, c);
    }

    #[test]
    fn ranges() {
        let mut stream = Stream::default();
        for ms in 1..=5 {
            stream
                .add(Some(StreamId { ms, seq: 0 }), fields(&[("n", "x")]))
                .unwrap();
        }
        let slice = stream.range(StreamId { ms: 2, seq: 0 }, StreamId { ms: 4, seq: 0 });
        let ids: Vec<u64> = slice.iter().map(|entry| entry.id.ms).collect();
        assert_eq!(ids, [2, 3, 4]);

        let all = stream.range(StreamId::ZERO, StreamId::MAX);
        assert_eq!(all.len(), 5);

        let after: Vec<u64> = stream
            .after(StreamId { ms: 3, seq: 0 })
            .iter()
            .map(|entry| entry.id.ms)
            .collect();
        assert_eq!(after, [4, 5]);
    }

    #[test]
    fn remove_and_get() {
        let mut stream = Stream::default();
        let a = stream.add(Some(StreamId { ms: 1, seq: 0 }), fields(&[])).unwrap();
        let b = stream.add(Some(StreamId { ms: 2, seq: 0 }), fields(&[])).unwrap();
        assert!(stream.get(a).is_some());
        assert_eq!(stream.remove(&[a, StreamId { ms: 9, seq: 9 }]), 1);
        assert!(stream.get(a).is_none());
        assert!(stream.get(b).is_some());
        assert_eq!(stream.len(), 1);
        // The id space does not reopen after deletion.
        assert_eq!(stream.add(Some(a), fields(&[])), Err(IdTooSmall));
    }

    #[test]
    fn trim_keeps_tail() {
        let mut stream = Stream::default();
        for ms in 1..=10 {
            stream
                .add(Some(StreamId { ms, seq: 0 }), fields(&[("n", "x")]))
                .unwrap();
        }
        assert_eq!(stream.trim_maxlen(3), 7);
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.first().unwrap().id.ms, 8);
        // Index was rebuilt: trimmed ids are gone, survivors remain.
        assert!(stream.get(StreamId { ms: 1, seq: 0 }).is_none());
        assert!(stream.get(StreamId { ms: 9, seq: 0 }).is_some());
        assert_eq!(stream.trim_maxlen(5), 0);
    }

    #[test]
    fn group_ack_and_holder() {
        let mut group = Group::default();
        let id = StreamId { ms: 1, seq: 0 };
        group.consumers.entry(Bytes::from("alice")).or_default().pending.insert(
            id,
            Pending {
                claimed_ms: 0,
                deliveries: 1,
            },
        );
        assert_eq!(group.pending_len(), 1);
        assert_eq!(group.holder(id), Some(&Bytes::from("alice")));
        assert!(group.ack(id));
        assert!(!group.ack(id));
        assert_eq!(group.pending_len(), 0);
    }
}
