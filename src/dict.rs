//! An incrementally rehashing hash table in the style of the classic
//! two-table design: writes migrate one bucket at a time from the old
//! table to the new one, so no single operation pays for a full rehash.

use bytes::Bytes;
use hashbrown::DefaultHashBuilder;
use rand::Rng;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicUsize, Ordering},
};

/// The size of the first allocated table.
const INITIAL_SIZE: usize = 4;

/// How many empty buckets a single rehash step will skip before giving up.
const REHASH_VISITS: usize = 64;

/// How many times `random_entry` will probe before giving up.
const RANDOM_ATTEMPTS: usize = 32;

struct Node<V> {
    key: Bytes,
    hash: u64,
    value: V,
    next: Link<V>,
}

type Link<V> = Option<Box<Node<V>>>;

struct Table<V> {
    buckets: Vec<Link<V>>,
    used: usize,
}

impl<V> Table<V> {
    fn empty() -> Self {
        Table {
            buckets: Vec::new(),
            used: 0,
        }
    }

    fn with_size(size: usize) -> Self {
        let mut buckets = Vec::new();
        buckets.resize_with(size, || None);
        Table { buckets, used: 0 }
    }

    fn mask(&self) -> u64 {
        self.buckets.len().wrapping_sub(1) as u64
    }

    fn index(&self, hash: u64) -> usize {
        usize::try_from(hash & self.mask()).unwrap_or(0)
    }

    fn push(&mut self, mut node: Box<Node<V>>) {
        let index = self.index(node.hash);
        node.next = self.buckets[index].take();
        self.buckets[index] = Some(node);
        self.used += 1;
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<&Node<V>> {
        if self.buckets.is_empty() {
            return None;
        }
        let mut link = self.buckets[self.index(hash)].as_deref();
        while let Some(node) = link {
            if node.hash == hash && node.key == key {
                return Some(node);
            }
            link = node.next.as_deref();
        }
        None
    }

    fn find_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut Node<V>> {
        if self.buckets.is_empty() {
            return None;
        }
        let index = self.index(hash);
        let mut link = self.buckets[index].as_deref_mut();
        while let Some(node) = link {
            if node.hash == hash && node.key == key {
                return Some(node);
            }
            link = node.next.as_deref_mut();
        }
        None
    }

    fn take(&mut self, hash: u64, key: &[u8]) -> Option<Box<Node<V>>> {
        if self.buckets.is_empty() {
            return None;
        }
        let index = self.index(hash);
        let mut link = &mut self.buckets[index];
        loop {
            match link {
                None => return None,
                Some(node) if node.hash == hash && node.key == key => {
                    let mut node = link.take()?;
                    *link = node.next.take();
                    self.used -= 1;
                    return Some(node);
                }
                Some(_) => {
                    link = &mut link.as_mut()?.next;
                }
            }
        }
    }
}

/// A map from binary keys to values with incremental rehashing and a
/// rehash-tolerant scan cursor.
pub struct Dict<V> {
    tables: [Table<V>; 2],
    /// The next bucket of table 0 to migrate, or -1 when not rehashing.
    rehash_index: isize,
    /// Live iterators; expansion is deferred while any exist.
    iterators: AtomicUsize,
    hasher: DefaultHashBuilder,
}

impl<V> Default for Dict<V> {
    fn default() -> Self {
        Dict {
            tables: [Table::empty(), Table::empty()],
            rehash_index: -1,
            iterators: AtomicUsize::new(0),
            hasher: DefaultHashBuilder::default(),
        }
    }
}

impl<V> Dict<V> {
    fn hash(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    pub fn is_rehashing(&self) -> bool {
        self.rehash_index >= 0
    }

    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Migrate the next non-empty bucket from table 0 into table 1, and
    /// finish the rehash once table 0 is drained.
    fn rehash_step(&mut self) {
        if !self.is_rehashing() {
            return;
        }

        let len = self.tables[0].buckets.len();
        let mut index = usize::try_from(self.rehash_index).unwrap_or(0);
        let mut visits = 0;

        while index < len && visits < REHASH_VISITS {
            if let Some(mut node) = self.tables[0].buckets[index].take() {
                loop {
                    let next = node.next.take();
                    self.tables[0].used -= 1;
                    self.tables[1].push(node);
                    match next {
                        Some(n) => node = n,
                        None => break,
                    }
                }
                index += 1;
                break;
            }
            index += 1;
            visits += 1;
        }

        self.rehash_index = isize::try_from(index).unwrap_or(isize::MAX);

        if self.tables[0].used == 0 && index >= len {
            self.tables.swap(0, 1);
            self.tables[1] = Table::empty();
            self.rehash_index = -1;
        }
    }

    /// Start a rehash when the load factor reaches 1. No-op while any
    /// iterator is alive or a rehash is already running.
    fn expand_if_needed(&mut self) {
        if self.is_rehashing() || self.iterators.load(Ordering::Relaxed) > 0 {
            return;
        }

        let size = self.tables[0].buckets.len();
        if size == 0 {
            self.tables[0] = Table::with_size(INITIAL_SIZE);
            return;
        }

        if self.tables[0].used >= size {
            self.tables[1] = Table::with_size(size * 2);
            self.rehash_index = 0;
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let hash = self.hash(key);
        if let Some(node) = self.tables[0].find(hash, key) {
            return Some(&node.value);
        }
        if self.is_rehashing() {
            return self.tables[1].find(hash, key).map(|node| &node.value);
        }
        None
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let hash = self.hash(key);
        if self.tables[0].find(hash, key).is_some() {
            return self.tables[0].find_mut(hash, key).map(|node| &mut node.value);
        }
        if self.is_rehashing() {
            return self.tables[1].find_mut(hash, key).map(|node| &mut node.value);
        }
        None
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Upsert. Returns the previous value when the key already existed.
    pub fn set(&mut self, key: &[u8], value: V) -> Option<V> {
        self.rehash_step();
        self.expand_if_needed();

        let hash = self.hash(key);
        for table in &mut self.tables {
            if let Some(node) = table.find_mut(hash, key) {
                return Some(std::mem::replace(&mut node.value, value));
            }
        }

        let target = usize::from(self.is_rehashing());
        self.tables[target].push(Box::new(Node {
            key: Bytes::copy_from_slice(key),
            hash,
            value,
            next: None,
        }));
        None
    }

    /// Insert only when absent. Returns `true` when the value was stored.
    pub fn set_if_absent(&mut self, key: &[u8], value: V) -> bool {
        self.rehash_step();
        self.expand_if_needed();

        let hash = self.hash(key);
        if self.tables[0].find(hash, key).is_some()
            || (self.is_rehashing() && self.tables[1].find(hash, key).is_some())
        {
            return false;
        }

        let target = usize::from(self.is_rehashing());
        self.tables[target].push(Box::new(Node {
            key: Bytes::copy_from_slice(key),
            hash,
            value,
            next: None,
        }));
        true
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        self.rehash_step();
        let hash = self.hash(key);
        for table in &mut self.tables {
            if let Some(node) = table.take(hash, key) {
                return Some(node.value);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.tables = [Table::empty(), Table::empty()];
        self.rehash_index = -1;
    }

    /// Iterate over every entry. Expansion is deferred while the returned
    /// iterator is alive.
    pub fn iter(&self) -> Iter<'_, V> {
        self.iterators.fetch_add(1, Ordering::Relaxed);
        Iter {
            dict: self,
            table: 0,
            bucket: 0,
            node: None,
            started: false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.iter().map(|(key, _)| key)
    }

    /// A uniform-ish random entry, or `None` for an empty dict.
    pub fn random_entry(&self) -> Option<(&Bytes, &V)> {
        if self.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        for _ in 0..RANDOM_ATTEMPTS {
            let table = if self.is_rehashing() {
                usize::from(rng.gen_range(0..self.len()) >= self.tables[0].used)
            } else {
                0
            };
            let buckets = &self.tables[table].buckets;
            if buckets.is_empty() {
                continue;
            }
            let mut link = buckets[rng.gen_range(0..buckets.len())].as_deref();
            let mut chain = Vec::new();
            while let Some(node) = link {
                chain.push(node);
                link = node.next.as_deref();
            }
            if !chain.is_empty() {
                let node = chain[rng.gen_range(0..chain.len())];
                return Some((&node.key, &node.value));
            }
        }

        // Sparse table: fall back to the first populated bucket.
        self.iter().next()
    }

    /// One step of a reverse-bit cursor scan. Emits every entry of the
    /// bucket(s) addressed by `cursor` and returns the next cursor, `0`
    /// when the scan has wrapped. Keys present for the whole scan are
    /// emitted at least once, even across an intervening rehash.
    pub fn scan(&self, cursor: u64, mut emit: impl FnMut(&Bytes, &V)) -> u64 {
        if self.tables[0].buckets.is_empty() {
            return 0;
        }

        let mut v = cursor;

        if !self.is_rehashing() {
            let mask = self.tables[0].mask();
            self.scan_bucket(0, v & mask, &mut emit);
            v |= !mask;
            v = v.reverse_bits().wrapping_add(1).reverse_bits();
            return v;
        }

        // Both tables are live: visit the small-table bucket, then every
        // large-table bucket it expands into.
        let (small, large) = if self.tables[0].buckets.len() <= self.tables[1].buckets.len() {
            (0, 1)
        } else {
            (1, 0)
        };
        let small_mask = self.tables[small].mask();
        let large_mask = self.tables[large].mask();

        self.scan_bucket(small, v & small_mask, &mut emit);
        loop {
            self.scan_bucket(large, v & large_mask, &mut emit);
            v |= !large_mask;
            v = v.reverse_bits().wrapping_add(1).reverse_bits();
            if v & (large_mask ^ small_mask) == 0 {
                break;
            }
        }

        v
    }

    fn scan_bucket(&self, table: usize, index: u64, emit: &mut impl FnMut(&Bytes, &V)) {
        let buckets = &self.tables[table].buckets;
        let Some(bucket) = buckets.get(usize::try_from(index).unwrap_or(usize::MAX)) else {
            return;
        };
        let mut link = bucket.as_deref();
        while let Some(node) = link {
            emit(&node.key, &node.value);
            link = node.next.as_deref();
        }
    }
}

impl<V: Clone> Clone for Dict<V> {
    fn clone(&self) -> Self {
        let mut dict = Dict::default();
        for (key, value) in self.iter() {
            dict.set(key, value.clone());
        }
        dict
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Dict<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, V> {
    dict: &'a Dict<V>,
    table: usize,
    bucket: usize,
    node: Option<&'a Node<V>>,
    started: bool,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a Bytes, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.started {
                if let Some(node) = self.node {
                    self.node = node.next.as_deref();
                    if let Some(next) = self.node {
                        return Some((&next.key, &next.value));
                    }
                }
                self.bucket += 1;
            }
            self.started = true;

            loop {
                let buckets = &self.dict.tables[self.table].buckets;
                if self.bucket >= buckets.len() {
                    if self.table == 0 {
                        self.table = 1;
                        self.bucket = 0;
                        continue;
                    }
                    return None;
                }
                break;
            }

            self.node = self.dict.tables[self.table].buckets[self.bucket].as_deref();
            if let Some(node) = self.node {
                return Some((&node.key, &node.value));
            }
        }
    }
}

impl<V> Drop for Iter<'_, V> {
    fn drop(&mut self) {
        self.dict.iterators.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn set_get_remove() {
        let mut dict = Dict::default();
        assert_eq!(dict.set(b"a", 1), None);
        assert_eq!(dict.set(b"a", 2), Some(1));
        assert_eq!(dict.get(b"a"), Some(&2));
        assert_eq!(dict.remove(b"a"), Some(2));
        assert_eq!(dict.get(b"a"), None);
        assert!(dict.is_empty());
    }

    #[test]
    fn set_if_absent() {
        let mut dict = Dict::default();
        assert!(dict.set_if_absent(b"a", 1));
        assert!(!dict.set_if_absent(b"a", 2));
        assert_eq!(dict.get(b"a"), Some(&1));
    }

    #[test]
    fn grows_through_rehash() {
        let mut dict = Dict::default();
        for i in 0..1000u32 {
            dict.set(format!("key:{i}").as_bytes(), i);
        }
        assert_eq!(dict.len(), 1000);
        for i in 0..1000u32 {
            assert_eq!(dict.get(format!("key:{i}").as_bytes()), Some(&i));
        }
        for i in 0..500u32 {
            assert_eq!(dict.remove(format!("key:{i}").as_bytes()), Some(i));
        }
        assert_eq!(dict.len(), 500);
    }

    #[test]
    fn iter_sees_every_key() {
        let mut dict = Dict::default();
        for i in 0..257u32 {
            dict.set(format!("{i}").as_bytes(), i);
        }
        let seen: HashSet<u32> = dict.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen.len(), 257);
    }

    #[test]
    fn scan_visits_all_stable_keys() {
        let mut dict = Dict::default();
        for i in 0..500u32 {
            dict.set(format!("{i}").as_bytes(), i);
        }

        let mut seen = HashSet::new();
        let mut cursor = 0;
        loop {
            cursor = dict.scan(cursor, |_, v| {
                seen.insert(*v);
            });
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn scan_survives_interleaved_writes() {
        let mut dict = Dict::default();
        for i in 0..128u32 {
            dict.set(format!("stable:{i}").as_bytes(), i);
        }

        let mut seen = HashSet::new();
        let mut cursor = 0;
        let mut round = 0u32;
        loop {
            cursor = dict.scan(cursor, |key, v| {
                if key.starts_with(b"stable:") {
                    seen.insert(*v);
                }
            });
            // Force expansion mid-scan.
            for i in 0..32 {
                dict.set(format!("noise:{round}:{i}").as_bytes(), u32::MAX);
            }
            round += 1;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 128, "a stable key was missed by the scan");
    }

    #[test]
    fn random_entry_hits_all_keys_eventually() {
        let mut dict = Dict::default();
        for i in 0..16u32 {
            dict.set(format!("{i}").as_bytes(), i);
        }
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            let (_, v) = dict.random_entry().unwrap();
            seen.insert(*v);
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn random_entry_empty() {
        let dict: Dict<u32> = Dict::default();
        assert!(dict.random_entry().is_none());
    }
}

#[cfg(test)]
#[cfg(not(miri))]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        // Insert a batch, delete a subset, then a full scan must report
        // every survivor at least once.
        #[test]
        fn scan_reports_survivors(keep in 1usize..400, drop in 0usize..400) {
            let mut dict = Dict::default();
            for i in 0..(keep + drop) {
                dict.set(format!("k{i}").as_bytes(), i);
            }
            for i in keep..(keep + drop) {
                dict.remove(format!("k{i}").as_bytes());
            }

            let mut seen = HashSet::new();
            let mut cursor = 0;
            loop {
                cursor = dict.scan(cursor, |_, v| { seen.insert(*v); });
                if cursor == 0 {
                    break;
                }
            }
            for i in 0..keep {
                prop_assert!(seen.contains(&i));
            }
        }
    }
}
