use crate::dict::Dict;
use bytes::Bytes;
use rand::seq::SliceRandom;

/// A field/value map. Field order is not observable.
#[derive(Clone, Debug, Default)]
pub struct Hash {
    fields: Dict<Bytes>,
}

impl Hash {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bytes> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        self.fields.contains(field)
    }

    /// Upsert. Returns `true` when the field is new.
    pub fn set(&mut self, field: &[u8], value: Bytes) -> bool {
        self.fields.set(field, value).is_none()
    }

    pub fn set_if_absent(&mut self, field: &[u8], value: Bytes) -> bool {
        self.fields.set_if_absent(field, value)
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.fields.iter()
    }

    pub fn scan(&self, cursor: u64, emit: impl FnMut(&Bytes, &Bytes)) -> u64 {
        self.fields.scan(cursor, emit)
    }

    /// A true random sample of distinct fields. With `count` larger than
    /// the hash, every field is returned once.
    pub fn random_fields(&self, count: usize) -> Vec<(Bytes, Bytes)> {
        let mut all: Vec<(Bytes, Bytes)> = self
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        let mut rng = rand::thread_rng();
        all.shuffle(&mut rng);
        all.truncate(count);
        all
    }

    /// A random sample that may repeat fields, for negative HRANDFIELD
    /// counts.
    pub fn random_fields_repeating(&self, count: usize) -> Vec<(Bytes, Bytes)> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some((field, value)) = self.fields.random_entry() {
                out.push((field.clone(), value.clone()));
            }
        }
        out
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        self.iter()
            .map(|(field, value)| field.len() + value.len() + 48)
            .sum::<usize>()
            + 64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn set_get_remove() {
        let mut hash = Hash::default();
        assert!(hash.set(b"f", "1".into()));
        assert!(!hash.set(b"f", "2".into()));
        assert_eq!(hash.get(b"f"), Some(&Bytes::from("2")));
        assert!(hash.remove(b"f"));
        assert!(!hash.remove(b"f"));
        assert!(hash.is_empty());
    }

    #[test]
    fn set_if_absent() {
        let mut hash = Hash::default();
        assert!(hash.set_if_absent(b"f", "1".into()));
        assert!(!hash.set_if_absent(b"f", "2".into()));
        assert_eq!(hash.get(b"f"), Some(&Bytes::from("1")));
    }

    #[test]
    fn random_fields_are_distinct() {
        let mut hash = Hash::default();
        for i in 0..20u8 {
            hash.set(format!("f{i}").as_bytes(), Bytes::from(vec![i]));
        }
        let sample = hash.random_fields(10);
        assert_eq!(sample.len(), 10);
        let distinct: HashSet<_> = sample.iter().map(|(f, _)| f.clone()).collect();
        assert_eq!(distinct.len(), 10);

        // Oversampling returns everything exactly once.
        assert_eq!(hash.random_fields(100).len(), 20);
    }

    #[test]
    fn repeating_sample_has_requested_length() {
        let mut hash = Hash::default();
        hash.set(b"only", "1".into());
        assert_eq!(hash.random_fields_repeating(5).len(), 5);
    }
}
