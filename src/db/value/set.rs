use crate::dict::Dict;
use bytes::Bytes;
use rand::seq::SliceRandom;

/// A set of byte strings.
#[derive(Clone, Debug, Default)]
pub struct Set {
    members: Dict<()>,
}

impl Set {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains(member)
    }

    /// Returns `true` when the member was not already present.
    pub fn add(&mut self, member: &[u8]) -> bool {
        self.members.set_if_absent(member, ())
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.remove(member).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.members.keys()
    }

    pub fn scan(&self, cursor: u64, mut emit: impl FnMut(&Bytes)) -> u64 {
        self.members.scan(cursor, |member, _| emit(member))
    }

    pub fn random_member(&self) -> Option<&Bytes> {
        self.members.random_entry().map(|(member, _)| member)
    }

    /// A random sample of distinct members.
    pub fn random_members(&self, count: usize) -> Vec<Bytes> {
        let mut all: Vec<Bytes> = self.iter().cloned().collect();
        all.shuffle(&mut rand::thread_rng());
        all.truncate(count);
        all
    }

    pub fn intersect<'a>(&'a self, others: &'a [&'a Set]) -> impl Iterator<Item = &'a Bytes> {
        self.iter()
            .filter(move |member| others.iter().all(|other| other.contains(member)))
    }

    pub fn difference<'a>(&'a self, others: &'a [&'a Set]) -> impl Iterator<Item = &'a Bytes> {
        self.iter()
            .filter(move |member| !others.iter().any(|other| other.contains(member)))
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        self.iter().map(|member| member.len() + 40).sum::<usize>() + 64
    }
}

impl FromIterator<Bytes> for Set {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        let mut set = Set::default();
        for member in iter {
            set.add(&member);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(members: &[&str]) -> Set {
        members
            .iter()
            .map(|member| Bytes::copy_from_slice(member.as_bytes()))
            .collect()
    }

    #[test]
    fn add_remove() {
        let mut s = Set::default();
        assert!(s.add(b"a"));
        assert!(!s.add(b"a"));
        assert!(s.contains(b"a"));
        assert!(s.remove(b"a"));
        assert!(!s.remove(b"a"));
    }

    #[test]
    fn set_algebra() {
        let a = set(&["a", "b", "c"]);
        let b = set(&["b", "c", "d"]);
        let c = set(&["c", "d", "e"]);

        let others = [&b, &c];
        let mut inter: Vec<&Bytes> = a.intersect(&others).collect();
        inter.sort();
        assert_eq!(inter, [&Bytes::from("c")]);

        let mut diff: Vec<&Bytes> = a.difference(&others).collect();
        diff.sort();
        assert_eq!(diff, [&Bytes::from("a")]);
    }

    #[test]
    fn random_members_are_distinct() {
        let s = set(&["a", "b", "c", "d", "e"]);
        let sample = s.random_members(3);
        assert_eq!(sample.len(), 3);
        let mut unique = sample.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert_eq!(s.random_members(10).len(), 5);
    }
}
