use crate::{
    dict::Dict,
    skiplist::{End, Iter, Skiplist},
};
use bytes::Bytes;
use ordered_float::NotNan;
use rand::seq::SliceRandom;
use std::ops::{Range, RangeBounds};

/// A sorted set: a member→score map and a `(score, member)` skiplist kept
/// in lock-step. The map answers point lookups, the skiplist everything
/// ordered.
#[derive(Clone, Debug, Default)]
pub struct SortedSet {
    map: Dict<NotNan<f64>>,
    list: Skiplist,
}

impl SortedSet {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.map.contains(member)
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.map.get(member).map(|score| **score)
    }

    /// Upsert a member. Returns `true` when the member is new.
    pub fn insert(&mut self, score: NotNan<f64>, member: Bytes) -> bool {
        match self.map.set(&member, score) {
            Some(old) => {
                if old != score {
                    self.list.remove(*old, &member);
                    self.list.insert(score, member);
                }
                false
            }
            None => {
                self.list.insert(score, member);
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.map.remove(member) {
            Some(score) => {
                self.list.remove(*score, member);
                true
            }
            None => false,
        }
    }

    /// Add `delta` to the member's score, treating a missing member as 0.
    /// `None` when the result would be NaN.
    pub fn incr(&mut self, member: &[u8], delta: f64) -> Option<f64> {
        let base = self.score(member).unwrap_or(0.0);
        let score = NotNan::new(base + delta).ok()?;
        self.insert(score, Bytes::copy_from_slice(member));
        Some(*score)
    }

    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        self.list.rank(score, member)
    }

    pub fn rev_rank(&self, member: &[u8]) -> Option<usize> {
        self.rank(member).map(|rank| self.len() - 1 - rank)
    }

    pub fn iter(&self) -> Iter<'_> {
        self.list.iter()
    }

    pub fn iter_rev(&self) -> Iter<'_> {
        self.list.iter_rev()
    }

    pub fn range_by_rank(&self, range: Range<usize>) -> Iter<'_> {
        self.list.range_by_rank(range)
    }

    pub fn rev_range_by_rank(&self, range: Range<usize>) -> Iter<'_> {
        self.list.rev_range_by_rank(range)
    }

    pub fn range_by_score<R: RangeBounds<f64>>(&self, bounds: &R) -> Iter<'_> {
        self.list.range_by_score(bounds)
    }

    pub fn rev_range_by_score<R: RangeBounds<f64>>(&self, bounds: &R) -> Iter<'_> {
        self.list.rev_range_by_score(bounds)
    }

    pub fn count<R: RangeBounds<f64>>(&self, bounds: &R) -> usize {
        self.list.count(bounds)
    }

    pub fn pop(&mut self, end: End) -> Option<(f64, Bytes)> {
        let (score, member) = self.list.pop(end)?;
        self.map.remove(&member);
        Some((score, member))
    }

    pub fn remove_range_by_rank(&mut self, range: Range<usize>) -> usize {
        let SortedSet { map, list } = self;
        list.remove_range_by_rank(range, |_, member| {
            map.remove(member);
        })
    }

    pub fn remove_range_by_score<R: RangeBounds<f64>>(&mut self, bounds: &R) -> usize {
        let SortedSet { map, list } = self;
        list.remove_range_by_score(bounds, |_, member| {
            map.remove(member);
        })
    }

    pub fn scan(&self, cursor: u64, mut emit: impl FnMut(&Bytes, f64)) -> u64 {
        self.map.scan(cursor, |member, score| emit(member, **score))
    }

    /// A random sample of distinct members with their scores.
    pub fn random_members(&self, count: usize) -> Vec<(Bytes, f64)> {
        let mut all: Vec<(Bytes, f64)> = self
            .iter()
            .map(|(score, member)| (member.clone(), score))
            .collect();
        all.shuffle(&mut rand::thread_rng());
        all.truncate(count);
        all
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        self.iter()
            .map(|(_, member)| 2 * member.len() + 96)
            .sum::<usize>()
            + 64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nn(score: f64) -> NotNan<f64> {
        NotNan::new(score).unwrap()
    }

    fn zset(pairs: &[(f64, &str)]) -> SortedSet {
        let mut set = SortedSet::default();
        for (score, member) in pairs {
            set.insert(nn(*score), Bytes::copy_from_slice(member.as_bytes()));
        }
        set
    }

    fn members(iter: Iter<'_>) -> Vec<String> {
        iter.map(|(_, member)| String::from_utf8_lossy(member).into_owned())
            .collect()
    }

    #[test]
    fn insert_updates_both_structures() {
        let mut set = zset(&[(1.0, "a"), (2.0, "b")]);
        assert!(!set.insert(nn(5.0), Bytes::from_static(b"a")));
        assert_eq!(set.score(b"a"), Some(5.0));
        assert_eq!(members(set.iter()), ["b", "a"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn ranks() {
        let set = zset(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        assert_eq!(set.rank(b"a"), Some(0));
        assert_eq!(set.rank(b"c"), Some(2));
        assert_eq!(set.rev_rank(b"c"), Some(0));
        assert_eq!(set.rank(b"missing"), None);
    }

    #[test]
    fn incr_from_missing() {
        let mut set = SortedSet::default();
        assert_eq!(set.incr(b"m", 2.5), Some(2.5));
        assert_eq!(set.incr(b"m", -1.0), Some(1.5));
        assert_eq!(set.incr(b"m", f64::INFINITY), Some(f64::INFINITY));
        // inf + -inf is NaN.
        assert_eq!(set.incr(b"m", f64::NEG_INFINITY), None);
    }

    #[test]
    fn pops_remove_from_map() {
        let mut set = zset(&[(1.0, "a"), (2.0, "b")]);
        assert_eq!(set.pop(End::Max), Some((2.0, Bytes::from_static(b"b"))));
        assert!(!set.contains(b"b"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn range_removals_stay_in_sync() {
        let mut set = zset(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        assert_eq!(set.remove_range_by_score(&(2.0..=3.0)), 2);
        assert!(!set.contains(b"b"));
        assert!(!set.contains(b"c"));
        assert_eq!(set.remove_range_by_rank(0..1), 1);
        assert!(!set.contains(b"a"));
        assert_eq!(members(set.iter()), ["d"]);
    }

    #[test]
    fn tie_break_is_lexicographic() {
        let set = zset(&[(1.0, "b"), (1.0, "a"), (1.0, "c")]);
        assert_eq!(members(set.iter()), ["a", "b", "c"]);
    }
}
