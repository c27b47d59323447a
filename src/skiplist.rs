//! A skiplist over `(score, member)` pairs with per-lane spans for
//! O(log n) rank queries. Nodes live in a `Vec` arena and link by index,
//! with a free list for recycled slots.

use bytes::Bytes;
use ordered_float::NotNan;
use rand::Rng;
use std::ops::{Bound, Range, RangeBounds};

/// The maximum number of lanes in a node.
const MAX_LEVEL: usize = 32;

/// The chance of promoting a node one more level.
const P: f64 = 0.25;

/// The arena index of the head sentinel.
const HEAD: u32 = 0;

/// The "null" arena index.
const NIL: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct Lane {
    /// The next node at this level.
    next: u32,

    /// The number of nodes this link skips, including the target.
    span: usize,
}

impl Default for Lane {
    fn default() -> Self {
        Lane { next: NIL, span: 0 }
    }
}

#[derive(Debug)]
struct Node {
    score: NotNan<f64>,
    member: Bytes,
    prev: u32,
    lanes: Vec<Lane>,
}

/// Ordered set of `(score, member)` with lexicographic member tie-break.
#[derive(Debug)]
pub struct Skiplist {
    nodes: Vec<Node>,
    free: Vec<u32>,
    tail: u32,
    level: usize,
    len: usize,
}

/// Which end of the list to pop from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum End {
    Min,
    Max,
}

impl Default for Skiplist {
    fn default() -> Self {
        Skiplist {
            nodes: vec![Node {
                score: NotNan::new(0.0).expect("zero is not NaN"),
                member: Bytes::new(),
                prev: NIL,
                lanes: vec![Lane::default(); MAX_LEVEL],
            }],
            free: Vec::new(),
            tail: NIL,
            level: 1,
            len: 0,
        }
    }
}

impl Clone for Skiplist {
    fn clone(&self) -> Self {
        let mut list = Skiplist::default();
        for (score, member) in self.iter() {
            list.insert(NotNan::new(score).expect("scores are never NaN"), member.clone());
        }
        list
    }
}

impl PartialEq for Skiplist {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Skiplist {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }

    fn lane(&self, index: u32, level: usize) -> Lane {
        self.nodes[index as usize].lanes[level]
    }

    /// Is the node strictly before the `(score, member)` pair?
    fn before_pair(&self, index: u32, score: f64, member: &[u8]) -> bool {
        let node = self.node(index);
        (*node.score, &node.member[..]) < (score, member)
    }

    fn is_pair(&self, index: u32, score: f64, member: &[u8]) -> bool {
        let node = self.node(index);
        *node.score == score && node.member == member
    }

    /// Is the node entirely before the start of `bounds`?
    fn before_bounds<R: RangeBounds<f64>>(&self, index: u32, bounds: &R) -> bool {
        let score = *self.node(index).score;
        match bounds.start_bound() {
            Bound::Excluded(start) => score <= *start,
            Bound::Included(start) => score < *start,
            Bound::Unbounded => false,
        }
    }

    /// Is the node entirely after the end of `bounds`?
    fn after_bounds<R: RangeBounds<f64>>(&self, index: u32, bounds: &R) -> bool {
        let score = *self.node(index).score;
        match bounds.end_bound() {
            Bound::Excluded(end) => score >= *end,
            Bound::Included(end) => score > *end,
            Bound::Unbounded => false,
        }
    }

    fn random_level() -> usize {
        let mut rng = rand::thread_rng();
        let mut level = 1;
        while level < MAX_LEVEL && rng.r#gen::<f64>() < P {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, score: NotNan<f64>, member: Bytes, level: usize) -> u32 {
        let node = Node {
            score,
            member,
            prev: NIL,
            lanes: vec![Lane::default(); level],
        };
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = node;
            index
        } else {
            self.nodes.push(node);
            u32::try_from(self.nodes.len() - 1).expect("skiplist arena overflow")
        }
    }

    /// Walk down the lanes collecting, per level, the last node before the
    /// insert position of `(score, member)` and the rank walked so far.
    fn search(&self, score: f64, member: &[u8]) -> ([u32; MAX_LEVEL], [usize; MAX_LEVEL]) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            rank[i] = if i + 1 == self.level { 0 } else { rank[i + 1] };
            loop {
                let lane = self.lane(x, i);
                if lane.next != NIL && self.before_pair(lane.next, score, member) {
                    rank[i] += lane.span;
                    x = lane.next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        (update, rank)
    }

    /// Insert a pair. The caller keeps members unique; inserting a pair
    /// that is already present is a no-op.
    pub fn insert(&mut self, score: NotNan<f64>, member: Bytes) {
        let (mut update, mut rank) = self.search(*score, &member);

        let first = self.lane(update[0], 0).next;
        if first != NIL && self.is_pair(first, *score, &member) {
            return;
        }

        let level = Self::random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD as usize].lanes[i].span = self.len;
            }
            self.level = level;
        }

        let index = self.alloc(score, member, level);

        for i in 0..level {
            let at = update[i] as usize;
            let stop = self.nodes[at].lanes[i];
            let walked = rank[0] - rank[i];

            self.nodes[index as usize].lanes[i] = Lane {
                next: stop.next,
                span: stop.span - walked,
            };
            self.nodes[at].lanes[i] = Lane {
                next: index,
                span: walked + 1,
            };
        }

        for i in level..self.level {
            self.nodes[update[i] as usize].lanes[i].span += 1;
        }

        self.nodes[index as usize].prev = if update[0] == HEAD { NIL } else { update[0] };
        let next = self.lane(index, 0).next;
        if next == NIL {
            self.tail = index;
        } else {
            self.nodes[next as usize].prev = index;
        }

        self.len += 1;
    }

    fn unlink(&mut self, index: u32, update: &[u32; MAX_LEVEL]) {
        for i in 0..self.level {
            let at = update[i] as usize;
            if self.nodes[at].lanes[i].next == index {
                let removed = self.lane(index, i);
                self.nodes[at].lanes[i].span += removed.span;
                self.nodes[at].lanes[i].span -= 1;
                self.nodes[at].lanes[i].next = removed.next;
            } else {
                self.nodes[at].lanes[i].span -= 1;
            }
        }

        let next = self.lane(index, 0).next;
        if next == NIL {
            self.tail = self.node(index).prev;
        } else {
            self.nodes[next as usize].prev = self.node(index).prev;
        }

        while self.level > 1 && self.lane(HEAD, self.level - 1).next == NIL {
            self.level -= 1;
        }

        // Recycle the slot. The member is replaced so its bytes drop now.
        self.nodes[index as usize].member = Bytes::new();
        self.nodes[index as usize].lanes = Vec::new();
        self.free.push(index);
        self.len -= 1;
    }

    /// Remove a pair. Returns `true` when it was present.
    pub fn remove(&mut self, score: f64, member: &[u8]) -> bool {
        let (update, _) = self.search(score, member);
        let index = self.lane(update[0], 0).next;
        if index != NIL && self.is_pair(index, score, member) {
            self.unlink(index, &update);
            true
        } else {
            false
        }
    }

    /// The 0-based rank of a pair.
    pub fn rank(&self, score: f64, member: &[u8]) -> Option<usize> {
        let mut x = HEAD;
        let mut walked = 0;

        for i in (0..self.level).rev() {
            loop {
                let lane = self.lane(x, i);
                if lane.next == NIL {
                    break;
                }
                let next = self.node(lane.next);
                if (*next.score, &next.member[..]) <= (score, member) {
                    walked += lane.span;
                    x = lane.next;
                } else {
                    break;
                }
            }
            if x != HEAD && self.is_pair(x, score, member) {
                return Some(walked - 1);
            }
        }

        None
    }

    /// The arena index of the node at 0-based rank `n`.
    fn nth(&self, n: usize) -> Option<u32> {
        if n >= self.len {
            return None;
        }
        let target = n + 1;
        let mut x = HEAD;
        let mut walked = 0;

        for i in (0..self.level).rev() {
            loop {
                let lane = self.lane(x, i);
                if lane.next != NIL && walked + lane.span <= target {
                    walked += lane.span;
                    x = lane.next;
                } else {
                    break;
                }
            }
            if walked == target {
                return Some(x);
            }
        }

        None
    }

    /// First node within `bounds` and its 0-based rank.
    fn first_in<R: RangeBounds<f64>>(&self, bounds: &R) -> Option<(u32, usize)> {
        let mut x = HEAD;
        let mut walked = 0;

        for i in (0..self.level).rev() {
            loop {
                let lane = self.lane(x, i);
                if lane.next != NIL && self.before_bounds(lane.next, bounds) {
                    walked += lane.span;
                    x = lane.next;
                } else {
                    break;
                }
            }
        }

        let first = self.lane(x, 0).next;
        if first == NIL || self.after_bounds(first, bounds) {
            None
        } else {
            Some((first, walked))
        }
    }

    /// Last node within `bounds` and its 0-based rank.
    fn last_in<R: RangeBounds<f64>>(&self, bounds: &R) -> Option<(u32, usize)> {
        let mut x = HEAD;
        let mut walked = 0;

        for i in (0..self.level).rev() {
            loop {
                let lane = self.lane(x, i);
                if lane.next != NIL && !self.after_bounds(lane.next, bounds) {
                    walked += lane.span;
                    x = lane.next;
                } else {
                    break;
                }
            }
        }

        if x == HEAD || self.before_bounds(x, bounds) {
            None
        } else {
            Some((x, walked - 1))
        }
    }

    /// The number of pairs with scores within `bounds`.
    pub fn count<R: RangeBounds<f64>>(&self, bounds: &R) -> usize {
        match (self.first_in(bounds), self.last_in(bounds)) {
            (Some((_, first)), Some((_, last))) => last - first + 1,
            _ => 0,
        }
    }

    /// Pop the pair at one end of the list.
    pub fn pop(&mut self, end: End) -> Option<(f64, Bytes)> {
        let index = match end {
            End::Min => self.lane(HEAD, 0).next,
            End::Max => self.tail,
        };
        if index == NIL {
            return None;
        }
        let score = *self.node(index).score;
        let member = self.node(index).member.clone();
        self.remove(score, &member);
        Some((score, member))
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter::forward(self, self.lane(HEAD, 0).next, self.len)
    }

    pub fn iter_rev(&self) -> Iter<'_> {
        Iter::backward(self, self.tail, self.len)
    }

    /// Pairs with 0-based ranks in `range`, ascending.
    pub fn range_by_rank(&self, range: Range<usize>) -> Iter<'_> {
        let end = range.end.min(self.len);
        let len = end.saturating_sub(range.start);
        let start = if len == 0 { None } else { self.nth(range.start) };
        Iter::forward(self, start.unwrap_or(NIL), len)
    }

    /// Pairs with 0-based ranks in `range`, descending.
    pub fn rev_range_by_rank(&self, range: Range<usize>) -> Iter<'_> {
        let end = range.end.min(self.len);
        let len = end.saturating_sub(range.start);
        let start = if len == 0 { None } else { self.nth(end - 1) };
        Iter::backward(self, start.unwrap_or(NIL), len)
    }

    /// Pairs with scores within `bounds`, ascending.
    pub fn range_by_score<R: RangeBounds<f64>>(&self, bounds: &R) -> Iter<'_> {
        match self.first_in(bounds) {
            Some((index, _)) => Iter::forward(self, index, self.count(bounds)),
            None => Iter::forward(self, NIL, 0),
        }
    }

    /// Pairs with scores within `bounds`, descending.
    pub fn rev_range_by_score<R: RangeBounds<f64>>(&self, bounds: &R) -> Iter<'_> {
        match self.last_in(bounds) {
            Some((index, _)) => Iter::backward(self, index, self.count(bounds)),
            None => Iter::backward(self, NIL, 0),
        }
    }

    /// Remove every pair with a score within `bounds`, calling `removed`
    /// for each. Returns the number removed.
    pub fn remove_range_by_score<R, F>(&mut self, bounds: &R, mut removed: F) -> usize
    where
        R: RangeBounds<f64>,
        F: FnMut(f64, &Bytes),
    {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let lane = self.lane(x, i);
                if lane.next != NIL && self.before_bounds(lane.next, bounds) {
                    x = lane.next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let mut count = 0;
        let mut current = self.lane(x, 0).next;
        while current != NIL && !self.after_bounds(current, bounds) {
            let next = self.lane(current, 0).next;
            let score = *self.node(current).score;
            let member = self.node(current).member.clone();
            removed(score, &member);
            self.unlink(current, &update);
            current = next;
            count += 1;
        }

        count
    }

    /// Remove every pair with a 0-based rank within `range`, calling
    /// `removed` for each. Returns the number removed.
    pub fn remove_range_by_rank<F>(&mut self, range: Range<usize>, mut removed: F) -> usize
    where
        F: FnMut(f64, &Bytes),
    {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        let mut walked = 0;
        for i in (0..self.level).rev() {
            loop {
                let lane = self.lane(x, i);
                if lane.next != NIL && walked + lane.span < range.start + 1 {
                    walked += lane.span;
                    x = lane.next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let mut count = 0;
        let mut index = range.start;
        let mut current = self.lane(x, 0).next;
        while current != NIL && index < range.end {
            let next = self.lane(current, 0).next;
            let score = *self.node(current).score;
            let member = self.node(current).member.clone();
            removed(score, &member);
            self.unlink(current, &update);
            current = next;
            index += 1;
            count += 1;
        }

        count
    }
}

/// An iterator over `(score, &member)` pairs.
pub struct Iter<'a> {
    list: &'a Skiplist,
    node: u32,
    remaining: usize,
    reverse: bool,
}

impl<'a> Iter<'a> {
    fn forward(list: &'a Skiplist, node: u32, remaining: usize) -> Self {
        Iter {
            list,
            node,
            remaining,
            reverse: false,
        }
    }

    fn backward(list: &'a Skiplist, node: u32, remaining: usize) -> Self {
        Iter {
            list,
            node,
            remaining,
            reverse: true,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (f64, &'a Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.node == NIL {
            return None;
        }
        let node = self.list.node(self.node);
        self.node = if self.reverse {
            node.prev
        } else {
            node.lanes[0].next
        };
        self.remaining -= 1;
        Some((*node.score, &node.member))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn nn(score: f64) -> NotNan<f64> {
        NotNan::new(score).unwrap()
    }

    fn list(pairs: &[(f64, &str)]) -> Skiplist {
        let mut list = Skiplist::default();
        for (score, member) in pairs {
            list.insert(nn(*score), Bytes::copy_from_slice(member.as_bytes()));
        }
        list
    }

    fn collect(iter: Iter<'_>) -> Vec<(f64, String)> {
        iter.map(|(score, member)| {
            (score, String::from_utf8_lossy(member).into_owned())
        })
        .collect()
    }

    #[test]
    fn ordered_by_score_then_member() {
        let list = list(&[(2.0, "b"), (1.0, "z"), (1.0, "a"), (3.0, "c")]);
        let items = collect(list.iter());
        assert_eq!(
            items,
            vec![
                (1.0, "a".into()),
                (1.0, "z".into()),
                (2.0, "b".into()),
                (3.0, "c".into()),
            ]
        );
    }

    #[test]
    fn insert_is_idempotent_per_pair() {
        let mut l = list(&[(1.0, "a")]);
        l.insert(nn(1.0), Bytes::from_static(b"a"));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn remove_and_recycle() {
        let mut l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        assert!(l.remove(2.0, b"b"));
        assert!(!l.remove(2.0, b"b"));
        assert_eq!(l.len(), 2);
        l.insert(nn(2.5), Bytes::from_static(b"d"));
        let items = collect(l.iter());
        assert_eq!(
            items,
            vec![(1.0, "a".into()), (2.5, "d".into()), (3.0, "c".into())]
        );
    }

    #[test]
    fn rank_counts_spans() {
        let l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        assert_eq!(l.rank(1.0, b"a"), Some(0));
        assert_eq!(l.rank(3.0, b"c"), Some(2));
        assert_eq!(l.rank(4.0, b"d"), Some(3));
        assert_eq!(l.rank(3.0, b"missing"), None);
        assert_eq!(l.rank(9.0, b"a"), None);
    }

    #[test]
    fn rank_ranges() {
        let l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        assert_eq!(
            collect(l.range_by_rank(1..3)),
            vec![(2.0, "b".into()), (3.0, "c".into())]
        );
        assert_eq!(
            collect(l.rev_range_by_rank(1..3)),
            vec![(3.0, "c".into()), (2.0, "b".into())]
        );
        assert_eq!(collect(l.range_by_rank(3..10)), vec![(4.0, "d".into())]);
        assert!(collect(l.range_by_rank(8..9)).is_empty());
    }

    #[test]
    fn score_ranges() {
        let l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        assert_eq!(l.count(&(2.0..=3.0)), 2);
        assert_eq!(l.count(&(..)), 4);
        assert_eq!(l.count(&(5.0..)), 0);
        assert_eq!(
            collect(l.range_by_score(&(2.0..=3.0))),
            vec![(2.0, "b".into()), (3.0, "c".into())]
        );
        assert_eq!(
            collect(l.rev_range_by_score(&(2.0..))),
            vec![(4.0, "d".into()), (3.0, "c".into()), (2.0, "b".into())]
        );
        // Exclusive lower bound, as in ZRANGEBYSCORE (1 +inf.
        let bounds = (Bound::Excluded(1.0), Bound::Unbounded);
        assert_eq!(
            collect(l.range_by_score(&bounds)),
            vec![(2.0, "b".into()), (3.0, "c".into()), (4.0, "d".into())]
        );
    }

    #[test]
    fn pop_ends() {
        let mut l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        assert_eq!(l.pop(End::Min), Some((1.0, Bytes::from_static(b"a"))));
        assert_eq!(l.pop(End::Max), Some((3.0, Bytes::from_static(b"c"))));
        assert_eq!(l.pop(End::Max), Some((2.0, Bytes::from_static(b"b"))));
        assert_eq!(l.pop(End::Min), None);
    }

    #[test]
    fn remove_ranges() {
        let mut l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d"), (5.0, "e")]);
        let mut gone = Vec::new();
        let removed = l.remove_range_by_score(&(2.0..4.0), |_, member| {
            gone.push(member.clone());
        });
        assert_eq!(removed, 2);
        assert_eq!(gone, vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
        assert_eq!(
            collect(l.iter()),
            vec![(1.0, "a".into()), (4.0, "d".into()), (5.0, "e".into())]
        );

        let removed = l.remove_range_by_rank(0..2, |_, _| {});
        assert_eq!(removed, 2);
        assert_eq!(collect(l.iter()), vec![(5.0, "e".into())]);
    }

    #[test]
    fn reverse_iter_follows_prev_links() {
        let l = list(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        assert_eq!(
            collect(l.iter_rev()),
            vec![(3.0, "c".into()), (2.0, "b".into()), (1.0, "a".into())]
        );
    }
}

#[cfg(test)]
#[cfg(not(miri))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Whatever the insertion order, iteration equals the multiset
        // sorted by (score, member), and rank matches the sorted index.
        #[test]
        fn sorted_and_ranked(pairs in proptest::collection::vec((0i32..50, "[a-z]{1,6}"), 0..80)) {
            let mut list = Skiplist::default();
            let mut expected: Vec<(f64, Vec<u8>)> = Vec::new();

            for (score, member) in &pairs {
                let score = f64::from(*score);
                let member = member.clone().into_bytes();
                if !expected.iter().any(|(s, m)| *s == score && *m == member) {
                    expected.push((score, member.clone()));
                }
                list.insert(NotNan::new(score).unwrap(), member.into());
            }

            expected.sort_by(|a, b| {
                a.0.partial_cmp(&b.0).unwrap().then_with(|| a.1.cmp(&b.1))
            });

            let actual: Vec<(f64, Vec<u8>)> = list
                .iter()
                .map(|(score, member)| (score, member.to_vec()))
                .collect();
            prop_assert_eq!(&actual, &expected);

            for (index, (score, member)) in expected.iter().enumerate() {
                prop_assert_eq!(list.rank(*score, member), Some(index));
            }
        }
    }
}
