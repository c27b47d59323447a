use bytes::Bytes;
use std::collections::VecDeque;

/// Which end of a list an operation applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edge {
    Left,
    Right,
}

/// Where LINSERT places the new element relative to the pivot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placement {
    Before,
    After,
}

/// A list of byte strings with O(1) pushes and pops at both ends.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct List {
    items: VecDeque<Bytes>,
}

impl List {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, edge: Edge, value: Bytes) {
        match edge {
            Edge::Left => self.items.push_front(value),
            Edge::Right => self.items.push_back(value),
        }
    }

    pub fn pop(&mut self, edge: Edge) -> Option<Bytes> {
        match edge {
            Edge::Left => self.items.pop_front(),
            Edge::Right => self.items.pop_back(),
        }
    }

    /// Resolve a possibly negative index to a position, or `None` when it
    /// falls outside the list.
    fn position(&self, index: i64) -> Option<usize> {
        let len = i64::try_from(self.items.len()).ok()?;
        let index = if index < 0 { len + index } else { index };
        if (0..len).contains(&index) {
            usize::try_from(index).ok()
        } else {
            None
        }
    }

    pub fn get(&self, index: i64) -> Option<&Bytes> {
        self.items.get(self.position(index)?)
    }

    /// Replace the element at `index`. Returns `false` when out of range.
    pub fn set(&mut self, index: i64, value: Bytes) -> bool {
        match self.position(index) {
            Some(at) => {
                self.items[at] = value;
                true
            }
            None => false,
        }
    }

    /// Clamp an LRANGE/LTRIM style `(start, stop)` pair to element bounds.
    /// `None` means the range is empty.
    fn clamp(&self, start: i64, stop: i64) -> Option<(usize, usize)> {
        let len = i64::try_from(self.items.len()).ok()?;
        if len == 0 {
            return None;
        }
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len || stop < 0 {
            return None;
        }
        Some((
            usize::try_from(start).ok()?,
            usize::try_from(stop).ok()?,
        ))
    }

    pub fn range(&self, start: i64, stop: i64) -> impl Iterator<Item = &Bytes> {
        let (start, stop) = self.clamp(start, stop).unwrap_or((1, 0));
        self.items
            .iter()
            .skip(start)
            .take(stop.wrapping_sub(start).wrapping_add(1))
    }

    /// Keep only the elements within `(start, stop)`.
    pub fn trim(&mut self, start: i64, stop: i64) {
        match self.clamp(start, stop) {
            Some((start, stop)) => {
                self.items.truncate(stop + 1);
                self.items.drain(..start);
            }
            None => self.items.clear(),
        }
    }

    /// Remove up to `count` occurrences of `value`: positive counts scan
    /// head to tail, negative tail to head, zero removes all.
    pub fn remove(&mut self, count: i64, value: &[u8]) -> usize {
        let limit = match count {
            0 => usize::MAX,
            n => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
        };

        let mut removed = 0;
        if count >= 0 {
            let mut index = 0;
            while index < self.items.len() && removed < limit {
                if self.items[index] == value {
                    self.items.remove(index);
                    removed += 1;
                } else {
                    index += 1;
                }
            }
        } else {
            let mut index = self.items.len();
            while index > 0 && removed < limit {
                index -= 1;
                if self.items[index] == value {
                    self.items.remove(index);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Insert `value` before or after the first occurrence of `pivot`.
    /// Returns the new length, or `None` when the pivot is absent.
    pub fn insert(&mut self, placement: Placement, pivot: &[u8], value: Bytes) -> Option<usize> {
        let at = self.items.iter().position(|item| item == pivot)?;
        let at = match placement {
            Placement::Before => at,
            Placement::After => at + 1,
        };
        self.items.insert(at, value);
        Some(self.items.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.items.iter()
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        self.items.iter().map(|item| item.len() + 16).sum::<usize>() + 32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> List {
        let mut list = List::default();
        for item in items {
            list.push(Edge::Right, Bytes::copy_from_slice(item.as_bytes()));
        }
        list
    }

    fn contents(list: &List) -> Vec<String> {
        list.iter()
            .map(|item| String::from_utf8_lossy(item).into_owned())
            .collect()
    }

    #[test]
    fn push_and_pop_both_ends() {
        let mut l = List::default();
        l.push(Edge::Right, "b".into());
        l.push(Edge::Left, "a".into());
        l.push(Edge::Right, "c".into());
        assert_eq!(contents(&l), ["a", "b", "c"]);
        assert_eq!(l.pop(Edge::Left), Some("a".into()));
        assert_eq!(l.pop(Edge::Right), Some("c".into()));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn negative_indices() {
        let l = list(&["a", "b", "c"]);
        assert_eq!(l.get(0), Some(&Bytes::from("a")));
        assert_eq!(l.get(-1), Some(&Bytes::from("c")));
        assert_eq!(l.get(-3), Some(&Bytes::from("a")));
        assert_eq!(l.get(3), None);
        assert_eq!(l.get(-4), None);
    }

    #[test]
    fn ranges_clamp() {
        let l = list(&["a", "b", "c", "d"]);
        let all: Vec<_> = l.range(0, -1).collect();
        assert_eq!(all.len(), 4);
        let mid: Vec<_> = l.range(1, 2).collect();
        assert_eq!(mid, [&Bytes::from("b"), &Bytes::from("c")]);
        assert_eq!(l.range(2, 1).count(), 0);
        assert_eq!(l.range(10, 20).count(), 0);
        assert_eq!(l.range(-100, 100).count(), 4);
    }

    #[test]
    fn trim() {
        let mut l = list(&["a", "b", "c", "d"]);
        l.trim(1, 2);
        assert_eq!(contents(&l), ["b", "c"]);
        l.trim(5, 10);
        assert!(l.is_empty());
    }

    #[test]
    fn remove_directions() {
        let mut l = list(&["x", "y", "x", "y", "x"]);
        assert_eq!(l.remove(1, b"x"), 1);
        assert_eq!(contents(&l), ["y", "x", "y", "x"]);

        let mut l = list(&["x", "y", "x", "y", "x"]);
        assert_eq!(l.remove(-2, b"x"), 2);
        assert_eq!(contents(&l), ["x", "y", "y"]);

        let mut l = list(&["x", "y", "x"]);
        assert_eq!(l.remove(0, b"x"), 2);
        assert_eq!(contents(&l), ["y"]);

        assert_eq!(l.remove(0, b"missing"), 0);
    }

    #[test]
    fn insert_around_pivot() {
        let mut l = list(&["a", "c"]);
        assert_eq!(l.insert(Placement::Before, b"c", "b".into()), Some(3));
        assert_eq!(l.insert(Placement::After, b"c", "d".into()), Some(4));
        assert_eq!(contents(&l), ["a", "b", "c", "d"]);
        assert_eq!(l.insert(Placement::Before, b"zz", "x".into()), None);
    }

    #[test]
    fn set_in_place() {
        let mut l = list(&["a", "b"]);
        assert!(l.set(-1, "z".into()));
        assert_eq!(contents(&l), ["a", "z"]);
        assert!(!l.set(5, "q".into()));
    }
}
