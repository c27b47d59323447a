mod hash;
mod list;
mod set;
mod sorted_set;
mod stream;
mod string;

pub use hash::Hash;
pub use list::{Edge, List, Placement};
pub use set::Set;
pub use sorted_set::SortedSet;
pub use stream::{Consumer, Group, IdTooSmall, Pending, Stream, StreamEntry, StreamId};
pub use string::{Str, EMBED_MAX};

/// An operation reached a key holding an incompatible type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueError {
    WrongType,
}

/// The payload of an object: one variant per abstract type.
#[derive(Clone, Debug)]
pub enum Value {
    Str(Str),
    List(List),
    Hash(Hash),
    Set(Set),
    SortedSet(SortedSet),
    Stream(Stream),
}

macro_rules! accessors {
    ($as:ident, $mut_:ident, $variant:ident, $type:ty) => {
        pub fn $as(&self) -> Result<&$type, ValueError> {
            match self {
                Value::$variant(value) => Ok(value),
                _ => Err(ValueError::WrongType),
            }
        }

        pub fn $mut_(&mut self) -> Result<&mut $type, ValueError> {
            match self {
                Value::$variant(value) => Ok(value),
                _ => Err(ValueError::WrongType),
            }
        }
    };
}

impl Value {
    /// The type name reported by TYPE.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }

    /// The representation name reported by OBJECT ENCODING.
    pub fn encoding(&self) -> &'static str {
        match self {
            Value::Str(value) => value.encoding(),
            Value::List(_) => "linkedlist",
            Value::Hash(_) => "hashtable",
            Value::Set(_) => "hashtable",
            Value::SortedSet(_) => "skiplist",
            Value::Stream(_) => "stream",
        }
    }

    accessors!(as_str, mut_str, Str, Str);
    accessors!(as_list, mut_list, List, List);
    accessors!(as_hash, mut_hash, Hash, Hash);
    accessors!(as_set, mut_set, Set, Set);
    accessors!(as_sorted_set, mut_sorted_set, SortedSet, SortedSet);
    accessors!(as_stream, mut_stream, Stream, Stream);

    /// Containers are deleted from the keyspace when they empty out.
    /// Strings and streams persist (a stream keeps its last id and groups).
    pub fn is_spent(&self) -> bool {
        match self {
            Value::Str(_) | Value::Stream(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::SortedSet(set) => set.is_empty(),
        }
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        match self {
            Value::Str(value) => value.mem_usage(),
            Value::List(value) => value.mem_usage(),
            Value::Hash(value) => value.mem_usage(),
            Value::Set(value) => value.mem_usage(),
            Value::SortedSet(value) => value.mem_usage(),
            Value::Stream(value) => value.mem_usage(),
        }
    }
}

impl From<Str> for Value {
    fn from(value: Str) -> Self {
        Value::Str(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Value::List(value)
    }
}

impl From<Hash> for Value {
    fn from(value: Hash) -> Self {
        Value::Hash(value)
    }
}

impl From<Set> for Value {
    fn from(value: Set) -> Self {
        Value::Set(value)
    }
}

impl From<SortedSet> for Value {
    fn from(value: SortedSet) -> Self {
        Value::SortedSet(value)
    }
}

impl From<Stream> for Value {
    fn from(value: Stream) -> Self {
        Value::Stream(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_encodings() {
        assert_eq!(Value::from(Str::from(7)).kind(), "string");
        assert_eq!(Value::from(Str::from(7)).encoding(), "int");
        assert_eq!(Value::from(List::default()).kind(), "list");
        assert_eq!(Value::from(SortedSet::default()).encoding(), "skiplist");
        assert_eq!(Value::from(Stream::default()).kind(), "stream");
    }

    #[test]
    fn wrong_type() {
        let value = Value::from(Str::from(7));
        assert!(value.as_str().is_ok());
        assert_eq!(value.as_list().unwrap_err(), ValueError::WrongType);
        assert_eq!(value.as_hash().unwrap_err(), ValueError::WrongType);
    }

    #[test]
    fn spent_containers() {
        assert!(Value::from(List::default()).is_spent());
        assert!(Value::from(Set::default()).is_spent());
        assert!(!Value::from(Str::empty()).is_spent());
        assert!(!Value::from(Stream::default()).is_spent());

        let mut set = Set::default();
        set.add(b"m");
        assert!(!Value::from(set).is_spent());
    }
}
