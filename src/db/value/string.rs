use crate::bytes::{i64_len, parse, parse_i64_exact, Output};
use arrayvec::ArrayVec;
use bytes::Bytes;

/// The longest value stored inline rather than on the heap.
pub const EMBED_MAX: usize = 44;

/// A string value. Exact integers are stored as i64, short strings inline,
/// and everything else as a heap buffer.
#[derive(Clone, Debug)]
pub enum Str {
    Int(i64),
    Embed(ArrayVec<u8, EMBED_MAX>),
    Raw(Vec<u8>),
}

impl Str {
    pub fn empty() -> Self {
        Str::Embed(ArrayVec::new())
    }

    /// The encoding name reported by OBJECT ENCODING.
    pub fn encoding(&self) -> &'static str {
        match self {
            Str::Int(_) => "int",
            Str::Embed(_) => "embstr",
            Str::Raw(_) => "raw",
        }
    }

    /// The byte length of the value.
    pub fn len(&self) -> usize {
        match self {
            Str::Int(n) => i64_len(*n),
            Str::Embed(bytes) => bytes.len(),
            Str::Raw(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The integer value, when the string is an exact i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Str::Int(n) => Some(*n),
            Str::Embed(bytes) => parse_i64_exact(bytes),
            Str::Raw(bytes) => parse_i64_exact(bytes),
        }
    }

    /// The float value, when the string parses as f64.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Str::Int(n) => Some(*n as f64),
            Str::Embed(bytes) => parse(bytes),
            Str::Raw(bytes) => parse(bytes),
        }
    }

    /// Render the value as owned bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Str::Int(n) => Bytes::from(n.to_string()),
            Str::Embed(bytes) => Bytes::copy_from_slice(bytes),
            Str::Raw(bytes) => Bytes::copy_from_slice(bytes),
        }
    }

    /// Convert to the raw encoding in place and return the buffer. Used by
    /// the mutating paths (APPEND, SETRANGE, SETBIT, BITFIELD).
    pub fn make_raw(&mut self) -> &mut Vec<u8> {
        if !matches!(self, Str::Raw(_)) {
            *self = Str::Raw(self.to_bytes().to_vec());
        }
        match self {
            Str::Raw(bytes) => bytes,
            _ => unreachable!("just converted to raw"),
        }
    }

    /// Rough heap footprint in bytes, for the memory gauge.
    pub fn mem_usage(&self) -> usize {
        match self {
            Str::Int(_) => 8,
            Str::Embed(_) => EMBED_MAX,
            Str::Raw(bytes) => bytes.capacity(),
        }
    }
}

impl From<&[u8]> for Str {
    fn from(bytes: &[u8]) -> Self {
        if let Some(n) = parse_i64_exact(bytes) {
            return Str::Int(n);
        }
        match ArrayVec::try_from(bytes) {
            Ok(embedded) => Str::Embed(embedded),
            Err(_) => Str::Raw(bytes.to_vec()),
        }
    }
}

impl From<Bytes> for Str {
    fn from(bytes: Bytes) -> Self {
        Str::from(&bytes[..])
    }
}

impl From<i64> for Str {
    fn from(n: i64) -> Self {
        Str::Int(n)
    }
}

impl From<Vec<u8>> for Str {
    fn from(bytes: Vec<u8>) -> Self {
        if parse_i64_exact(&bytes).is_some() || bytes.len() <= EMBED_MAX {
            Str::from(&bytes[..])
        } else {
            Str::Raw(bytes)
        }
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Str::Int(a), Str::Int(b)) => a == b,
            _ => self.to_bytes() == other.to_bytes(),
        }
    }
}

impl Eq for Str {}

impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Output(&self.to_bytes()[..]))
    }
}
