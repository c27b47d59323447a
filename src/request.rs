use crate::{
    bytes::parse,
    command::{self, Arity, Command, CommandKind, Keys},
    db::{DbIndex, StreamId},
    reply::ReplyError,
    time::now_ms,
};
use bytes::Bytes;
use ordered_float::NotNan;
use std::{collections::VecDeque, iter::StepBy, ops::Bound, ops::Range};

/// A decoded request: the raw arguments plus a cursor. Handlers consume
/// arguments through the typed accessors; the raw buffer survives for
/// AOF propagation and transaction queueing.
#[derive(Clone, Debug)]
pub struct Request {
    arguments: VecDeque<Bytes>,
    pub command: &'static Command,
    next: usize,
}

impl Default for Request {
    fn default() -> Self {
        Request {
            arguments: VecDeque::new(),
            command: &command::UNKNOWN,
            next: 1,
        }
    }
}

impl Request {
    fn set_command(&mut self) {
        self.command = self
            .get(0)
            .map_or(&command::UNKNOWN, |argument| argument[..].into());
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind
    }

    pub fn push_back(&mut self, argument: Bytes) {
        self.arguments.push_back(argument);
        if self.len() == 1 {
            self.set_command();
            self.next = 1;
        }
    }

    pub fn clear(&mut self) {
        self.next = 1;
        self.arguments.clear();
        self.command = &command::UNKNOWN;
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.arguments.drain(..)
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining(&self) -> usize {
        self.arguments.len().saturating_sub(self.next)
    }

    pub fn get(&self, index: usize) -> Option<Bytes> {
        self.arguments.get(index).cloned()
    }

    /// The unconsumed arguments.
    pub fn iter(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.arguments.iter().skip(self.next).cloned()
    }

    /// All arguments, command name included.
    pub fn iter_all(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.arguments.iter().cloned()
    }

    pub fn is_valid(&self) -> bool {
        match self.command.arity {
            Arity::Exact(arity) => self.len() == usize::from(arity),
            Arity::Minimum(arity) => self.len() >= usize::from(arity),
        }
    }

    pub fn peek(&self) -> Option<Bytes> {
        self.get(self.next)
    }

    pub fn try_pop(&mut self) -> Option<Bytes> {
        let argument = self.peek()?;
        self.next += 1;
        Some(argument)
    }

    pub fn pop(&mut self) -> Result<Bytes, ReplyError> {
        self.try_pop().ok_or_else(|| self.wrong_arguments())
    }

    /// Require that the unconsumed arguments pair up.
    pub fn assert_pairs(&self) -> Result<(), ReplyError> {
        if self.remaining() % 2 == 0 {
            Ok(())
        } else {
            Err(self.wrong_arguments())
        }
    }

    pub fn wrong_arguments(&self) -> ReplyError {
        ReplyError::WrongArguments(self.command)
    }

    pub fn unknown_subcommand(&self) -> ReplyError {
        let subcommand = self.get(1).unwrap_or_else(|| "".into());
        ReplyError::UnknownSubcommand(self.command, subcommand)
    }

    pub fn i64(&mut self) -> Result<i64, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Integer)
    }

    pub fn u64(&mut self) -> Result<u64, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Integer)
    }

    pub fn usize(&mut self) -> Result<usize, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Integer)
    }

    pub fn f64(&mut self) -> Result<f64, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::Float)
    }

    pub fn not_nan(&mut self) -> Result<NotNan<f64>, ReplyError> {
        NotNan::new(self.f64()?).map_err(|_| ReplyError::Float)
    }

    pub fn bit(&mut self) -> Result<bool, ReplyError> {
        match &self.pop()?[..] {
            b"0" => Ok(false),
            b"1" => Ok(true),
            _ => Err(ReplyError::BitArgument),
        }
    }

    pub fn bit_offset(&mut self) -> Result<usize, ReplyError> {
        parse(&self.pop()?).ok_or(ReplyError::BitOffset)
    }

    pub fn db_index(&mut self) -> Result<DbIndex, ReplyError> {
        let index = parse(&self.pop()?).ok_or(ReplyError::Integer)?;
        Ok(DbIndex(index))
    }

    pub fn stream_id(&mut self, default_seq: u64) -> Result<StreamId, ReplyError> {
        StreamId::parse(&self.pop()?, default_seq).ok_or(ReplyError::StreamId)
    }

    /// A relative TTL in the given unit, converted to an absolute unix
    /// millisecond deadline.
    fn ttl_in<const UNIT: i128>(&mut self) -> Result<u64, ReplyError> {
        let error = ReplyError::ExpireTime(self.command);
        let ttl = parse::<i128>(&self.pop()?)
            .and_then(|n| n.checked_mul(UNIT))
            .ok_or(error)?;
        // A deadline in the past deletes the key, so negatives clamp to 0.
        let at = (i128::from(now_ms()) + ttl).max(0);
        u64::try_from(at).map_err(|_| ReplyError::ExpireTime(self.command))
    }

    pub fn ttl_secs(&mut self) -> Result<u64, ReplyError> {
        self.ttl_in::<1000>()
    }

    pub fn ttl_millis(&mut self) -> Result<u64, ReplyError> {
        self.ttl_in::<1>()
    }

    /// An absolute unix deadline in the given unit, converted to
    /// milliseconds.
    fn deadline_in<const UNIT: u64>(&mut self) -> Result<u64, ReplyError> {
        let error = ReplyError::ExpireTime(self.command);
        parse::<u64>(&self.pop()?)
            .and_then(|at| at.checked_mul(UNIT))
            .ok_or(error)
    }

    pub fn deadline_secs(&mut self) -> Result<u64, ReplyError> {
        self.deadline_in::<1000>()
    }

    pub fn deadline_millis(&mut self) -> Result<u64, ReplyError> {
        self.deadline_in::<1>()
    }

    /// A ZRANGEBYSCORE-style bound: a float, `(float` for exclusive, or
    /// `+inf`/`-inf`.
    pub fn score_bound(&mut self) -> Result<Bound<f64>, ReplyError> {
        let raw = self.pop()?;
        let (exclusive, text) = match &raw[..] {
            [b'(', rest @ ..] => (true, rest),
            rest => (false, rest),
        };
        let value: f64 = parse(text).ok_or(ReplyError::MinMaxFloat)?;
        if value.is_nan() {
            return Err(ReplyError::MinMaxFloat);
        }
        Ok(if exclusive {
            Bound::Excluded(value)
        } else {
            Bound::Included(value)
        })
    }

    pub fn numkeys(&mut self) -> Result<usize, ReplyError> {
        let count = self.i64()?;
        match usize::try_from(count) {
            Ok(0) => Err(ReplyError::NumkeysZero),
            Ok(n) if n > self.remaining() => Err(ReplyError::NumberOfKeys),
            Ok(n) => Ok(n),
            Err(_) => Err(ReplyError::NegativeKeys),
        }
    }

    /// The argument indices holding keys, per the command's descriptor.
    pub fn keys(&self) -> Result<StepBy<Range<usize>>, ReplyError> {
        let len = self.len();
        let keys = match self.command.keys {
            Keys::All => (1..len).step_by(1),
            Keys::Argument(index) => {
                let count: usize = self
                    .get(index)
                    .and_then(|bytes| parse(&bytes[..]))
                    .ok_or(ReplyError::InvalidArgument)?;
                let start = index + 1;
                let end = start + count;
                if end > len {
                    return Err(ReplyError::InvalidArgument);
                }
                (start..end).step_by(1)
            }
            Keys::Double => (1..3).step_by(1),
            Keys::Odd => (1..len).step_by(2),
            Keys::None => (0..0).step_by(1),
            Keys::Single => (1..2).step_by(1),
            Keys::SkipOne => (2..len).step_by(1),
            Keys::Trailing => (1..len.saturating_sub(1)).step_by(1),
        };
        Ok(keys)
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, argument) in self.arguments.iter().enumerate() {
            if index != 0 {
                write!(f, " ")?;
            }
            write!(f, "\"{}\"", crate::bytes::Output(&argument[..]))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(parts: &[&str]) -> Request {
        let mut request = Request::default();
        for part in parts {
            request.push_back(Bytes::copy_from_slice(part.as_bytes()));
        }
        request
    }

    #[test]
    fn resolves_the_command() {
        let request = request(&["GET", "key"]);
        assert_eq!(request.command.name, "get");
        assert!(request.is_valid());
    }

    #[test]
    fn arity_checks() {
        assert!(!request(&["GET"]).is_valid());
        assert!(!request(&["GET", "a", "b"]).is_valid());
        assert!(request(&["MGET", "a", "b", "c"]).is_valid());
        assert!(!request(&["MGET"]).is_valid());
    }

    #[test]
    fn pops_advance_the_cursor() {
        let mut request = request(&["SET", "key", "value"]);
        assert_eq!(&request.pop().unwrap()[..], b"key");
        assert_eq!(&request.pop().unwrap()[..], b"value");
        assert!(request.pop().is_err());
        // The raw arguments survive for propagation.
        assert_eq!(request.len(), 3);
    }

    #[test]
    fn score_bounds() {
        let mut request = request(&["ZCOUNT", "key", "(1", "+inf"]);
        request.pop().unwrap();
        assert_eq!(request.score_bound().unwrap(), Bound::Excluded(1.0));
        assert_eq!(request.score_bound().unwrap(), Bound::Included(f64::INFINITY));
    }

    #[test]
    fn numkeys_validation() {
        let mut r = request(&["ZUNIONSTORE", "dst", "2", "a", "b"]);
        r.pop().unwrap();
        assert_eq!(r.numkeys().unwrap(), 2);

        let mut r = request(&["ZUNIONSTORE", "dst", "9", "a"]);
        r.pop().unwrap();
        assert!(r.numkeys().is_err());
    }

    #[test]
    fn key_positions() {
        let request = request(&["MSET", "a", "1", "b", "2"]);
        let keys: Vec<usize> = request.keys().unwrap().collect();
        assert_eq!(keys, [1, 3]);
    }
}
