mod error;

pub use error::ReplyError;

use crate::db::{Str, StreamId, ValueError};
use bytes::Bytes;

/// One reply frame. Aggregates (`Array`) are headers: the writer emits the
/// header and the elements follow as further replies.
#[derive(Debug)]
pub enum Reply {
    /// An array header.
    Array(usize),

    Bulk(Bytes),

    Error(ReplyError),

    Integer(i64),

    /// The RESP2 null (`$-1`), also standing in for the nil array an
    /// aborted EXEC sends.
    Nil,

    Status(StatusReply),
}

/// A simple-string reply.
#[derive(Debug)]
pub enum StatusReply {
    Str(&'static str),
    Bytes(Bytes),
}

impl StatusReply {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StatusReply::Str(value) => value.as_bytes(),
            StatusReply::Bytes(value) => &value[..],
        }
    }
}

/// Format a float the way the wire expects: integers shed their point,
/// infinities render as `inf`/`-inf`.
pub fn format_double(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value == value.trunc() && value.abs() < 1e17 {
        #[allow(clippy::cast_possible_truncation)]
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl From<ReplyError> for Reply {
    fn from(error: ReplyError) -> Self {
        Reply::Error(error)
    }
}

impl From<ValueError> for Reply {
    fn from(error: ValueError) -> Self {
        match error {
            ValueError::WrongType => Reply::Error(ReplyError::WrongType),
        }
    }
}

impl From<ValueError> for ReplyError {
    fn from(error: ValueError) -> Self {
        match error {
            ValueError::WrongType => ReplyError::WrongType,
        }
    }
}

impl From<&'static str> for Reply {
    fn from(value: &'static str) -> Self {
        Reply::Status(StatusReply::Str(value))
    }
}

impl From<Bytes> for Reply {
    fn from(value: Bytes) -> Self {
        Reply::Bulk(value)
    }
}

impl From<&Bytes> for Reply {
    fn from(value: &Bytes) -> Self {
        Reply::Bulk(value.clone())
    }
}

impl From<Vec<u8>> for Reply {
    fn from(value: Vec<u8>) -> Self {
        Reply::Bulk(Bytes::from(value))
    }
}

impl From<i64> for Reply {
    fn from(value: i64) -> Self {
        Reply::Integer(value)
    }
}

impl From<i32> for Reply {
    fn from(value: i32) -> Self {
        Reply::Integer(value.into())
    }
}

impl From<usize> for Reply {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => Reply::Integer(value),
            Err(_) => ReplyError::InvalidUsize.into(),
        }
    }
}

impl From<bool> for Reply {
    fn from(value: bool) -> Self {
        Reply::Integer(i64::from(value))
    }
}

impl From<f64> for Reply {
    fn from(value: f64) -> Self {
        Reply::Bulk(Bytes::from(format_double(value)))
    }
}

impl From<&Str> for Reply {
    fn from(value: &Str) -> Self {
        Reply::Bulk(value.to_bytes())
    }
}

impl From<Str> for Reply {
    fn from(value: Str) -> Self {
        Reply::Bulk(value.to_bytes())
    }
}

impl From<StreamId> for Reply {
    fn from(value: StreamId) -> Self {
        Reply::Bulk(value.to_bytes())
    }
}

impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Reply::Nil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_format_like_the_wire() {
        assert_eq!(format_double(3.0), "3");
        assert_eq!(format_double(-3.0), "-3");
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_double(0.0), "0");
    }

    #[test]
    fn conversions() {
        assert!(matches!(Reply::from(true), Reply::Integer(1)));
        assert!(matches!(Reply::from(Option::<i64>::None), Reply::Nil));
        assert!(matches!(Reply::from(7usize), Reply::Integer(7)));
        assert!(matches!(Reply::from("OK"), Reply::Status(_)));
        assert!(matches!(
            Reply::from(ValueError::WrongType),
            Reply::Error(ReplyError::WrongType)
        ));
    }
}
