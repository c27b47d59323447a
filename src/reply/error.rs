use crate::{
    bytes::{AsciiUpper, Output},
    command::Command,
};
use bytes::Bytes;
use respite::RespError;
use thiserror::Error;

/// Every error reply the server produces. The Display form is the wire
/// form, minus the leading `-` and trailing CRLF.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("ERR Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?")]
    AuthWithoutPassword,

    #[error("ERR The bit argument must be 1 or 0.")]
    BitArgument,

    #[error("ERR BITFIELD_RO only supports the GET subcommand")]
    Bitfieldro,

    #[error("ERR bit offset is not an integer or out of range")]
    BitOffset,

    #[error("ERR BITOP NOT must be called with a single source key.")]
    BitopNot,

    #[error("ERR BITOP {0} requires at least two source keys.")]
    BitopSources(&'static str),

    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,

    #[error("{}", Output(&.0[..]))]
    Custom(Bytes),

    #[error("ERR DB index is out of range")]
    DBIndex,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("ERR invalid expire time in '{}' command", .0.name)]
    ExpireTime(&'static Command),

    #[error("ERR value is not a valid float")]
    Float,

    #[error("ERR invalid longitude,latitude pair {0:.6},{1:.6}")]
    GeoPair(f64, f64),

    #[error("ERR increment or decrement would overflow")]
    IncrOverflow,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR value is not an integer or out of range")]
    Integer,

    #[error("ERR Invalid argument(s)")]
    InvalidArgument,

    #[error(
        "ERR Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is."
    )]
    InvalidBitfield,

    #[error("ERR Invalid OVERFLOW type specified")]
    InvalidOverflow,

    #[error("WRONGTYPE Key is not a valid HyperLogLog string value.")]
    InvalidHll,

    #[error("ERR invalid usize reply")]
    InvalidUsize,

    #[error("LOADING Redis is loading the dataset in memory")]
    Loading,

    #[error("ERR min or max is not a float")]
    MinMaxFloat,

    #[error("ERR MULTI calls can not be nested")]
    MultiNested,

    #[error("ERR increment would produce NaN or Infinity")]
    NanOrInfinity,

    #[error("ERR Number of keys can't be negative")]
    NegativeKeys,

    #[error(
        "NOGROUP No such consumer group '{}' for key name '{}'",
        Output(&.0[..]),
        Output(&.1[..])
    )]
    NoGroup(Bytes, Bytes),

    #[error("NOSCRIPT No matching script. Please use EVAL.")]
    Noscript,

    #[error("ERR This Redis command is not allowed from script")]
    NoScriptCommand,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("NOTBUSY No scripts in execution right now.")]
    NotBusy,

    #[error("ERR Number of keys can't be greater than number of args")]
    NumberOfKeys,

    #[error("ERR numkeys should be greater than 0")]
    NumkeysZero,

    #[error("ERR offset is out of range")]
    OffsetRange,

    #[error("OOM command not allowed when used memory > 'maxmemory'.")]
    Oom,

    #[error("ERR Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context", .0.name)]
    Pubsub(&'static Command),

    #[error("ERR Protocol Error: {}", .0)]
    Resp(#[from] RespError),

    #[error("BUSY BGREWRITEAOF already in progress")]
    RewriteInProgress,

    #[error("BUSY BGSAVE already in progress")]
    SaveInProgress,

    #[error("ERR source and destination objects are the same")]
    SameObject,

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdSmall,

    #[error("ERR Invalid stream ID specified as stream command argument")]
    StreamId,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR unknown command '{}'", Output(&.0[..]))]
    UnknownCommand(Bytes),

    #[error("ERR Unknown subcommand or wrong number of arguments for '{}'. Try {} HELP.", Output(&.1[..]), AsciiUpper(.0.name))]
    UnknownSubcommand(&'static Command, Bytes),

    #[error("ERR unsupported unit provided. please use m, km, ft, mi")]
    Unit,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInMulti,

    #[error("ERR wrong number of arguments for '{}' command", .0.name)]
    WrongArguments(&'static Command),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR XX and NX options at the same time are not compatible")]
    XxAndNx,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_prefixes() {
        assert!(ReplyError::Syntax.to_string().starts_with("ERR "));
        assert!(ReplyError::WrongType.to_string().starts_with("WRONGTYPE "));
        assert!(ReplyError::ExecAbort.to_string().starts_with("EXECABORT "));
        assert!(ReplyError::Noscript.to_string().starts_with("NOSCRIPT "));
        assert!(ReplyError::SaveInProgress.to_string().starts_with("BUSY "));
        assert!(ReplyError::Oom.to_string().starts_with("OOM "));
    }

    #[test]
    fn unknown_command_includes_name() {
        let error = ReplyError::UnknownCommand(Bytes::from_static(b"frobnicate"));
        assert_eq!(error.to_string(), "ERR unknown command 'frobnicate'");
    }
}
