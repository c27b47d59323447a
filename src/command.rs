mod bitops;
mod geo;
mod hash;
mod hyperloglog;
mod keys;
mod list;
mod multi;
mod persist;
mod pubsub;
mod script;
mod server;
mod set;
mod sorted_set;
mod stream;
mod string;

pub use bitops::*;
pub use geo::*;
pub use hash::*;
pub use hyperloglog::*;
pub use keys::*;
pub use list::*;
pub use multi::*;
pub use persist::*;
pub use pubsub::*;
pub use script::*;
pub use server::*;
pub use set::*;
pub use sorted_set::*;
pub use stream::*;
pub use string::*;

use crate::{bytes::lex, client::Client, reply::Reply, store::Store};
use logos::Logos;

/// How many arguments a command accepts, command name included.
#[derive(Debug)]
pub enum Arity {
    Exact(u8),
    Minimum(u8),
}

/// Where the keys sit in a command's arguments, reported as
/// `(first, last, step)` and used for routing and logging.
#[derive(Debug)]
pub enum Keys {
    /// Every trailing argument.
    All,

    /// A count argument at this index is followed by that many keys.
    Argument(usize),

    /// The first two arguments.
    Double,

    /// Every other trailing argument (key value pairs).
    Odd,

    None,

    /// The first argument.
    Single,

    /// Every argument after the second.
    SkipOne,

    /// Every argument except the last.
    Trailing,
}

impl Keys {
    /// The `(first, last, step)` triple.
    pub fn first_last_step(&self) -> (usize, i64, usize) {
        match self {
            Keys::All => (1, -1, 1),
            Keys::Argument(_) => (0, 0, 0),
            Keys::Double => (1, 2, 1),
            Keys::Odd => (1, -1, 2),
            Keys::None => (0, 0, 0),
            Keys::Single => (1, 1, 1),
            Keys::SkipOne => (2, -1, 1),
            Keys::Trailing => (1, -2, 1),
        }
    }
}

/// Handlers reply through the client; an `Err` is a shortcut reply (an
/// error, or e.g. `Nil` for an early exit).
pub type CommandResult = Result<(), Reply>;

/// One entry in the command table.
pub struct Command {
    pub kind: CommandKind,

    pub name: &'static str,

    pub arity: Arity,

    pub run: fn(&mut Client, &Store) -> CommandResult,

    pub keys: Keys,

    /// Reads the keyspace without writing it.
    pub readonly: bool,

    /// Administrative commands (persistence controls).
    pub admin: bool,

    /// Disallowed while a script is running.
    pub noscript: bool,

    /// Part of the pub/sub surface.
    pub pubsub: bool,

    /// Writes the keyspace; gated by the memory budget and appended to
    /// the command log.
    pub write: bool,
}

impl Command {
    /// Can this command queue inside MULTI? The transaction-control
    /// commands (and QUIT) always execute immediately.
    pub fn queueable(&self) -> bool {
        use CommandKind::*;
        !matches!(
            self.kind,
            Multi | Exec | Discard | Watch | Unwatch | Quit
        )
    }

    /// Commands allowed while the connection is in subscriber mode.
    pub fn pubsub_allowed(&self) -> bool {
        use CommandKind::*;
        matches!(
            self.kind,
            Subscribe | Unsubscribe | Psubscribe | Punsubscribe | Ping | Quit
        )
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("keys", &self.keys)
            .field("write", &self.write)
            .finish()
    }
}

impl From<&[u8]> for &'static Command {
    fn from(value: &[u8]) -> &'static Command {
        lex::<CommandKind>(value).map_or(&UNKNOWN, |kind| kind.command())
    }
}

pub static ALL: [&Command; 164] = [
    &APPEND,
    &AUTH,
    &BGREWRITEAOF,
    &BGSAVE,
    &BITCOUNT,
    &BITFIELD,
    &BITFIELD_RO,
    &BITOP,
    &BITPOS,
    &DBSIZE,
    &DECR,
    &DECRBY,
    &DEL,
    &DISCARD,
    &ECHO,
    &EVAL,
    &EVALSHA,
    &EXEC,
    &EXISTS,
    &EXPIRE,
    &EXPIREAT,
    &FLUSHALL,
    &FLUSHDB,
    &GEOADD,
    &GEODIST,
    &GEOHASH,
    &GEOPOS,
    &GEORADIUS,
    &GEORADIUSBYMEMBER,
    &GET,
    &GETBIT,
    &GETDEL,
    &GETEX,
    &GETRANGE,
    &GETSET,
    &HDEL,
    &HEXISTS,
    &HGET,
    &HGETALL,
    &HINCRBY,
    &HINCRBYFLOAT,
    &HKEYS,
    &HLEN,
    &HMGET,
    &HMSET,
    &HRANDFIELD,
    &HSCAN,
    &HSET,
    &HSETNX,
    &HSTRLEN,
    &HVALS,
    &INCR,
    &INCRBY,
    &INCRBYFLOAT,
    &INFO,
    &KEYS,
    &LASTSAVE,
    &LINDEX,
    &LINSERT,
    &LLEN,
    &LPOP,
    &LPUSH,
    &LPUSHX,
    &LRANGE,
    &LREM,
    &LSET,
    &LTRIM,
    &MGET,
    &MSET,
    &MSETNX,
    &MULTI,
    &OBJECT,
    &PERSIST,
    &PEXPIRE,
    &PEXPIREAT,
    &PFADD,
    &PFCOUNT,
    &PFMERGE,
    &PING,
    &PSETEX,
    &PSUBSCRIBE,
    &PTTL,
    &PUBLISH,
    &PUBSUB,
    &PUNSUBSCRIBE,
    &QUIT,
    &RANDOMKEY,
    &RENAME,
    &RENAMENX,
    &RPOP,
    &RPUSH,
    &RPUSHX,
    &SADD,
    &SAVE,
    &SCAN,
    &SCARD,
    &SCRIPT,
    &SDIFF,
    &SDIFFSTORE,
    &SELECT,
    &SET,
    &SETBIT,
    &SETEX,
    &SETNX,
    &SETRANGE,
    &SINTER,
    &SINTERSTORE,
    &SISMEMBER,
    &SMEMBERS,
    &SMISMEMBER,
    &SMOVE,
    &SPOP,
    &SRANDMEMBER,
    &SREM,
    &SSCAN,
    &STRLEN,
    &SUBSCRIBE,
    &SUNION,
    &SUNIONSTORE,
    &TIME,
    &TTL,
    &TYPE,
    &UNLINK,
    &UNSUBSCRIBE,
    &UNWATCH,
    &WATCH,
    &XACK,
    &XADD,
    &XCLAIM,
    &XDEL,
    &XGROUP,
    &XINFO,
    &XLEN,
    &XPENDING,
    &XRANGE,
    &XREAD,
    &XREADGROUP,
    &XREVRANGE,
    &XTRIM,
    &ZADD,
    &ZCARD,
    &ZCOUNT,
    &ZDIFF,
    &ZDIFFSTORE,
    &ZINCRBY,
    &ZINTER,
    &ZINTERSTORE,
    &ZMSCORE,
    &ZPOPMAX,
    &ZPOPMIN,
    &ZRANDMEMBER,
    &ZRANGE,
    &ZRANGEBYSCORE,
    &ZRANK,
    &ZREM,
    &ZREMRANGEBYRANK,
    &ZREMRANGEBYSCORE,
    &ZREVRANGE,
    &ZREVRANGEBYSCORE,
    &ZREVRANK,
    &ZSCAN,
    &ZSCORE,
    &ZUNION,
    &ZUNIONSTORE,
];

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
pub enum CommandKind {
    #[regex(b"(?i:append)")]
    Append,

    #[regex(b"(?i:auth)")]
    Auth,

    #[regex(b"(?i:bgrewriteaof)")]
    Bgrewriteaof,

    #[regex(b"(?i:bgsave)")]
    Bgsave,

    #[regex(b"(?i:bitcount)")]
    Bitcount,

    #[regex(b"(?i:bitfield)")]
    Bitfield,

    #[regex(b"(?i:bitfield_ro)")]
    Bitfieldro,

    #[regex(b"(?i:bitop)")]
    Bitop,

    #[regex(b"(?i:bitpos)")]
    Bitpos,

    #[regex(b"(?i:dbsize)")]
    Dbsize,

    #[regex(b"(?i:decr)")]
    Decr,

    #[regex(b"(?i:decrby)")]
    Decrby,

    #[regex(b"(?i:del)")]
    Del,

    #[regex(b"(?i:discard)")]
    Discard,

    #[regex(b"(?i:echo)")]
    Echo,

    #[regex(b"(?i:eval)")]
    Eval,

    #[regex(b"(?i:evalsha)")]
    Evalsha,

    #[regex(b"(?i:exec)")]
    Exec,

    #[regex(b"(?i:exists)")]
    Exists,

    #[regex(b"(?i:expire)")]
    Expire,

    #[regex(b"(?i:expireat)")]
    Expireat,

    #[regex(b"(?i:flushall)")]
    Flushall,

    #[regex(b"(?i:flushdb)")]
    Flushdb,

    #[regex(b"(?i:geoadd)")]
    Geoadd,

    #[regex(b"(?i:geodist)")]
    Geodist,

    #[regex(b"(?i:geohash)")]
    Geohash,

    #[regex(b"(?i:geopos)")]
    Geopos,

    #[regex(b"(?i:georadius)")]
    Georadius,

    #[regex(b"(?i:georadiusbymember)")]
    Georadiusbymember,

    #[regex(b"(?i:get)")]
    Get,

    #[regex(b"(?i:getbit)")]
    Getbit,

    #[regex(b"(?i:getdel)")]
    Getdel,

    #[regex(b"(?i:getex)")]
    Getex,

    #[regex(b"(?i:getrange)")]
    Getrange,

    #[regex(b"(?i:getset)")]
    Getset,

    #[regex(b"(?i:hdel)")]
    Hdel,

    #[regex(b"(?i:hexists)")]
    Hexists,

    #[regex(b"(?i:hget)")]
    Hget,

    #[regex(b"(?i:hgetall)")]
    Hgetall,

    #[regex(b"(?i:hincrby)")]
    Hincrby,

    #[regex(b"(?i:hincrbyfloat)")]
    Hincrbyfloat,

    #[regex(b"(?i:hkeys)")]
    Hkeys,

    #[regex(b"(?i:hlen)")]
    Hlen,

    #[regex(b"(?i:hmget)")]
    Hmget,

    #[regex(b"(?i:hmset)")]
    Hmset,

    #[regex(b"(?i:hrandfield)")]
    Hrandfield,

    #[regex(b"(?i:hscan)")]
    Hscan,

    #[regex(b"(?i:hset)")]
    Hset,

    #[regex(b"(?i:hsetnx)")]
    Hsetnx,

    #[regex(b"(?i:hstrlen)")]
    Hstrlen,

    #[regex(b"(?i:hvals)")]
    Hvals,

    #[regex(b"(?i:incr)")]
    Incr,

    #[regex(b"(?i:incrby)")]
    Incrby,

    #[regex(b"(?i:incrbyfloat)")]
    Incrbyfloat,

    #[regex(b"(?i:info)")]
    Info,

    #[regex(b"(?i:keys)")]
    Keys,

    #[regex(b"(?i:lastsave)")]
    Lastsave,

    #[regex(b"(?i:lindex)")]
    Lindex,

    #[regex(b"(?i:linsert)")]
    Linsert,

    #[regex(b"(?i:llen)")]
    Llen,

    #[regex(b"(?i:lpop)")]
    Lpop,

    #[regex(b"(?i:lpush)")]
    Lpush,

    #[regex(b"(?i:lpushx)")]
    Lpushx,

    #[regex(b"(?i:lrange)")]
    Lrange,

    #[regex(b"(?i:lrem)")]
    Lrem,

    #[regex(b"(?i:lset)")]
    Lset,

    #[regex(b"(?i:ltrim)")]
    Ltrim,

    #[regex(b"(?i:mget)")]
    Mget,

    #[regex(b"(?i:mset)")]
    Mset,

    #[regex(b"(?i:msetnx)")]
    Msetnx,

    #[regex(b"(?i:multi)")]
    Multi,

    #[regex(b"(?i:object)")]
    Object,

    #[regex(b"(?i:persist)")]
    Persist,

    #[regex(b"(?i:pexpire)")]
    Pexpire,

    #[regex(b"(?i:pexpireat)")]
    Pexpireat,

    #[regex(b"(?i:pfadd)")]
    Pfadd,

    #[regex(b"(?i:pfcount)")]
    Pfcount,

    #[regex(b"(?i:pfmerge)")]
    Pfmerge,

    #[regex(b"(?i:ping)")]
    Ping,

    #[regex(b"(?i:psetex)")]
    Psetex,

    #[regex(b"(?i:psubscribe)")]
    Psubscribe,

    #[regex(b"(?i:pttl)")]
    Pttl,

    #[regex(b"(?i:publish)")]
    Publish,

    #[regex(b"(?i:pubsub)")]
    Pubsub,

    #[regex(b"(?i:punsubscribe)")]
    Punsubscribe,

    #[regex(b"(?i:quit)")]
    Quit,

    #[regex(b"(?i:randomkey)")]
    Randomkey,

    #[regex(b"(?i:rename)")]
    Rename,

    #[regex(b"(?i:renamenx)")]
    Renamenx,

    #[regex(b"(?i:rpop)")]
    Rpop,

    #[regex(b"(?i:rpush)")]
    Rpush,

    #[regex(b"(?i:rpushx)")]
    Rpushx,

    #[regex(b"(?i:sadd)")]
    Sadd,

    #[regex(b"(?i:save)")]
    Save,

    #[regex(b"(?i:scan)")]
    Scan,

    #[regex(b"(?i:scard)")]
    Scard,

    #[regex(b"(?i:script)")]
    Script,

    #[regex(b"(?i:sdiff)")]
    Sdiff,

    #[regex(b"(?i:sdiffstore)")]
    Sdiffstore,

    #[regex(b"(?i:select)")]
    Select,

    #[regex(b"(?i:set)")]
    Set,

    #[regex(b"(?i:setbit)")]
    Setbit,

    #[regex(b"(?i:setex)")]
    Setex,

    #[regex(b"(?i:setnx)")]
    Setnx,

    #[regex(b"(?i:setrange)")]
    Setrange,

    #[regex(b"(?i:sinter)")]
    Sinter,

    #[regex(b"(?i:sinterstore)")]
    Sinterstore,

    #[regex(b"(?i:sismember)")]
    Sismember,

    #[regex(b"(?i:smembers)")]
    Smembers,

    #[regex(b"(?i:smismember)")]
    Smismember,

    #[regex(b"(?i:smove)")]
    Smove,

    #[regex(b"(?i:spop)")]
    Spop,

    #[regex(b"(?i:srandmember)")]
    Srandmember,

    #[regex(b"(?i:srem)")]
    Srem,

    #[regex(b"(?i:sscan)")]
    Sscan,

    #[regex(b"(?i:strlen)")]
    Strlen,

    #[regex(b"(?i:subscribe)")]
    Subscribe,

    #[regex(b"(?i:sunion)")]
    Sunion,

    #[regex(b"(?i:sunionstore)")]
    Sunionstore,

    #[regex(b"(?i:time)")]
    Time,

    #[regex(b"(?i:ttl)")]
    Ttl,

    #[regex(b"(?i:type)")]
    Type,

    #[regex(b"(?i:unlink)")]
    Unlink,

    #[regex(b"(?i:unsubscribe)")]
    Unsubscribe,

    #[regex(b"(?i:unwatch)")]
    Unwatch,

    #[regex(b"(?i:watch)")]
    Watch,

    #[regex(b"(?i:xack)")]
    Xack,

    #[regex(b"(?i:xadd)")]
    Xadd,

    #[regex(b"(?i:xclaim)")]
    Xclaim,

    #[regex(b"(?i:xdel)")]
    Xdel,

    #[regex(b"(?i:xgroup)")]
    Xgroup,

    #[regex(b"(?i:xinfo)")]
    Xinfo,

    #[regex(b"(?i:xlen)")]
    Xlen,

    #[regex(b"(?i:xpending)")]
    Xpending,

    #[regex(b"(?i:xrange)")]
    Xrange,

    #[regex(b"(?i:xread)")]
    Xread,

    #[regex(b"(?i:xreadgroup)")]
    Xreadgroup,

    #[regex(b"(?i:xrevrange)")]
    Xrevrange,

    #[regex(b"(?i:xtrim)")]
    Xtrim,

    #[regex(b"(?i:zadd)")]
    Zadd,

    #[regex(b"(?i:zcard)")]
    Zcard,

    #[regex(b"(?i:zcount)")]
    Zcount,

    #[regex(b"(?i:zdiff)")]
    Zdiff,

    #[regex(b"(?i:zdiffstore)")]
    Zdiffstore,

    #[regex(b"(?i:zincrby)")]
    Zincrby,

    #[regex(b"(?i:zinter)")]
    Zinter,

    #[regex(b"(?i:zinterstore)")]
    Zinterstore,

    #[regex(b"(?i:zmscore)")]
    Zmscore,

    #[regex(b"(?i:zpopmax)")]
    Zpopmax,

    #[regex(b"(?i:zpopmin)")]
    Zpopmin,

    #[regex(b"(?i:zrandmember)")]
    Zrandmember,

    #[regex(b"(?i:zrange)")]
    Zrange,

    #[regex(b"(?i:zrangebyscore)")]
    Zrangebyscore,

    #[regex(b"(?i:zrank)")]
    Zrank,

    #[regex(b"(?i:zrem)")]
    Zrem,

    #[regex(b"(?i:zremrangebyrank)")]
    Zremrangebyrank,

    #[regex(b"(?i:zremrangebyscore)")]
    Zremrangebyscore,

    #[regex(b"(?i:zrevrange)")]
    Zrevrange,

    #[regex(b"(?i:zrevrangebyscore)")]
    Zrevrangebyscore,

    #[regex(b"(?i:zrevrank)")]
    Zrevrank,

    #[regex(b"(?i:zscan)")]
    Zscan,

    #[regex(b"(?i:zscore)")]
    Zscore,

    #[regex(b"(?i:zunion)")]
    Zunion,

    #[regex(b"(?i:zunionstore)")]
    Zunionstore,

    Unknown,
}

impl CommandKind {
    pub fn command(self) -> &'static Command {
        use CommandKind::*;

        match self {
            Append => &APPEND,
            Auth => &AUTH,
            Bgrewriteaof => &BGREWRITEAOF,
            Bgsave => &BGSAVE,
            Bitcount => &BITCOUNT,
            Bitfield => &BITFIELD,
            Bitfieldro => &BITFIELD_RO,
            Bitop => &BITOP,
            Bitpos => &BITPOS,
            Dbsize => &DBSIZE,
            Decr => &DECR,
            Decrby => &DECRBY,
            Del => &DEL,
            Discard => &DISCARD,
            Echo => &ECHO,
            Eval => &EVAL,
            Evalsha => &EVALSHA,
            Exec => &EXEC,
            Exists => &EXISTS,
            Expire => &EXPIRE,
            Expireat => &EXPIREAT,
            Flushall => &FLUSHALL,
            Flushdb => &FLUSHDB,
            Geoadd => &GEOADD,
            Geodist => &GEODIST,
            Geohash => &GEOHASH,
            Geopos => &GEOPOS,
            Georadius => &GEORADIUS,
            Georadiusbymember => &GEORADIUSBYMEMBER,
            Get => &GET,
            Getbit => &GETBIT,
            Getdel => &GETDEL,
            Getex => &GETEX,
            Getrange => &GETRANGE,
            Getset => &GETSET,
            Hdel => &HDEL,
            Hexists => &HEXISTS,
            Hget => &HGET,
            Hgetall => &HGETALL,
            Hincrby => &HINCRBY,
            Hincrbyfloat => &HINCRBYFLOAT,
            Hkeys => &HKEYS,
            Hlen => &HLEN,
            Hmget => &HMGET,
            Hmset => &HMSET,
            Hrandfield => &HRANDFIELD,
            Hscan => &HSCAN,
            Hset => &HSET,
            Hsetnx => &HSETNX,
            Hstrlen => &HSTRLEN,
            Hvals => &HVALS,
            Incr => &INCR,
            Incrby => &INCRBY,
            Incrbyfloat => &INCRBYFLOAT,
            Info => &INFO,
            Keys => &KEYS,
            Lastsave => &LASTSAVE,
            Lindex => &LINDEX,
            Linsert => &LINSERT,
            Llen => &LLEN,
            Lpop => &LPOP,
            Lpush => &LPUSH,
            Lpushx => &LPUSHX,
            Lrange => &LRANGE,
            Lrem => &LREM,
            Lset => &LSET,
            Ltrim => &LTRIM,
            Mget => &MGET,
            Mset => &MSET,
            Msetnx => &MSETNX,
            Multi => &MULTI,
            Object => &OBJECT,
            Persist => &PERSIST,
            Pexpire => &PEXPIRE,
            Pexpireat => &PEXPIREAT,
            Pfadd => &PFADD,
            Pfcount => &PFCOUNT,
            Pfmerge => &PFMERGE,
            Ping => &PING,
            Psetex => &PSETEX,
            Psubscribe => &PSUBSCRIBE,
            Pttl => &PTTL,
            Publish => &PUBLISH,
            Pubsub => &PUBSUB,
            Punsubscribe => &PUNSUBSCRIBE,
            Quit => &QUIT,
            Randomkey => &RANDOMKEY,
            Rename => &RENAME,
            Renamenx => &RENAMENX,
            Rpop => &RPOP,
            Rpush => &RPUSH,
            Rpushx => &RPUSHX,
            Sadd => &SADD,
            Save => &SAVE,
            Scan => &SCAN,
            Scard => &SCARD,
            Script => &SCRIPT,
            Sdiff => &SDIFF,
            Sdiffstore => &SDIFFSTORE,
            Select => &SELECT,
            Set => &SET,
            Setbit => &SETBIT,
            Setex => &SETEX,
            Setnx => &SETNX,
            Setrange => &SETRANGE,
            Sinter => &SINTER,
            Sinterstore => &SINTERSTORE,
            Sismember => &SISMEMBER,
            Smembers => &SMEMBERS,
            Smismember => &SMISMEMBER,
            Smove => &SMOVE,
            Spop => &SPOP,
            Srandmember => &SRANDMEMBER,
            Srem => &SREM,
            Sscan => &SSCAN,
            Strlen => &STRLEN,
            Subscribe => &SUBSCRIBE,
            Sunion => &SUNION,
            Sunionstore => &SUNIONSTORE,
            Time => &TIME,
            Ttl => &TTL,
            Type => &TYPE,
            Unlink => &UNLINK,
            Unsubscribe => &UNSUBSCRIBE,
            Unwatch => &UNWATCH,
            Watch => &WATCH,
            Xack => &XACK,
            Xadd => &XADD,
            Xclaim => &XCLAIM,
            Xdel => &XDEL,
            Xgroup => &XGROUP,
            Xinfo => &XINFO,
            Xlen => &XLEN,
            Xpending => &XPENDING,
            Xrange => &XRANGE,
            Xread => &XREAD,
            Xreadgroup => &XREADGROUP,
            Xrevrange => &XREVRANGE,
            Xtrim => &XTRIM,
            Zadd => &ZADD,
            Zcard => &ZCARD,
            Zcount => &ZCOUNT,
            Zdiff => &ZDIFF,
            Zdiffstore => &ZDIFFSTORE,
            Zincrby => &ZINCRBY,
            Zinter => &ZINTER,
            Zinterstore => &ZINTERSTORE,
            Zmscore => &ZMSCORE,
            Zpopmax => &ZPOPMAX,
            Zpopmin => &ZPOPMIN,
            Zrandmember => &ZRANDMEMBER,
            Zrange => &ZRANGE,
            Zrangebyscore => &ZRANGEBYSCORE,
            Zrank => &ZRANK,
            Zrem => &ZREM,
            Zremrangebyrank => &ZREMRANGEBYRANK,
            Zremrangebyscore => &ZREMRANGEBYSCORE,
            Zrevrange => &ZREVRANGE,
            Zrevrangebyscore => &ZREVRANGEBYSCORE,
            Zrevrank => &ZREVRANK,
            Zscan => &ZSCAN,
            Zscore => &ZSCORE,
            Zunion => &ZUNION,
            Zunionstore => &ZUNIONSTORE,
            Unknown => &UNKNOWN,
        }
    }
}

/// The table entry for anything we don't recognise.
pub static UNKNOWN: Command = Command {
    kind: CommandKind::Unknown,
    name: "unknown",
    arity: Arity::Minimum(1),
    run: unknown,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn unknown(client: &mut Client, _: &Store) -> CommandResult {
    let name = client.request.get(0).unwrap_or_default();
    Err(crate::reply::ReplyError::UnknownCommand(name).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let command: &'static Command = b"GET"[..].into();
        assert_eq!(command.name, "get");
        let command: &'static Command = b"gEt"[..].into();
        assert_eq!(command.name, "get");
    }

    #[test]
    fn unknown_names_fall_through() {
        let command: &'static Command = b"frobnicate"[..].into();
        assert_eq!(command.kind, CommandKind::Unknown);
    }

    #[test]
    fn table_is_consistent() {
        for command in ALL {
            // Each table entry maps back to itself through its kind.
            assert_eq!(command.kind.command().name, command.name);
            // Write commands are not marked readonly.
            assert!(!(command.write && command.readonly), "{}", command.name);
        }
    }

    #[test]
    fn key_descriptors() {
        assert_eq!(Keys::Single.first_last_step(), (1, 1, 1));
        assert_eq!(Keys::All.first_last_step(), (1, -1, 1));
        assert_eq!(Keys::Odd.first_last_step(), (1, -1, 2));
    }
}
