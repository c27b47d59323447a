use crate::{
    bytes::lex,
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    db::Str,
    reply::{format_double, Reply, ReplyError},
    store::Store,
    time::now_ms,
};
use logos::Logos;

pub static APPEND: Command = Command {
    kind: CommandKind::Append,
    name: "append",
    arity: Arity::Exact(3),
    run: append,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn append(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let bytes = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let value = db.str_or_default(&key)?;
    value.make_raw().extend_from_slice(&bytes);
    let len = value.len();
    db.touch(&key);
    drop(db);
    client.reply(len);
    Ok(())
}

pub static DECR: Command = Command {
    kind: CommandKind::Decr,
    name: "decr",
    arity: Arity::Exact(2),
    run: decr,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn decr(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    increment(client, store, &key, -1)
}

pub static DECRBY: Command = Command {
    kind: CommandKind::Decrby,
    name: "decrby",
    arity: Arity::Exact(3),
    run: decrby,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn decrby(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client
        .request
        .i64()?
        .checked_neg()
        .ok_or(ReplyError::IncrOverflow)?;
    increment(client, store, &key, by)
}

fn increment(client: &mut Client, store: &Store, key: &[u8], by: i64) -> CommandResult {
    let mut db = store.db(client.db)?.write();
    let value = db.str_or_default(key)?;
    let current = value.as_int().ok_or(ReplyError::Integer)?;
    let next = current.checked_add(by).ok_or(ReplyError::IncrOverflow)?;
    *value = Str::Int(next);
    db.touch(key);
    drop(db);
    client.reply(next);
    Ok(())
}

pub static GET: Command = Command {
    kind: CommandKind::Get,
    name: "get",
    arity: Arity::Exact(2),
    run: get,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn get(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let value = db.get_str(&key)?.ok_or(Reply::Nil)?;
    let reply = Reply::from(value);
    drop(db);
    client.reply(reply);
    Ok(())
}

pub static GETDEL: Command = Command {
    kind: CommandKind::Getdel,
    name: "getdel",
    arity: Arity::Exact(2),
    run: getdel,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn getdel(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let value = db.get_str(&key)?.ok_or(Reply::Nil)?;
    let reply = Reply::from(value);
    db.remove(&key);
    drop(db);
    client.reply(reply);
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum GetexOption {
    #[regex(b"(?i:ex)")]
    Ex,

    #[regex(b"(?i:exat)")]
    Exat,

    #[regex(b"(?i:persist)")]
    Persist,

    #[regex(b"(?i:px)")]
    Px,

    #[regex(b"(?i:pxat)")]
    Pxat,
}

pub static GETEX: Command = Command {
    kind: CommandKind::Getex,
    name: "getex",
    arity: Arity::Minimum(2),
    run: getex,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn getex(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut persist = false;
    let mut at = None;

    while !client.request.is_empty() {
        if persist || at.is_some() {
            return Err(ReplyError::Syntax.into());
        }
        let Some(option) = lex(&client.request.pop()?[..]) else {
            return Err(ReplyError::Syntax.into());
        };
        match option {
            GetexOption::Ex => at = Some(client.request.ttl_secs()?),
            GetexOption::Exat => at = Some(client.request.deadline_secs()?),
            GetexOption::Persist => persist = true,
            GetexOption::Px => at = Some(client.request.ttl_millis()?),
            GetexOption::Pxat => at = Some(client.request.deadline_millis()?),
        }
    }

    let mut db = store.db(client.db)?.write();
    let value = db.get_str(&key)?.ok_or(Reply::Nil)?;
    let reply = Reply::from(value);

    if persist {
        db.persist(&key);
    } else if let Some(at) = at {
        db.expire_at(&key, at);
    }

    drop(db);
    client.reply(reply);
    Ok(())
}

pub static GETRANGE: Command = Command {
    kind: CommandKind::Getrange,
    name: "getrange",
    arity: Arity::Exact(4),
    run: getrange,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn getrange(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;

    let db = store.db(client.db)?.read();
    let Some(value) = db.get_str(&key)? else {
        drop(db);
        client.reply(Reply::Bulk(bytes::Bytes::new()));
        return Ok(());
    };
    let bytes = value.to_bytes();
    drop(db);

    let len = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len || stop < 0 {
        client.reply(Reply::Bulk(bytes::Bytes::new()));
        return Ok(());
    }

    let start = usize::try_from(start).unwrap_or(0);
    let stop = usize::try_from(stop).unwrap_or(0);
    client.reply(Reply::Bulk(bytes.slice(start..=stop)));
    Ok(())
}

pub static GETSET: Command = Command {
    kind: CommandKind::Getset,
    name: "getset",
    arity: Arity::Exact(3),
    run: getset,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn getset(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let bytes = client.request.pop()?;
    let mut db = store.db(client.db)?.write();

    // Type-check before replacing.
    let old = db.get_str(&key)?.map(Reply::from);
    db.set(&key, Str::from(bytes).into());
    drop(db);

    match old {
        Some(reply) => client.reply(reply),
        None => client.reply(Reply::Nil),
    }
    Ok(())
}

pub static INCR: Command = Command {
    kind: CommandKind::Incr,
    name: "incr",
    arity: Arity::Exact(2),
    run: incr,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn incr(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    increment(client, store, &key, 1)
}

pub static INCRBY: Command = Command {
    kind: CommandKind::Incrby,
    name: "incrby",
    arity: Arity::Exact(3),
    run: incrby,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn incrby(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client.request.i64()?;
    increment(client, store, &key, by)
}

pub static INCRBYFLOAT: Command = Command {
    kind: CommandKind::Incrbyfloat,
    name: "incrbyfloat",
    arity: Arity::Exact(3),
    run: incrbyfloat,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn incrbyfloat(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client.request.f64()?;

    let mut db = store.db(client.db)?.write();
    let value = db.str_or_default(&key)?;
    let current = value.as_float().ok_or(ReplyError::Float)?;
    let next = current + by;
    if !next.is_finite() {
        return Err(ReplyError::NanOrInfinity.into());
    }

    let rendered = format_double(next);
    *value = Str::from(rendered.clone().into_bytes());
    db.touch(&key);
    drop(db);
    client.reply(Reply::Bulk(rendered.into()));
    Ok(())
}

pub static MGET: Command = Command {
    kind: CommandKind::Mget,
    name: "mget",
    arity: Arity::Minimum(2),
    run: mget,
    keys: Keys::All,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn mget(client: &mut Client, store: &Store) -> CommandResult {
    let keys: Vec<_> = client.request.iter().collect();
    let db = store.db(client.db)?.read();

    let replies: Vec<Reply> = keys
        .iter()
        .map(|key| match db.get_str(key) {
            Ok(Some(value)) => Reply::from(value),
            // Wrong-typed keys read as nil for MGET.
            _ => Reply::Nil,
        })
        .collect();
    drop(db);

    client.array(replies.into_iter());
    Ok(())
}

pub static MSET: Command = Command {
    kind: CommandKind::Mset,
    name: "mset",
    arity: Arity::Minimum(3),
    run: mset,
    keys: Keys::Odd,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn mset(client: &mut Client, store: &Store) -> CommandResult {
    client.request.assert_pairs()?;
    let mut db = store.db(client.db)?.write();
    while let Some(key) = client.request.try_pop() {
        let value = client.request.pop()?;
        db.set(&key, Str::from(value).into());
    }
    drop(db);
    client.reply("OK");
    Ok(())
}

pub static MSETNX: Command = Command {
    kind: CommandKind::Msetnx,
    name: "msetnx",
    arity: Arity::Minimum(3),
    run: msetnx,
    keys: Keys::Odd,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn msetnx(client: &mut Client, store: &Store) -> CommandResult {
    client.request.assert_pairs()?;
    let pairs: Vec<_> = client.request.iter().collect();
    let mut db = store.db(client.db)?.write();

    // All or nothing.
    if pairs.chunks_exact(2).any(|pair| db.exists(&pair[0])) {
        drop(db);
        client.reply(0);
        return Ok(());
    }

    for pair in pairs.chunks_exact(2) {
        db.set(&pair[0], Str::from(pair[1].clone()).into());
    }
    drop(db);
    client.reply(1);
    Ok(())
}

pub static PSETEX: Command = Command {
    kind: CommandKind::Psetex,
    name: "psetex",
    arity: Arity::Exact(4),
    run: psetex,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn psetex(client: &mut Client, store: &Store) -> CommandResult {
    setex_in::<1>(client, store)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum SetOption {
    #[regex(b"(?i:ex)")]
    Ex,

    #[regex(b"(?i:exat)")]
    Exat,

    #[regex(b"(?i:get)")]
    Get,

    #[regex(b"(?i:keepttl)")]
    Keepttl,

    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:px)")]
    Px,

    #[regex(b"(?i:pxat)")]
    Pxat,

    #[regex(b"(?i:xx)")]
    Xx,
}

#[derive(Debug, Default, Eq, PartialEq)]
enum SetTtl {
    #[default]
    Clear,
    Keep,
    At(u64),
}

pub static SET: Command = Command {
    kind: CommandKind::Set,
    name: "set",
    arity: Arity::Minimum(3),
    run: set,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn set(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let bytes = client.request.pop()?;

    let mut nx = false;
    let mut xx = false;
    let mut fetch = false;
    let mut ttl = None;

    while !client.request.is_empty() {
        let Some(option) = lex(&client.request.pop()?[..]) else {
            return Err(ReplyError::Syntax.into());
        };
        match option {
            SetOption::Nx => nx = true,
            SetOption::Xx => xx = true,
            SetOption::Get => fetch = true,
            SetOption::Keepttl if ttl.is_none() => ttl = Some(SetTtl::Keep),
            SetOption::Ex if ttl.is_none() => {
                ttl = Some(SetTtl::At(client.request.ttl_secs()?));
            }
            SetOption::Px if ttl.is_none() => {
                ttl = Some(SetTtl::At(client.request.ttl_millis()?));
            }
            SetOption::Exat if ttl.is_none() => {
                ttl = Some(SetTtl::At(client.request.deadline_secs()?));
            }
            SetOption::Pxat if ttl.is_none() => {
                ttl = Some(SetTtl::At(client.request.deadline_millis()?));
            }
            _ => return Err(ReplyError::Syntax.into()),
        }
    }

    if nx && xx {
        return Err(ReplyError::Syntax.into());
    }
    let ttl = ttl.unwrap_or_default();

    let mut db = store.db(client.db)?.write();
    let old = if fetch {
        Some(db.get_str(&key)?.map(Reply::from))
    } else {
        None
    };

    let exists = db.exists(&key);
    if (nx && exists) || (xx && !exists) {
        drop(db);
        match old {
            Some(Some(reply)) => client.reply(reply),
            _ => client.reply(Reply::Nil),
        }
        return Ok(());
    }

    let value = Str::from(bytes).into();
    match ttl {
        SetTtl::Clear => {
            db.set(&key, value);
        }
        SetTtl::Keep => {
            db.overwrite(&key, value);
        }
        SetTtl::At(at) => {
            db.set(&key, value);
            db.expire_at(&key, at);
        }
    }
    drop(db);

    match old {
        Some(Some(reply)) => client.reply(reply),
        Some(None) => client.reply(Reply::Nil),
        None => client.reply("OK"),
    }
    Ok(())
}

pub static SETEX: Command = Command {
    kind: CommandKind::Setex,
    name: "setex",
    arity: Arity::Exact(4),
    run: setex,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn setex(client: &mut Client, store: &Store) -> CommandResult {
    setex_in::<1000>(client, store)
}

fn setex_in<const UNIT: i64>(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let ttl = client.request.i64()?;
    let bytes = client.request.pop()?;

    if ttl <= 0 {
        return Err(ReplyError::ExpireTime(client.request.command).into());
    }
    let at = now_ms().saturating_add(u64::try_from(ttl.saturating_mul(UNIT)).unwrap_or(0));

    let mut db = store.db(client.db)?.write();
    db.set(&key, Str::from(bytes).into());
    db.expire_at(&key, at);
    drop(db);
    client.reply("OK");
    Ok(())
}

pub static SETNX: Command = Command {
    kind: CommandKind::Setnx,
    name: "setnx",
    arity: Arity::Exact(3),
    run: setnx,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn setnx(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let bytes = client.request.pop()?;
    let mut db = store.db(client.db)?.write();

    if db.exists(&key) {
        drop(db);
        client.reply(0);
        return Ok(());
    }

    db.set(&key, Str::from(bytes).into());
    drop(db);
    client.reply(1);
    Ok(())
}

pub static SETRANGE: Command = Command {
    kind: CommandKind::Setrange,
    name: "setrange",
    arity: Arity::Exact(4),
    run: setrange,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn setrange(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let offset = client.request.usize().map_err(|_| ReplyError::OffsetRange)?;
    let bytes = client.request.pop()?;

    let mut db = store.db(client.db)?.write();

    if bytes.is_empty() {
        let len = db.get_str(&key)?.map_or(0, Str::len);
        drop(db);
        client.reply(len);
        return Ok(());
    }

    let value = db.str_or_default(&key)?;
    let raw = value.make_raw();
    let end = offset + bytes.len();
    if raw.len() < end {
        raw.resize(end, 0);
    }
    raw[offset..end].copy_from_slice(&bytes);
    let len = raw.len();
    db.touch(&key);
    drop(db);
    client.reply(len);
    Ok(())
}

pub static STRLEN: Command = Command {
    kind: CommandKind::Strlen,
    name: "strlen",
    arity: Arity::Exact(2),
    run: strlen,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn strlen(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db.get_str(&key)?.map_or(0, Str::len);
    drop(db);
    client.reply(len);
    Ok(())
}
