use crate::{
    bytes::parse,
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    glob,
    reply::{format_double, Reply, ReplyError},
    store::Store,
};
use bytes::Bytes;

pub static HDEL: Command = Command {
    kind: CommandKind::Hdel,
    name: "hdel",
    arity: Arity::Minimum(3),
    run: hdel,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn hdel(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let Some(hash) = db.mut_hash(&key)? else {
        drop(db);
        client.reply(0);
        return Ok(());
    };

    let mut removed = 0;
    while let Some(field) = client.request.try_pop() {
        if hash.remove(&field) {
            removed += 1;
        }
    }
    if removed > 0 {
        db.touch(&key);
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static HEXISTS: Command = Command {
    kind: CommandKind::Hexists,
    name: "hexists",
    arity: Arity::Exact(3),
    run: hexists,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hexists(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let exists = db.get_hash(&key)?.is_some_and(|hash| hash.contains(&field));
    drop(db);
    client.reply(exists);
    Ok(())
}

pub static HGET: Command = Command {
    kind: CommandKind::Hget,
    name: "hget",
    arity: Arity::Exact(3),
    run: hget,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hget(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let hash = db.get_hash(&key)?.ok_or(Reply::Nil)?;
    let reply = hash.get(&field).map(Reply::from);
    drop(db);
    client.reply(reply);
    Ok(())
}

pub static HGETALL: Command = Command {
    kind: CommandKind::Hgetall,
    name: "hgetall",
    arity: Arity::Exact(2),
    run: hgetall,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hgetall(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let mut items: Vec<Reply> = Vec::new();
    if let Some(hash) = db.get_hash(&key)? {
        for (field, value) in hash.iter() {
            items.push(Reply::from(field));
            items.push(Reply::from(value));
        }
    }
    drop(db);
    client.array(items.into_iter());
    Ok(())
}

pub static HINCRBY: Command = Command {
    kind: CommandKind::Hincrby,
    name: "hincrby",
    arity: Arity::Exact(4),
    run: hincrby,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn hincrby(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let by = client.request.i64()?;

    let mut db = store.db(client.db)?.write();
    let hash = db.hash_or_default(&key)?;
    let current = match hash.get(&field) {
        Some(value) => parse::<i64>(value).ok_or(ReplyError::Integer)?,
        None => 0,
    };
    let next = current.checked_add(by).ok_or(ReplyError::IncrOverflow)?;
    hash.set(&field, Bytes::from(next.to_string()));
    db.touch(&key);
    drop(db);
    client.reply(next);
    Ok(())
}

pub static HINCRBYFLOAT: Command = Command {
    kind: CommandKind::Hincrbyfloat,
    name: "hincrbyfloat",
    arity: Arity::Exact(4),
    run: hincrbyfloat,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn hincrbyfloat(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let by = client.request.f64()?;

    let mut db = store.db(client.db)?.write();
    let hash = db.hash_or_default(&key)?;
    let current = match hash.get(&field) {
        Some(value) => parse::<f64>(value).ok_or(ReplyError::Float)?,
        None => 0.0,
    };
    let next = current + by;
    if !next.is_finite() {
        return Err(ReplyError::NanOrInfinity.into());
    }

    let rendered = format_double(next);
    hash.set(&field, Bytes::from(rendered.clone()));
    db.touch(&key);
    drop(db);
    client.reply(Reply::Bulk(rendered.into()));
    Ok(())
}

pub static HKEYS: Command = Command {
    kind: CommandKind::Hkeys,
    name: "hkeys",
    arity: Arity::Exact(2),
    run: hkeys,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hkeys(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let fields: Vec<Reply> = match db.get_hash(&key)? {
        Some(hash) => hash.iter().map(|(field, _)| Reply::from(field)).collect(),
        None => Vec::new(),
    };
    drop(db);
    client.array(fields.into_iter());
    Ok(())
}

pub static HLEN: Command = Command {
    kind: CommandKind::Hlen,
    name: "hlen",
    arity: Arity::Exact(2),
    run: hlen,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hlen(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db.get_hash(&key)?.map_or(0, |hash| hash.len());
    drop(db);
    client.reply(len);
    Ok(())
}

pub static HMGET: Command = Command {
    kind: CommandKind::Hmget,
    name: "hmget",
    arity: Arity::Minimum(3),
    run: hmget,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hmget(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let fields: Vec<_> = client.request.iter().collect();
    let db = store.db(client.db)?.read();
    let hash = db.get_hash(&key)?;

    let replies: Vec<Reply> = fields
        .iter()
        .map(|field| match hash {
            Some(hash) => hash.get(field).map_or(Reply::Nil, Reply::from),
            None => Reply::Nil,
        })
        .collect();
    drop(db);
    client.array(replies.into_iter());
    Ok(())
}

pub static HMSET: Command = Command {
    kind: CommandKind::Hmset,
    name: "hmset",
    arity: Arity::Minimum(4),
    run: hmset,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn hmset(client: &mut Client, store: &Store) -> CommandResult {
    set_fields(client, store)?;
    client.reply("OK");
    Ok(())
}

pub static HRANDFIELD: Command = Command {
    kind: CommandKind::Hrandfield,
    name: "hrandfield",
    arity: Arity::Minimum(2),
    run: hrandfield,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hrandfield(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(raw) => Some(parse::<i64>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };
    let with_values = match client.request.try_pop() {
        Some(raw) if raw.eq_ignore_ascii_case(b"withvalues") => true,
        Some(_) => return Err(ReplyError::Syntax.into()),
        None => false,
    };
    if with_values && count.is_none() {
        return Err(ReplyError::Syntax.into());
    }

    let db = store.db(client.db)?.read();
    let Some(hash) = db.get_hash(&key)? else {
        drop(db);
        match count {
            Some(_) => client.array(std::iter::empty::<Reply>()),
            None => client.reply(Reply::Nil),
        }
        return Ok(());
    };

    let Some(count) = count else {
        let field = hash
            .random_fields(1)
            .into_iter()
            .next()
            .map(|(field, _)| Reply::Bulk(field));
        drop(db);
        client.reply(field);
        return Ok(());
    };

    // Positive counts are distinct; negative counts may repeat.
    let sample = if count >= 0 {
        hash.random_fields(usize::try_from(count).unwrap_or(0))
    } else {
        hash.random_fields_repeating(usize::try_from(count.unsigned_abs()).unwrap_or(0))
    };
    drop(db);

    let mut items = Vec::new();
    for (field, value) in sample {
        items.push(Reply::Bulk(field));
        if with_values {
            items.push(Reply::Bulk(value));
        }
    }
    client.array(items.into_iter());
    Ok(())
}

pub static HSCAN: Command = Command {
    kind: CommandKind::Hscan,
    name: "hscan",
    arity: Arity::Minimum(3),
    run: hscan,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hscan(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let (cursor, count, pattern) = scan_arguments(client)?;

    let db = store.db(client.db)?.read();
    let mut items: Vec<Reply> = Vec::new();
    let mut next = 0;
    if let Some(hash) = db.get_hash(&key)? {
        let mut cursor = cursor;
        loop {
            cursor = hash.scan(cursor, |field, value| {
                let matched = pattern
                    .as_deref()
                    .is_none_or(|pattern| glob::matches(field, pattern));
                if matched {
                    items.push(Reply::from(field));
                    items.push(Reply::from(value));
                }
            });
            if cursor == 0 || items.len() / 2 >= count {
                break;
            }
        }
        next = cursor;
    }
    drop(db);

    client.reply(Reply::Array(2));
    client.reply(Reply::Bulk(Bytes::from(next.to_string())));
    client.array(items.into_iter());
    Ok(())
}

/// Parse `cursor [MATCH pattern] [COUNT n]`, shared by the container
/// scans.
pub fn scan_arguments(
    client: &mut Client,
) -> Result<(u64, usize, Option<Bytes>), ReplyError> {
    let cursor = client.request.u64()?;
    let mut count = 10usize;
    let mut pattern = None;

    while let Some(option) = client.request.try_pop() {
        if option.eq_ignore_ascii_case(b"match") {
            pattern = Some(client.request.pop()?);
        } else if option.eq_ignore_ascii_case(b"count") {
            count = client.request.usize()?;
            if count == 0 {
                return Err(ReplyError::Syntax);
            }
        } else {
            return Err(ReplyError::Syntax);
        }
    }

    Ok((cursor, count, pattern))
}

pub static HSET: Command = Command {
    kind: CommandKind::Hset,
    name: "hset",
    arity: Arity::Minimum(4),
    run: hset,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn hset(client: &mut Client, store: &Store) -> CommandResult {
    let added = set_fields(client, store)?;
    client.reply(added);
    Ok(())
}

fn set_fields(client: &mut Client, store: &Store) -> Result<usize, Reply> {
    let key = client.request.pop()?;
    client.request.assert_pairs()?;

    let mut db = store.db(client.db)?.write();
    let hash = db.hash_or_default(&key)?;
    let mut added = 0;
    while let Some(field) = client.request.try_pop() {
        let value = client.request.pop()?;
        if hash.set(&field, value) {
            added += 1;
        }
    }
    db.touch(&key);
    Ok(added)
}

pub static HSETNX: Command = Command {
    kind: CommandKind::Hsetnx,
    name: "hsetnx",
    arity: Arity::Exact(4),
    run: hsetnx,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn hsetnx(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let value = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    let hash = db.hash_or_default(&key)?;
    let added = hash.set_if_absent(&field, value);
    db.touch(&key);
    drop(db);
    client.reply(added);
    Ok(())
}

pub static HSTRLEN: Command = Command {
    kind: CommandKind::Hstrlen,
    name: "hstrlen",
    arity: Arity::Exact(3),
    run: hstrlen,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hstrlen(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let field = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db
        .get_hash(&key)?
        .and_then(|hash| hash.get(&field))
        .map_or(0, Bytes::len);
    drop(db);
    client.reply(len);
    Ok(())
}

pub static HVALS: Command = Command {
    kind: CommandKind::Hvals,
    name: "hvals",
    arity: Arity::Exact(2),
    run: hvals,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn hvals(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let values: Vec<Reply> = match db.get_hash(&key)? {
        Some(hash) => hash.iter().map(|(_, value)| Reply::from(value)).collect(),
        None => Vec::new(),
    };
    drop(db);
    client.array(values.into_iter());
    Ok(())
}
