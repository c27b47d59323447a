use crate::{
    client::Client,
    command::{scan_arguments, Arity, Command, CommandKind, CommandResult, Keys},
    db::LruKind,
    reply::{Reply, ReplyError},
    store::Store,
};
use bytes::Bytes;

pub static DEL: Command = Command {
    kind: CommandKind::Del,
    name: "del",
    arity: Arity::Minimum(2),
    run: del,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn del(client: &mut Client, store: &Store) -> CommandResult {
    let mut db = store.db(client.db)?.write();
    let mut removed = 0;
    while let Some(key) = client.request.try_pop() {
        if db.remove(&key).is_some() {
            removed += 1;
        }
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

/// UNLINK shares DEL's semantics; values are reclaimed when the guard
/// drops either way.
pub static UNLINK: Command = Command {
    kind: CommandKind::Unlink,
    name: "unlink",
    arity: Arity::Minimum(2),
    run: del,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

pub static EXISTS: Command = Command {
    kind: CommandKind::Exists,
    name: "exists",
    arity: Arity::Minimum(2),
    run: exists,
    keys: Keys::All,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn exists(client: &mut Client, store: &Store) -> CommandResult {
    let db = store.db(client.db)?.read();
    let mut present = 0;
    while let Some(key) = client.request.try_pop() {
        if db.exists(&key) {
            present += 1;
        }
    }
    drop(db);
    client.reply(present);
    Ok(())
}

pub static TYPE: Command = Command {
    kind: CommandKind::Type,
    name: "type",
    arity: Arity::Exact(2),
    run: kind,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn kind(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let kind = db.kind_of(&key).unwrap_or("none");
    drop(db);
    client.reply(kind);
    Ok(())
}

pub static KEYS: Command = Command {
    kind: CommandKind::Keys,
    name: "keys",
    arity: Arity::Exact(2),
    run: keys,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn keys(client: &mut Client, store: &Store) -> CommandResult {
    let pattern = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let keys = db.keys(&pattern);
    drop(db);
    client.array(keys.into_iter().map(Reply::from));
    Ok(())
}

pub static RANDOMKEY: Command = Command {
    kind: CommandKind::Randomkey,
    name: "randomkey",
    arity: Arity::Exact(1),
    run: randomkey,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn randomkey(client: &mut Client, store: &Store) -> CommandResult {
    let db = store.db(client.db)?.read();
    let key = db.random_key();
    drop(db);
    client.reply(key.map(Reply::from));
    Ok(())
}

pub static RENAME: Command = Command {
    kind: CommandKind::Rename,
    name: "rename",
    arity: Arity::Exact(3),
    run: rename,
    keys: Keys::Double,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn rename(client: &mut Client, store: &Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    match db.rename(&src, &dst, false) {
        Some(_) => {
            drop(db);
            client.reply("OK");
            Ok(())
        }
        None => Err(ReplyError::NoSuchKey.into()),
    }
}

pub static RENAMENX: Command = Command {
    kind: CommandKind::Renamenx,
    name: "renamenx",
    arity: Arity::Exact(3),
    run: renamenx,
    keys: Keys::Double,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn renamenx(client: &mut Client, store: &Store) -> CommandResult {
    let src = client.request.pop()?;
    let dst = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    match db.rename(&src, &dst, true) {
        Some(renamed) => {
            drop(db);
            client.reply(renamed);
            Ok(())
        }
        None => Err(ReplyError::NoSuchKey.into()),
    }
}

pub static EXPIRE: Command = Command {
    kind: CommandKind::Expire,
    name: "expire",
    arity: Arity::Exact(3),
    run: expire,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn expire(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.ttl_secs()?;
    set_deadline(client, store, &key, at)
}

pub static PEXPIRE: Command = Command {
    kind: CommandKind::Pexpire,
    name: "pexpire",
    arity: Arity::Exact(3),
    run: pexpire,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn pexpire(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.ttl_millis()?;
    set_deadline(client, store, &key, at)
}

pub static EXPIREAT: Command = Command {
    kind: CommandKind::Expireat,
    name: "expireat",
    arity: Arity::Exact(3),
    run: expireat,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn expireat(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.deadline_secs()?;
    set_deadline(client, store, &key, at)
}

pub static PEXPIREAT: Command = Command {
    kind: CommandKind::Pexpireat,
    name: "pexpireat",
    arity: Arity::Exact(3),
    run: pexpireat,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn pexpireat(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let at = client.request.deadline_millis()?;
    set_deadline(client, store, &key, at)
}

fn set_deadline(client: &mut Client, store: &Store, key: &[u8], at: u64) -> CommandResult {
    let mut db = store.db(client.db)?.write();
    let updated = db.expire_at(key, at);
    drop(db);
    client.reply(updated);
    Ok(())
}

pub static TTL: Command = Command {
    kind: CommandKind::Ttl,
    name: "ttl",
    arity: Arity::Exact(2),
    run: ttl,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn ttl(client: &mut Client, store: &Store) -> CommandResult {
    remaining(client, store, 1000)
}

pub static PTTL: Command = Command {
    kind: CommandKind::Pttl,
    name: "pttl",
    arity: Arity::Exact(2),
    run: pttl,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn pttl(client: &mut Client, store: &Store) -> CommandResult {
    remaining(client, store, 1)
}

fn remaining(client: &mut Client, store: &Store, unit: u64) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let state = db.ttl_ms(&key);
    drop(db);

    let reply = match state {
        None => -2,
        Some(None) => -1,
        Some(Some(ms)) => i64::try_from(ms.div_ceil(unit)).unwrap_or(i64::MAX),
    };
    client.reply(reply);
    Ok(())
}

pub static PERSIST: Command = Command {
    kind: CommandKind::Persist,
    name: "persist",
    arity: Arity::Exact(2),
    run: persist,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn persist(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let removed = db.persist(&key);
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static SCAN: Command = Command {
    kind: CommandKind::Scan,
    name: "scan",
    arity: Arity::Minimum(2),
    run: scan,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn scan(client: &mut Client, store: &Store) -> CommandResult {
    let (cursor, count, pattern) = scan_arguments(client)?;

    let db = store.db(client.db)?.read();
    let (next, keys) = db.scan(cursor, count, pattern.as_deref());
    drop(db);

    client.reply(Reply::Array(2));
    client.reply(Reply::Bulk(Bytes::from(next.to_string())));
    client.array(keys.into_iter().map(Reply::from));
    Ok(())
}

pub static OBJECT: Command = Command {
    kind: CommandKind::Object,
    name: "object",
    arity: Arity::Minimum(2),
    run: object,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn object(client: &mut Client, store: &Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"help") {
        let lines = [
            "OBJECT <subcommand> <key>",
            "    ENCODING -- the internal representation of the value.",
            "    FREQ     -- the access frequency counter (LFU policies).",
            "    IDLETIME -- seconds since the value was last accessed.",
            "    REFCOUNT -- the number of references to the value.",
        ];
        client.array(lines.into_iter().map(Reply::from));
        return Ok(());
    }

    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();

    if subcommand.eq_ignore_ascii_case(b"encoding") {
        let encoding = db.get(&key).map(|object| object.value.encoding());
        drop(db);
        match encoding {
            Some(encoding) => client.reply(Reply::Bulk(Bytes::from_static(encoding.as_bytes()))),
            None => return Err(ReplyError::NoSuchKey.into()),
        }
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"refcount") {
        let present = db.exists(&key);
        drop(db);
        if !present {
            return Err(ReplyError::NoSuchKey.into());
        }
        // Values are uniquely owned.
        client.reply(1);
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"idletime") {
        let idle = db.get(&key).map(|object| object.idle_seconds());
        let kind = db.lru_kind();
        drop(db);
        match idle {
            Some(idle) => {
                let idle = if kind == LruKind::Lru { idle } else { 0 };
                client.reply(i64::from(idle));
            }
            None => return Err(ReplyError::NoSuchKey.into()),
        }
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"freq") {
        let freq = db.get(&key).map(|object| object.frequency());
        drop(db);
        match freq {
            Some(freq) => client.reply(i64::from(freq)),
            None => return Err(ReplyError::NoSuchKey.into()),
        }
        return Ok(());
    }

    drop(db);
    Err(client.request.unknown_subcommand().into())
}
