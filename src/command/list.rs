use crate::{
    bytes::lex,
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    db::{Edge, Placement},
    reply::{Reply, ReplyError},
    store::Store,
};
use logos::Logos;

pub static LINDEX: Command = Command {
    kind: CommandKind::Lindex,
    name: "lindex",
    arity: Arity::Exact(3),
    run: lindex,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn lindex(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let index = client.request.i64()?;
    let db = store.db(client.db)?.read();
    let list = db.get_list(&key)?.ok_or(Reply::Nil)?;
    let reply = list.get(index).map(Reply::from);
    drop(db);
    client.reply(reply);
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum Where {
    #[regex(b"(?i:before)")]
    Before,

    #[regex(b"(?i:after)")]
    After,
}

pub static LINSERT: Command = Command {
    kind: CommandKind::Linsert,
    name: "linsert",
    arity: Arity::Exact(5),
    run: linsert,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn linsert(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let placement = match lex(&client.request.pop()?[..]) {
        Some(Where::Before) => Placement::Before,
        Some(Where::After) => Placement::After,
        None => return Err(ReplyError::Syntax.into()),
    };
    let pivot = client.request.pop()?;
    let value = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    let Some(list) = db.mut_list(&key)? else {
        drop(db);
        client.reply(0);
        return Ok(());
    };

    let reply = match list.insert(placement, &pivot, value) {
        Some(len) => {
            let reply = Reply::from(len);
            db.touch(&key);
            reply
        }
        None => Reply::Integer(-1),
    };
    drop(db);
    client.reply(reply);
    Ok(())
}

pub static LLEN: Command = Command {
    kind: CommandKind::Llen,
    name: "llen",
    arity: Arity::Exact(2),
    run: llen,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn llen(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db.get_list(&key)?.map_or(0, |list| list.len());
    drop(db);
    client.reply(len);
    Ok(())
}

pub static LPOP: Command = Command {
    kind: CommandKind::Lpop,
    name: "lpop",
    arity: Arity::Minimum(2),
    run: lpop,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn lpop(client: &mut Client, store: &Store) -> CommandResult {
    pop(client, store, Edge::Left)
}

pub static RPOP: Command = Command {
    kind: CommandKind::Rpop,
    name: "rpop",
    arity: Arity::Minimum(2),
    run: rpop,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn rpop(client: &mut Client, store: &Store) -> CommandResult {
    pop(client, store, Edge::Right)
}

fn pop(client: &mut Client, store: &Store, edge: Edge) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(raw) => Some(
            crate::bytes::parse::<usize>(&raw).ok_or(ReplyError::Integer)?,
        ),
        None => None,
    };
    if !client.request.is_empty() {
        return Err(ReplyError::Syntax.into());
    }

    let mut db = store.db(client.db)?.write();
    let Some(list) = db.mut_list(&key)? else {
        drop(db);
        match count {
            Some(_) => client.reply(Reply::Nil),
            None => client.reply(Reply::Nil),
        }
        return Ok(());
    };

    match count {
        None => {
            let item = list.pop(edge);
            db.touch(&key);
            drop(db);
            client.reply(item.map(Reply::from));
        }
        Some(count) => {
            let mut items = Vec::new();
            for _ in 0..count {
                match list.pop(edge) {
                    Some(item) => items.push(item),
                    None => break,
                }
            }
            db.touch(&key);
            drop(db);
            client.array(items.into_iter().map(Reply::from));
        }
    }
    Ok(())
}

pub static LPUSH: Command = Command {
    kind: CommandKind::Lpush,
    name: "lpush",
    arity: Arity::Minimum(3),
    run: lpush,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn lpush(client: &mut Client, store: &Store) -> CommandResult {
    push(client, store, Edge::Left, false)
}

pub static LPUSHX: Command = Command {
    kind: CommandKind::Lpushx,
    name: "lpushx",
    arity: Arity::Minimum(3),
    run: lpushx,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn lpushx(client: &mut Client, store: &Store) -> CommandResult {
    push(client, store, Edge::Left, true)
}

pub static RPUSH: Command = Command {
    kind: CommandKind::Rpush,
    name: "rpush",
    arity: Arity::Minimum(3),
    run: rpush,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn rpush(client: &mut Client, store: &Store) -> CommandResult {
    push(client, store, Edge::Right, false)
}

pub static RPUSHX: Command = Command {
    kind: CommandKind::Rpushx,
    name: "rpushx",
    arity: Arity::Minimum(3),
    run: rpushx,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn rpushx(client: &mut Client, store: &Store) -> CommandResult {
    push(client, store, Edge::Right, true)
}

fn push(client: &mut Client, store: &Store, edge: Edge, require: bool) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();

    if require && db.get_list(&key)?.is_none() {
        drop(db);
        client.reply(0);
        return Ok(());
    }

    let list = db.list_or_default(&key)?;
    while let Some(value) = client.request.try_pop() {
        list.push(edge, value);
    }
    let len = list.len();
    db.touch(&key);
    drop(db);
    client.reply(len);
    Ok(())
}

pub static LRANGE: Command = Command {
    kind: CommandKind::Lrange,
    name: "lrange",
    arity: Arity::Exact(4),
    run: lrange,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn lrange(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;

    let db = store.db(client.db)?.read();
    let items: Vec<Reply> = match db.get_list(&key)? {
        Some(list) => list.range(start, stop).map(Reply::from).collect(),
        None => Vec::new(),
    };
    drop(db);
    client.array(items.into_iter());
    Ok(())
}

pub static LREM: Command = Command {
    kind: CommandKind::Lrem,
    name: "lrem",
    arity: Arity::Exact(4),
    run: lrem,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn lrem(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = client.request.i64()?;
    let value = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    let Some(list) = db.mut_list(&key)? else {
        drop(db);
        client.reply(0);
        return Ok(());
    };

    let removed = list.remove(count, &value);
    if removed > 0 {
        db.touch(&key);
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static LSET: Command = Command {
    kind: CommandKind::Lset,
    name: "lset",
    arity: Arity::Exact(4),
    run: lset,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn lset(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let index = client.request.i64()?;
    let value = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    let list = db.mut_list(&key)?.ok_or(ReplyError::NoSuchKey)?;

    if !list.set(index, value) {
        return Err(ReplyError::IndexOutOfRange.into());
    }
    db.touch(&key);
    drop(db);
    client.reply("OK");
    Ok(())
}

pub static LTRIM: Command = Command {
    kind: CommandKind::Ltrim,
    name: "ltrim",
    arity: Arity::Exact(4),
    run: ltrim,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn ltrim(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;

    let mut db = store.db(client.db)?.write();
    if let Some(list) = db.mut_list(&key)? {
        list.trim(start, stop);
        db.touch(&key);
    }
    drop(db);
    client.reply("OK");
    Ok(())
}
