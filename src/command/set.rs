use crate::{
    bytes::parse,
    client::Client,
    command::{scan_arguments, Arity, Command, CommandKind, CommandResult, Keys},
    db::Set,
    glob,
    reply::{Reply, ReplyError},
    store::Store,
};
use bytes::Bytes;

pub static SADD: Command = Command {
    kind: CommandKind::Sadd,
    name: "sadd",
    arity: Arity::Minimum(3),
    run: sadd,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn sadd(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let set = db.set_or_default(&key)?;

    let mut added = 0;
    while let Some(member) = client.request.try_pop() {
        if set.add(&member) {
            added += 1;
        }
    }
    db.touch(&key);
    drop(db);
    client.reply(added);
    Ok(())
}

pub static SCARD: Command = Command {
    kind: CommandKind::Scard,
    name: "scard",
    arity: Arity::Exact(2),
    run: scard,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn scard(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db.get_set(&key)?.map_or(0, Set::len);
    drop(db);
    client.reply(len);
    Ok(())
}

/// The three set algebra operations share a shape: compute the result
/// member list, then reply with it or store it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Algebra {
    Diff,
    Inter,
    Union,
}

fn algebra(
    client: &mut Client,
    store: &Store,
    op: Algebra,
    destination: Option<Bytes>,
) -> CommandResult {
    let keys: Vec<_> = client.request.iter().collect();
    let mut db = store.db(client.db)?.write();
    let empty = Set::default();

    let mut sets = Vec::new();
    for key in &keys {
        sets.push(db.get_set(key)?);
    }

    let members: Vec<Bytes> = match op {
        Algebra::Union => {
            let mut result = Set::default();
            for set in sets.iter().copied().flatten() {
                for member in set.iter() {
                    result.add(member);
                }
            }
            result.iter().cloned().collect()
        }
        Algebra::Inter => match sets.first() {
            Some(Some(first)) => {
                let rest: Vec<&Set> =
                    sets[1..].iter().map(|set| set.unwrap_or(&empty)).collect();
                first.intersect(&rest).cloned().collect()
            }
            _ => Vec::new(),
        },
        Algebra::Diff => match sets.first() {
            Some(Some(first)) => {
                let rest: Vec<&Set> =
                    sets[1..].iter().map(|set| set.unwrap_or(&empty)).collect();
                first.difference(&rest).cloned().collect()
            }
            _ => Vec::new(),
        },
    };
    drop(sets);

    match destination {
        Some(destination) => {
            let len = members.len();
            if members.is_empty() {
                db.remove(&destination);
            } else {
                db.set(&destination, members.into_iter().collect::<Set>().into());
            }
            drop(db);
            client.reply(len);
        }
        None => {
            drop(db);
            client.array(members.into_iter().map(Reply::from));
        }
    }
    Ok(())
}

pub static SDIFF: Command = Command {
    kind: CommandKind::Sdiff,
    name: "sdiff",
    arity: Arity::Minimum(2),
    run: sdiff,
    keys: Keys::All,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn sdiff(client: &mut Client, store: &Store) -> CommandResult {
    algebra(client, store, Algebra::Diff, None)
}

pub static SDIFFSTORE: Command = Command {
    kind: CommandKind::Sdiffstore,
    name: "sdiffstore",
    arity: Arity::Minimum(3),
    run: sdiffstore,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn sdiffstore(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    algebra(client, store, Algebra::Diff, Some(destination))
}

pub static SINTER: Command = Command {
    kind: CommandKind::Sinter,
    name: "sinter",
    arity: Arity::Minimum(2),
    run: sinter,
    keys: Keys::All,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn sinter(client: &mut Client, store: &Store) -> CommandResult {
    algebra(client, store, Algebra::Inter, None)
}

pub static SINTERSTORE: Command = Command {
    kind: CommandKind::Sinterstore,
    name: "sinterstore",
    arity: Arity::Minimum(3),
    run: sinterstore,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn sinterstore(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    algebra(client, store, Algebra::Inter, Some(destination))
}

pub static SUNION: Command = Command {
    kind: CommandKind::Sunion,
    name: "sunion",
    arity: Arity::Minimum(2),
    run: sunion,
    keys: Keys::All,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn sunion(client: &mut Client, store: &Store) -> CommandResult {
    algebra(client, store, Algebra::Union, None)
}

pub static SUNIONSTORE: Command = Command {
    kind: CommandKind::Sunionstore,
    name: "sunionstore",
    arity: Arity::Minimum(3),
    run: sunionstore,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn sunionstore(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    algebra(client, store, Algebra::Union, Some(destination))
}

pub static SISMEMBER: Command = Command {
    kind: CommandKind::Sismember,
    name: "sismember",
    arity: Arity::Exact(3),
    run: sismember,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn sismember(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let contains = db.get_set(&key)?.is_some_and(|set| set.contains(&member));
    drop(db);
    client.reply(contains);
    Ok(())
}

pub static SMEMBERS: Command = Command {
    kind: CommandKind::Smembers,
    name: "smembers",
    arity: Arity::Exact(2),
    run: smembers,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn smembers(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let members: Vec<Reply> = match db.get_set(&key)? {
        Some(set) => set.iter().map(Reply::from).collect(),
        None => Vec::new(),
    };
    drop(db);
    client.array(members.into_iter());
    Ok(())
}

pub static SMISMEMBER: Command = Command {
    kind: CommandKind::Smismember,
    name: "smismember",
    arity: Arity::Minimum(3),
    run: smismember,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn smismember(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<_> = client.request.iter().collect();
    let db = store.db(client.db)?.read();
    let set = db.get_set(&key)?;

    let replies: Vec<Reply> = members
        .iter()
        .map(|member| Reply::from(set.is_some_and(|set| set.contains(member))))
        .collect();
    drop(db);
    client.array(replies.into_iter());
    Ok(())
}

pub static SMOVE: Command = Command {
    kind: CommandKind::Smove,
    name: "smove",
    arity: Arity::Exact(4),
    run: smove,
    keys: Keys::Double,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn smove(client: &mut Client, store: &Store) -> CommandResult {
    let source = client.request.pop()?;
    let destination = client.request.pop()?;
    let member = client.request.pop()?;

    let mut db = store.db(client.db)?.write();

    // Check both types up front so a failed move can't half-apply.
    let moved = db.get_set(&source)?.is_some_and(|set| set.contains(&member));
    db.get_set(&destination)?;

    if !moved {
        drop(db);
        client.reply(0);
        return Ok(());
    }

    db.mut_set(&source)?
        .expect("source checked above")
        .remove(&member);
    db.touch(&source);
    db.set_or_default(&destination)?.add(&member);
    db.touch(&destination);
    drop(db);
    client.reply(1);
    Ok(())
}

pub static SPOP: Command = Command {
    kind: CommandKind::Spop,
    name: "spop",
    arity: Arity::Minimum(2),
    run: spop,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn spop(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(raw) => Some(parse::<usize>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };

    let mut db = store.db(client.db)?.write();
    let Some(set) = db.mut_set(&key)? else {
        drop(db);
        match count {
            Some(_) => client.array(std::iter::empty::<Reply>()),
            None => client.reply(Reply::Nil),
        }
        return Ok(());
    };

    let picked = set.random_members(count.unwrap_or(1));
    for member in &picked {
        set.remove(member);
    }
    if !picked.is_empty() {
        db.touch(&key);
    }
    drop(db);

    match count {
        Some(_) => client.array(picked.into_iter().map(Reply::from)),
        None => client.reply(picked.into_iter().next().map(Reply::from)),
    }
    Ok(())
}

pub static SRANDMEMBER: Command = Command {
    kind: CommandKind::Srandmember,
    name: "srandmember",
    arity: Arity::Minimum(2),
    run: srandmember,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn srandmember(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(raw) => Some(parse::<i64>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };

    let db = store.db(client.db)?.read();
    let Some(set) = db.get_set(&key)? else {
        drop(db);
        match count {
            Some(_) => client.array(std::iter::empty::<Reply>()),
            None => client.reply(Reply::Nil),
        }
        return Ok(());
    };

    match count {
        None => {
            let member = set.random_member().cloned();
            drop(db);
            client.reply(member.map(Reply::from));
        }
        // Positive counts are distinct; negative counts may repeat.
        Some(count) if count >= 0 => {
            let members = set.random_members(usize::try_from(count).unwrap_or(0));
            drop(db);
            client.array(members.into_iter().map(Reply::from));
        }
        Some(count) => {
            let wanted = usize::try_from(count.unsigned_abs()).unwrap_or(0);
            let mut members = Vec::with_capacity(wanted);
            for _ in 0..wanted {
                if let Some(member) = set.random_member() {
                    members.push(member.clone());
                }
            }
            drop(db);
            client.array(members.into_iter().map(Reply::from));
        }
    }
    Ok(())
}

pub static SREM: Command = Command {
    kind: CommandKind::Srem,
    name: "srem",
    arity: Arity::Minimum(3),
    run: srem,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn srem(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let Some(set) = db.mut_set(&key)? else {
        drop(db);
        client.reply(0);
        return Ok(());
    };

    let mut removed = 0;
    while let Some(member) = client.request.try_pop() {
        if set.remove(&member) {
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

pub static SSCAN: Command = Command {
    kind: CommandKind::Sscan,
    name: "sscan",
    arity: Arity::Minimum(3),
    run: sscan,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn sscan(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let (cursor, count, pattern) = scan_arguments(client)?;

    let db = store.db(client.db)?.read();
    let mut items: Vec<Reply> = Vec::new();
    let mut next = 0;
    if let Some(set) = db.get_set(&key)? {
        let mut cursor = cursor;
        loop {
            cursor = set.scan(cursor, |member| {
                let matched = pattern
                    .as_deref()
                    .is_none_or(|pattern| glob::matches(member, pattern));
                if matched {
                    items.push(Reply::from(member));
                }
            });
            if cursor == 0 || items.len() >= count {
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
