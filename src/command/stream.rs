use crate::{
    bytes::parse,
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    db::{Group, Pending, Stream, StreamEntry, StreamId},
    reply::{Reply, ReplyError},
    store::Store,
    time::now_ms,
};
use bytes::Bytes;

/// Send one `(id, fields)` entry.
fn reply_entry(client: &mut Client, entry: &StreamEntry) {
    client.reply(Reply::Array(2));
    client.reply(entry.id);
    client.reply(Reply::Array(entry.fields.len() * 2));
    for (field, value) in &entry.fields {
        client.reply(Reply::Bulk(field.clone()));
        client.reply(Reply::Bulk(value.clone()));
    }
}

pub static XADD: Command = Command {
    kind: CommandKind::Xadd,
    name: "xadd",
    arity: Arity::Minimum(5),
    run: xadd,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xadd(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;

    let mut maxlen = None;
    let mut id_raw = client.request.pop()?;
    if id_raw.eq_ignore_ascii_case(b"maxlen") {
        let mut next = client.request.pop()?;
        if next == &b"~"[..] || next == &b"="[..] {
            next = client.request.pop()?;
        }
        maxlen = Some(parse::<usize>(&next).ok_or(ReplyError::Integer)?);
        id_raw = client.request.pop()?;
    }

    let id = if id_raw == &b"*"[..] {
        None
    } else {
        Some(StreamId::parse(&id_raw, 0).ok_or(ReplyError::StreamId)?)
    };

    client.request.assert_pairs()?;
    if client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }
    let mut fields = Vec::new();
    while let Some(field) = client.request.try_pop() {
        let value = client.request.pop()?;
        fields.push((field, value));
    }

    let mut db = store.db(client.db)?.write();
    let stream = db.stream_or_default(&key)?;
    let added = match stream.add(id, fields) {
        Ok(id) => id,
        Err(_) => return Err(ReplyError::StreamIdSmall.into()),
    };
    if let Some(maxlen) = maxlen {
        stream.trim_maxlen(maxlen);
    }
    db.touch(&key);
    drop(db);
    client.reply(added);
    Ok(())
}

pub static XLEN: Command = Command {
    kind: CommandKind::Xlen,
    name: "xlen",
    arity: Arity::Exact(2),
    run: xlen,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn xlen(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db.get_stream(&key)?.map_or(0, Stream::len);
    drop(db);
    client.reply(len);
    Ok(())
}

pub static XRANGE: Command = Command {
    kind: CommandKind::Xrange,
    name: "xrange",
    arity: Arity::Minimum(4),
    run: xrange,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn xrange(client: &mut Client, store: &Store) -> CommandResult {
    range(client, store, false)
}

pub static XREVRANGE: Command = Command {
    kind: CommandKind::Xrevrange,
    name: "xrevrange",
    arity: Arity::Minimum(4),
    run: xrevrange,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn xrevrange(client: &mut Client, store: &Store) -> CommandResult {
    range(client, store, true)
}

fn range(client: &mut Client, store: &Store, reverse: bool) -> CommandResult {
    let key = client.request.pop()?;

    // The reverse form takes (end, start).
    let (start, end) = if reverse {
        let end = client.request.stream_id(u64::MAX)?;
        let start = client.request.stream_id(0)?;
        (start, end)
    } else {
        let start = client.request.stream_id(0)?;
        let end = client.request.stream_id(u64::MAX)?;
        (start, end)
    };

    let count = match client.request.try_pop() {
        Some(raw) if raw.eq_ignore_ascii_case(b"count") => {
            Some(client.request.usize()?)
        }
        Some(_) => return Err(ReplyError::Syntax.into()),
        None => None,
    };

    let db = store.db(client.db)?.read();
    let mut entries: Vec<StreamEntry> = match db.get_stream(&key)? {
        Some(stream) => stream.range(start, end).to_vec(),
        None => Vec::new(),
    };
    drop(db);

    if reverse {
        entries.reverse();
    }
    if let Some(count) = count {
        entries.truncate(count);
    }

    client.reply(Reply::Array(entries.len()));
    for entry in &entries {
        reply_entry(client, entry);
    }
    Ok(())
}

pub static XDEL: Command = Command {
    kind: CommandKind::Xdel,
    name: "xdel",
    arity: Arity::Minimum(3),
    run: xdel,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xdel(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut ids = Vec::new();
    while let Some(raw) = client.request.try_pop() {
        ids.push(StreamId::parse(&raw, 0).ok_or(ReplyError::StreamId)?);
    }

    let mut db = store.db(client.db)?.write();
    let mut removed = 0;
    if let Some(stream) = db.mut_stream(&key)? {
        removed = stream.remove(&ids);
        if removed > 0 {
            db.touch(&key);
        }
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static XTRIM: Command = Command {
    kind: CommandKind::Xtrim,
    name: "xtrim",
    arity: Arity::Minimum(4),
    run: xtrim,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xtrim(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let strategy = client.request.pop()?;
    if !strategy.eq_ignore_ascii_case(b"maxlen") {
        return Err(ReplyError::Syntax.into());
    }
    let mut next = client.request.pop()?;
    if next == &b"~"[..] || next == &b"="[..] {
        next = client.request.pop()?;
    }
    let maxlen = parse::<usize>(&next).ok_or(ReplyError::Integer)?;

    let mut db = store.db(client.db)?.write();
    let mut removed = 0;
    if let Some(stream) = db.mut_stream(&key)? {
        removed = stream.trim_maxlen(maxlen);
        if removed > 0 {
            db.touch(&key);
        }
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static XREAD: Command = Command {
    kind: CommandKind::Xread,
    name: "xread",
    arity: Arity::Minimum(4),
    run: xread,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn xread(client: &mut Client, store: &Store) -> CommandResult {
    let mut count = None;

    loop {
        let argument = client.request.pop()?;
        if argument.eq_ignore_ascii_case(b"count") {
            count = Some(client.request.usize()?);
        } else if argument.eq_ignore_ascii_case(b"streams") {
            break;
        } else {
            return Err(ReplyError::Syntax.into());
        }
    }

    // The remainder splits evenly into keys then ids.
    let rest: Vec<Bytes> = client.request.iter().collect();
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(ReplyError::Syntax.into());
    }
    let (keys, ids) = rest.split_at(rest.len() / 2);

    let db = store.db(client.db)?.read();
    let mut results: Vec<(Bytes, Vec<StreamEntry>)> = Vec::new();
    for (key, raw) in keys.iter().zip(ids) {
        let Some(stream) = db.get_stream(key)? else {
            continue;
        };
        let after = if raw == &b"$"[..] {
            stream.last_id
        } else {
            StreamId::parse(raw, 0).ok_or(ReplyError::StreamId)?
        };
        let mut entries = stream.after(after).to_vec();
        if let Some(count) = count {
            entries.truncate(count);
        }
        if !entries.is_empty() {
            results.push((key.clone(), entries));
        }
    }
    drop(db);

    if results.is_empty() {
        client.reply(Reply::Nil);
        return Ok(());
    }

    client.reply(Reply::Array(results.len()));
    for (key, entries) in results {
        client.reply(Reply::Array(2));
        client.reply(Reply::Bulk(key));
        client.reply(Reply::Array(entries.len()));
        for entry in &entries {
            reply_entry(client, entry);
        }
    }
    Ok(())
}

pub static XGROUP: Command = Command {
    kind: CommandKind::Xgroup,
    name: "xgroup",
    arity: Arity::Minimum(2),
    run: xgroup,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xgroup(client: &mut Client, store: &Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"create") {
        let key = client.request.pop()?;
        let group = client.request.pop()?;
        let raw = client.request.pop()?;
        let mkstream = match client.request.try_pop() {
            Some(option) if option.eq_ignore_ascii_case(b"mkstream") => true,
            Some(_) => return Err(ReplyError::Syntax.into()),
            None => false,
        };

        let mut db = store.db(client.db)?.write();
        if db.get_stream(&key)?.is_none() && !mkstream {
            return Err(ReplyError::NoGroup(group, key).into());
        }
        let stream = db.stream_or_default(&key)?;

        let last_delivered = if raw == &b"$"[..] {
            stream.last_id
        } else {
            StreamId::parse(&raw, 0).ok_or(ReplyError::StreamId)?
        };

        if stream.groups.contains_key(&group) {
            return Err(ReplyError::BusyGroup.into());
        }
        stream.groups.insert(
            group,
            Group {
                last_delivered,
                consumers: hashbrown::HashMap::new(),
            },
        );
        db.touch(&key);
        drop(db);
        client.reply("OK");
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"destroy") {
        let key = client.request.pop()?;
        let group = client.request.pop()?;

        let mut db = store.db(client.db)?.write();
        let mut removed = false;
        if let Some(stream) = db.mut_stream(&key)? {
            removed = stream.groups.remove(&group).is_some();
            if removed {
                db.touch(&key);
            }
        }
        drop(db);
        client.reply(removed);
        return Ok(());
    }

    Err(client.request.unknown_subcommand().into())
}

pub static XREADGROUP: Command = Command {
    kind: CommandKind::Xreadgroup,
    name: "xreadgroup",
    arity: Arity::Minimum(7),
    run: xreadgroup,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xreadgroup(client: &mut Client, store: &Store) -> CommandResult {
    let keyword = client.request.pop()?;
    if !keyword.eq_ignore_ascii_case(b"group") {
        return Err(ReplyError::Syntax.into());
    }
    let group_name = client.request.pop()?;
    let consumer_name = client.request.pop()?;

    let mut count = None;
    let mut noack = false;
    loop {
        let argument = client.request.pop()?;
        if argument.eq_ignore_ascii_case(b"count") {
            count = Some(client.request.usize()?);
        } else if argument.eq_ignore_ascii_case(b"noack") {
            noack = true;
        } else if argument.eq_ignore_ascii_case(b"streams") {
            break;
        } else {
            return Err(ReplyError::Syntax.into());
        }
    }

    let rest: Vec<Bytes> = client.request.iter().collect();
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(ReplyError::Syntax.into());
    }
    let (keys, ids) = rest.split_at(rest.len() / 2);

    let mut db = store.db(client.db)?.write();
    let mut results: Vec<(Bytes, Vec<StreamEntry>)> = Vec::new();
    let now = now_ms();

    for (key, raw) in keys.iter().zip(ids) {
        let stream = db
            .mut_stream(key)?
            .ok_or_else(|| ReplyError::NoGroup(group_name.clone(), key.clone()))?;

        if !stream.groups.contains_key(&group_name) {
            return Err(ReplyError::NoGroup(group_name.clone(), key.clone()).into());
        }

        let entries: Vec<StreamEntry> = if raw == &b">"[..] {
            let group = stream.groups.get(&group_name).expect("checked above");
            let mut fresh = stream.after(group.last_delivered).to_vec();
            if let Some(count) = count {
                fresh.truncate(count);
            }

            let group = stream.groups.get_mut(&group_name).expect("checked above");
            if let Some(last) = fresh.last() {
                group.last_delivered = last.id;
            }
            if !noack {
                let consumer = group.consumers.entry(consumer_name.clone()).or_default();
                for entry in &fresh {
                    let pending = consumer.pending.entry(entry.id).or_insert(Pending {
                        claimed_ms: now,
                        deliveries: 0,
                    });
                    pending.claimed_ms = now;
                    pending.deliveries += 1;
                }
            }
            fresh
        } else {
            // History: the consumer's own pending entries after the id.
            let after = StreamId::parse(raw, 0).ok_or(ReplyError::StreamId)?;
            let group = stream.groups.get(&group_name).expect("checked above");
            let pending_ids: Vec<StreamId> = group
                .consumers
                .get(&consumer_name)
                .map(|consumer| {
                    consumer
                        .pending
                        .keys()
                        .copied()
                        .filter(|id| *id > after)
                        .collect()
                })
                .unwrap_or_default();

            let mut history = Vec::new();
            for id in pending_ids {
                if let Some(entry) = stream.get(id) {
                    history.push(entry.clone());
                }
            }
            if let Some(count) = count {
                history.truncate(count);
            }
            history
        };

        if raw == &b">"[..] && !entries.is_empty() {
            db.touch(key);
        }
        if !entries.is_empty() || raw != &b">"[..] {
            results.push((key.clone(), entries));
        }
    }
    drop(db);

    if results.is_empty() {
        client.reply(Reply::Nil);
        return Ok(());
    }

    client.reply(Reply::Array(results.len()));
    for (key, entries) in results {
        client.reply(Reply::Array(2));
        client.reply(Reply::Bulk(key));
        client.reply(Reply::Array(entries.len()));
        for entry in &entries {
            reply_entry(client, entry);
        }
    }
    Ok(())
}

pub static XACK: Command = Command {
    kind: CommandKind::Xack,
    name: "xack",
    arity: Arity::Minimum(4),
    run: xack,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xack(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let group_name = client.request.pop()?;
    let mut ids = Vec::new();
    while let Some(raw) = client.request.try_pop() {
        ids.push(StreamId::parse(&raw, 0).ok_or(ReplyError::StreamId)?);
    }

    let mut db = store.db(client.db)?.write();
    let mut acked = 0;
    if let Some(stream) = db.mut_stream(&key)? {
        if let Some(group) = stream.groups.get_mut(&group_name) {
            for id in ids {
                if group.ack(id) {
                    acked += 1;
                }
            }
        }
        if acked > 0 {
            db.touch(&key);
        }
    }
    drop(db);
    client.reply(acked);
    Ok(())
}

pub static XCLAIM: Command = Command {
    kind: CommandKind::Xclaim,
    name: "xclaim",
    arity: Arity::Minimum(6),
    run: xclaim,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn xclaim(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let group_name = client.request.pop()?;
    let consumer_name = client.request.pop()?;
    let min_idle = client.request.i64()?;
    if min_idle < 0 {
        return Err(ReplyError::Integer.into());
    }
    let min_idle = u64::try_from(min_idle).unwrap_or(0);

    let mut ids = Vec::new();
    let mut justid = false;
    while let Some(raw) = client.request.try_pop() {
        if raw.eq_ignore_ascii_case(b"justid") {
            justid = true;
        } else {
            ids.push(StreamId::parse(&raw, 0).ok_or(ReplyError::StreamId)?);
        }
    }

    let now = now_ms();
    let mut db = store.db(client.db)?.write();
    let stream = db
        .mut_stream(&key)?
        .ok_or_else(|| ReplyError::NoGroup(group_name.clone(), key.clone()))?;
    let Some(group) = stream.groups.get_mut(&group_name) else {
        return Err(ReplyError::NoGroup(group_name, key).into());
    };

    let mut claimed_ids = Vec::new();
    for id in ids {
        // Find the current holder and check the idle gate.
        let mut taken = None;
        for consumer in group.consumers.values_mut() {
            if let Some(pending) = consumer.pending.get(&id).copied() {
                if now.saturating_sub(pending.claimed_ms) >= min_idle {
                    consumer.pending.remove(&id);
                    taken = Some(pending);
                }
                break;
            }
        }
        if let Some(mut pending) = taken {
            pending.claimed_ms = now;
            pending.deliveries += 1;
            group
                .consumers
                .entry(consumer_name.clone())
                .or_default()
                .pending
                .insert(id, pending);
            claimed_ids.push(id);
        }
    }

    let mut entries = Vec::new();
    if !justid {
        for id in &claimed_ids {
            if let Some(entry) = stream.get(*id) {
                entries.push(entry.clone());
            }
        }
    }
    if !claimed_ids.is_empty() {
        db.touch(&key);
    }
    drop(db);

    if justid {
        client.array(claimed_ids.into_iter().map(Reply::from));
    } else {
        client.reply(Reply::Array(entries.len()));
        for entry in &entries {
            reply_entry(client, entry);
        }
    }
    Ok(())
}

pub static XPENDING: Command = Command {
    kind: CommandKind::Xpending,
    name: "xpending",
    arity: Arity::Minimum(3),
    run: xpending,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn xpending(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let group_name = client.request.pop()?;

    let extended = if client.request.is_empty() {
        None
    } else {
        let start = client.request.stream_id(0)?;
        let end = client.request.stream_id(u64::MAX)?;
        let count = client.request.usize()?;
        let consumer = client.request.try_pop();
        Some((start, end, count, consumer))
    };

    let db = store.db(client.db)?.read();
    let stream = db
        .get_stream(&key)?
        .ok_or_else(|| ReplyError::NoGroup(group_name.clone(), key.clone()))?;
    let Some(group) = stream.groups.get(&group_name) else {
        return Err(ReplyError::NoGroup(group_name, key).into());
    };

    match extended {
        None => {
            // Summary: count, min id, max id, per-consumer counts.
            let mut min = None;
            let mut max = None;
            let mut per_consumer: Vec<(Bytes, usize)> = Vec::new();
            for (name, consumer) in &group.consumers {
                if consumer.pending.is_empty() {
                    continue;
                }
                per_consumer.push((name.clone(), consumer.pending.len()));
                let first = consumer.pending.keys().next().copied();
                let last = consumer.pending.keys().next_back().copied();
                min = match (min, first) {
                    (None, first) => first,
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (some, None) => some,
                };
                max = match (max, last) {
                    (None, last) => last,
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (some, None) => some,
                };
            }
            let total = group.pending_len();
            drop(db);

            client.reply(Reply::Array(4));
            client.reply(total);
            client.reply(min.map(Reply::from));
            client.reply(max.map(Reply::from));
            client.reply(Reply::Array(per_consumer.len()));
            for (name, count) in per_consumer {
                client.reply(Reply::Array(2));
                client.reply(Reply::Bulk(name));
                client.reply(Reply::Bulk(Bytes::from(count.to_string())));
            }
        }
        Some((start, end, count, only_consumer)) => {
            let now = now_ms();
            let mut rows: Vec<(StreamId, Bytes, u64, u64)> = Vec::new();
            for (name, consumer) in &group.consumers {
                if only_consumer.as_ref().is_some_and(|only| only != name) {
                    continue;
                }
                for (id, pending) in &consumer.pending {
                    if *id >= start && *id <= end {
                        rows.push((
                            *id,
                            name.clone(),
                            now.saturating_sub(pending.claimed_ms),
                            pending.deliveries,
                        ));
                    }
                }
            }
            drop(db);

            rows.sort_by_key(|(id, ..)| *id);
            rows.truncate(count);

            client.reply(Reply::Array(rows.len()));
            for (id, consumer, idle, deliveries) in rows {
                client.reply(Reply::Array(4));
                client.reply(id);
                client.reply(Reply::Bulk(consumer));
                client.reply(i64::try_from(idle).unwrap_or(i64::MAX));
                client.reply(i64::try_from(deliveries).unwrap_or(i64::MAX));
            }
        }
    }
    Ok(())
}

pub static XINFO: Command = Command {
    kind: CommandKind::Xinfo,
    name: "xinfo",
    arity: Arity::Minimum(2),
    run: xinfo,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn xinfo(client: &mut Client, store: &Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"stream") {
        let key = client.request.pop()?;
        let db = store.db(client.db)?.read();
        let stream = db.get_stream(&key)?.ok_or(ReplyError::NoSuchKey)?;

        let length = stream.len();
        let last_id = stream.last_id;
        let groups = stream.groups.len();
        let first = stream.first().cloned();
        let last = stream.last().cloned();
        drop(db);

        client.reply(Reply::Array(10));
        client.reply(Reply::Bulk(Bytes::from_static(b"length")));
        client.reply(length);
        client.reply(Reply::Bulk(Bytes::from_static(b"last-generated-id")));
        client.reply(last_id);
        client.reply(Reply::Bulk(Bytes::from_static(b"groups")));
        client.reply(groups);
        client.reply(Reply::Bulk(Bytes::from_static(b"first-entry")));
        match &first {
            Some(entry) => reply_entry(client, entry),
            None => client.reply(Reply::Nil),
        }
        client.reply(Reply::Bulk(Bytes::from_static(b"last-entry")));
        match &last {
            Some(entry) => reply_entry(client, entry),
            None => client.reply(Reply::Nil),
        }
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"groups") {
        let key = client.request.pop()?;
        let db = store.db(client.db)?.read();
        let stream = db.get_stream(&key)?.ok_or(ReplyError::NoSuchKey)?;

        let rows: Vec<(Bytes, usize, usize, StreamId)> = stream
            .groups
            .iter()
            .map(|(name, group)| {
                (
                    name.clone(),
                    group.consumers.len(),
                    group.pending_len(),
                    group.last_delivered,
                )
            })
            .collect();
        drop(db);

        client.reply(Reply::Array(rows.len()));
        for (name, consumers, pending, last_delivered) in rows {
            client.reply(Reply::Array(8));
            client.reply(Reply::Bulk(Bytes::from_static(b"name")));
            client.reply(Reply::Bulk(name));
            client.reply(Reply::Bulk(Bytes::from_static(b"consumers")));
            client.reply(consumers);
            client.reply(Reply::Bulk(Bytes::from_static(b"pending")));
            client.reply(pending);
            client.reply(Reply::Bulk(Bytes::from_static(b"last-delivered-id")));
            client.reply(last_delivered);
        }
        return Ok(());
    }

    Err(client.request.unknown_subcommand().into())
}
