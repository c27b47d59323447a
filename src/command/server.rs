use crate::{
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    reply::{Reply, ReplyError},
    store::Store,
    time::epoch,
    VERSION,
};
use bytes::Bytes;
use std::fmt::Write;
use std::sync::atomic::Ordering;

pub static PING: Command = Command {
    kind: CommandKind::Ping,
    name: "ping",
    arity: Arity::Minimum(1),
    run: ping,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn ping(client: &mut Client, _: &Store) -> CommandResult {
    match client.request.try_pop() {
        Some(message) => client.reply(Reply::Bulk(message)),
        None => client.reply("PONG"),
    }
    if !client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }
    Ok(())
}

pub static ECHO: Command = Command {
    kind: CommandKind::Echo,
    name: "echo",
    arity: Arity::Exact(2),
    run: echo,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn echo(client: &mut Client, _: &Store) -> CommandResult {
    let message = client.request.pop()?;
    client.reply(Reply::Bulk(message));
    Ok(())
}

pub static QUIT: Command = Command {
    kind: CommandKind::Quit,
    name: "quit",
    arity: Arity::Exact(1),
    run: quit,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn quit(client: &mut Client, _: &Store) -> CommandResult {
    client.reply("OK");
    client.quit();
    Ok(())
}

pub static SELECT: Command = Command {
    kind: CommandKind::Select,
    name: "select",
    arity: Arity::Exact(2),
    run: select,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn select(client: &mut Client, store: &Store) -> CommandResult {
    let index = client.request.db_index()?;
    store.db(index)?;
    client.db = index;
    client.reply("OK");
    Ok(())
}

pub static AUTH: Command = Command {
    kind: CommandKind::Auth,
    name: "auth",
    arity: Arity::Minimum(2),
    run: auth,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn auth(_: &mut Client, _: &Store) -> CommandResult {
    // No password support: a constant response.
    Err(ReplyError::AuthWithoutPassword.into())
}

pub static DBSIZE: Command = Command {
    kind: CommandKind::Dbsize,
    name: "dbsize",
    arity: Arity::Exact(1),
    run: dbsize,
    keys: Keys::None,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn dbsize(client: &mut Client, store: &Store) -> CommandResult {
    let db = store.db(client.db)?.read();
    let len = db.len();
    drop(db);
    client.reply(len);
    Ok(())
}

pub static TIME: Command = Command {
    kind: CommandKind::Time,
    name: "time",
    arity: Arity::Exact(1),
    run: time,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn time(client: &mut Client, _: &Store) -> CommandResult {
    let now = epoch();
    client.reply(Reply::Array(2));
    client.reply(Reply::Bulk(now.as_secs().to_string().into()));
    client.reply(Reply::Bulk(now.subsec_micros().to_string().into()));
    Ok(())
}

pub static FLUSHDB: Command = Command {
    kind: CommandKind::Flushdb,
    name: "flushdb",
    arity: Arity::Minimum(1),
    run: flushdb,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn flush_mode(client: &mut Client) -> CommandResult {
    // ASYNC and SYNC parse but flushing is immediate either way.
    match client.request.try_pop() {
        Some(mode)
            if mode.eq_ignore_ascii_case(b"async") || mode.eq_ignore_ascii_case(b"sync") =>
        {
            Ok(())
        }
        Some(_) => Err(ReplyError::Syntax.into()),
        None => Ok(()),
    }
}

fn flushdb(client: &mut Client, store: &Store) -> CommandResult {
    flush_mode(client)?;
    let mut db = store.db(client.db)?.write();
    db.clear();
    drop(db);
    store.touch_db(client.db);
    client.reply("OK");
    Ok(())
}

pub static FLUSHALL: Command = Command {
    kind: CommandKind::Flushall,
    name: "flushall",
    arity: Arity::Minimum(1),
    run: flushall,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn flushall(client: &mut Client, store: &Store) -> CommandResult {
    flush_mode(client)?;
    for db in &store.dbs {
        db.write().clear();
    }
    store.touch_all();
    client.reply("OK");
    Ok(())
}

pub static INFO: Command = Command {
    kind: CommandKind::Info,
    name: "info",
    arity: Arity::Minimum(1),
    run: info,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn info(client: &mut Client, store: &Store) -> CommandResult {
    let section = client.request.try_pop();
    let wanted = |name: &str| {
        section
            .as_ref()
            .is_none_or(|section| section.eq_ignore_ascii_case(name.as_bytes()))
    };

    let mut out = String::new();

    if wanted("server") {
        _ = writeln!(out, "# Server");
        _ = writeln!(out, "cinnabar_version:{VERSION}");
        _ = writeln!(out, "uptime_in_seconds:{}", store.started_at.elapsed().as_secs());
        _ = writeln!(out, "tcp_port:{}", store.config.port);
        _ = writeln!(out);
    }

    if wanted("clients") {
        _ = writeln!(out, "# Clients");
        _ = writeln!(out, "connected_clients:{}", store.clients.lock().len());
        _ = writeln!(out);
    }

    if wanted("memory") {
        _ = writeln!(out, "# Memory");
        _ = writeln!(out, "used_memory:{}", store.used_memory());
        _ = writeln!(out, "maxmemory:{}", store.eviction.max_memory());
        _ = writeln!(out, "maxmemory_policy:{}", store.eviction.policy().name());
        _ = writeln!(
            out,
            "evicted_keys:{}",
            store.eviction.stats.evicted_keys.load(Ordering::Relaxed)
        );
        _ = writeln!(
            out,
            "evicted_bytes:{}",
            store.eviction.stats.freed_bytes.load(Ordering::Relaxed)
        );
        _ = writeln!(out);
    }

    if wanted("persistence") {
        _ = writeln!(out, "# Persistence");
        _ = writeln!(
            out,
            "rdb_changes_since_last_save:{}",
            store.stats.dirty.load(Ordering::Relaxed)
        );
        _ = writeln!(
            out,
            "rdb_bgsave_in_progress:{}",
            i32::from(store.snapshot.is_saving())
        );
        _ = writeln!(out, "rdb_last_save_time:{}", store.snapshot.last_save_secs());
        _ = writeln!(out, "aof_enabled:{}", i32::from(store.aof.enabled()));
        _ = writeln!(
            out,
            "aof_rewrite_in_progress:{}",
            i32::from(store.aof.is_rewriting())
        );
        _ = writeln!(out, "aof_fsync_policy:{}", store.aof.policy().name());
        _ = writeln!(out);
    }

    if wanted("stats") {
        _ = writeln!(out, "# Stats");
        _ = writeln!(
            out,
            "total_connections_received:{}",
            store.stats.connections.load(Ordering::Relaxed)
        );
        _ = writeln!(
            out,
            "total_commands_processed:{}",
            store.stats.commands.load(Ordering::Relaxed)
        );
        _ = writeln!(
            out,
            "expired_keys:{}",
            store.stats.expired.load(Ordering::Relaxed)
        );
        _ = writeln!(out);
    }

    if wanted("keyspace") {
        _ = writeln!(out, "# Keyspace");
        for db in &store.dbs {
            let inner = db.read();
            if !inner.is_empty() {
                _ = writeln!(
                    out,
                    "db{}:keys={},expires={}",
                    inner.index(),
                    inner.len(),
                    inner.expires_len()
                );
            }
        }
        _ = writeln!(out);
    }

    client.reply(Reply::Bulk(Bytes::from(out)));
    Ok(())
}
