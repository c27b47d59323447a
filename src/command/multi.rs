use crate::{
    client::{Argument, Client, Tx},
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    reply::{Reply, ReplyError},
    store::Store,
};

pub static MULTI: Command = Command {
    kind: CommandKind::Multi,
    name: "multi",
    arity: Arity::Exact(1),
    run: multi,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn multi(client: &mut Client, _: &Store) -> CommandResult {
    if client.tx() != Tx::None {
        return Err(ReplyError::MultiNested.into());
    }
    debug_assert!(client.queue.is_empty());
    client.set_tx(Tx::Some(0));
    client.reply("OK");
    Ok(())
}

pub static EXEC: Command = Command {
    kind: CommandKind::Exec,
    name: "exec",
    arity: Arity::Exact(1),
    run: exec,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn exec(client: &mut Client, store: &Store) -> CommandResult {
    let count = match client.set_tx(Tx::None) {
        Tx::None => return Err(ReplyError::ExecWithoutMulti.into()),
        Tx::Error(_) => {
            client.queue.clear();
            store.unwatch(client.id);
            return Err(ReplyError::ExecAbort.into());
        }
        Tx::Some(count) => count,
    };

    // Exclusive execution: no other connection commits a write between
    // the dirty check and the last queued command.
    let exec_guard = store.exec_lock.write();

    if store.is_dirty(client.id) {
        client.queue.clear();
        store.unwatch(client.id);
        drop(exec_guard);
        return Err(Reply::Nil);
    }

    // Clear the transaction state before re-dispatching so the queued
    // commands don't queue again.
    store.unwatch(client.id);
    client.reply(Reply::Array(count));
    client.in_exec = true;
    client.request.clear();

    for _ in 0..count {
        while let Some(argument) = client.queue.pop_front() {
            match argument {
                Argument::Push(argument) => client.request.push_back(argument),
                Argument::End => break,
            }
        }
        client.run(store);
        client.request.clear();
    }

    client.queue.clear();
    client.in_exec = false;
    drop(exec_guard);
    Ok(())
}

pub static DISCARD: Command = Command {
    kind: CommandKind::Discard,
    name: "discard",
    arity: Arity::Exact(1),
    run: discard,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn discard(client: &mut Client, store: &Store) -> CommandResult {
    if client.tx() == Tx::None {
        return Err(ReplyError::DiscardWithoutMulti.into());
    }
    client.discard(store);
    client.reply("OK");
    Ok(())
}

pub static WATCH: Command = Command {
    kind: CommandKind::Watch,
    name: "watch",
    arity: Arity::Minimum(2),
    run: watch,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn watch(client: &mut Client, store: &Store) -> CommandResult {
    if client.tx() != Tx::None {
        return Err(ReplyError::WatchInMulti.into());
    }
    while let Some(key) = client.request.try_pop() {
        store.watch(client.db, key, client.id);
    }
    client.reply("OK");
    Ok(())
}

pub static UNWATCH: Command = Command {
    kind: CommandKind::Unwatch,
    name: "unwatch",
    arity: Arity::Exact(1),
    run: unwatch,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn unwatch(client: &mut Client, store: &Store) -> CommandResult {
    store.unwatch(client.id);
    client.reply("OK");
    Ok(())
}
