use crate::{
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    reply::ReplyError,
    store::Store,
};

pub static SAVE: Command = Command {
    kind: CommandKind::Save,
    name: "save",
    arity: Arity::Exact(1),
    run: save,
    keys: Keys::None,
    readonly: false,
    admin: true,
    noscript: true,
    pubsub: false,
    write: false,
};

fn save(client: &mut Client, store: &Store) -> CommandResult {
    if store.snapshot.is_saving() {
        return Err(ReplyError::SaveInProgress.into());
    }
    match store.snapshot.save(&store.dbs) {
        Ok(()) => {
            store
                .stats
                .dirty
                .store(0, std::sync::atomic::Ordering::Relaxed);
            client.reply("OK");
            Ok(())
        }
        Err(error) => {
            tracing::error!(%error, "foreground save failed");
            Err(ReplyError::Custom(
                format!("ERR {error}").into_bytes().into(),
            )
            .into())
        }
    }
}

pub static BGSAVE: Command = Command {
    kind: CommandKind::Bgsave,
    name: "bgsave",
    arity: Arity::Minimum(1),
    run: bgsave,
    keys: Keys::None,
    readonly: false,
    admin: true,
    noscript: true,
    pubsub: false,
    write: false,
};

fn bgsave(client: &mut Client, store: &Store) -> CommandResult {
    match store
        .snapshot
        .background(&store.dbs, store.stats.dirty.clone())
    {
        Ok(()) => {
            client.reply("Background saving started");
            Ok(())
        }
        Err(()) => Err(ReplyError::SaveInProgress.into()),
    }
}

pub static LASTSAVE: Command = Command {
    kind: CommandKind::Lastsave,
    name: "lastsave",
    arity: Arity::Exact(1),
    run: lastsave,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn lastsave(client: &mut Client, store: &Store) -> CommandResult {
    let at = store.snapshot.last_save_secs();
    client.reply(i64::try_from(at).unwrap_or(i64::MAX));
    Ok(())
}

pub static BGREWRITEAOF: Command = Command {
    kind: CommandKind::Bgrewriteaof,
    name: "bgrewriteaof",
    arity: Arity::Exact(1),
    run: bgrewriteaof,
    keys: Keys::None,
    readonly: false,
    admin: true,
    noscript: true,
    pubsub: false,
    write: false,
};

fn bgrewriteaof(client: &mut Client, store: &Store) -> CommandResult {
    match store.aof.rewrite(&store.dbs) {
        Ok(()) => {
            client.reply("Background append only file rewriting started");
            Ok(())
        }
        Err(()) => Err(ReplyError::RewriteInProgress.into()),
    }
}
