use crate::{
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    reply::{Reply, ReplyError},
    script,
    store::Store,
};
use bytes::Bytes;

pub static EVAL: Command = Command {
    kind: CommandKind::Eval,
    name: "eval",
    arity: Arity::Minimum(3),
    run: eval,
    keys: Keys::Argument(2),
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn eval(client: &mut Client, store: &Store) -> CommandResult {
    let source = client.request.pop()?;

    // EVAL registers the script like SCRIPT LOAD does.
    let sha = script::sha1_hex(&source);
    store.scripts.lock().insert(sha, source.clone());

    run_script(client, store, source)
}

pub static EVALSHA: Command = Command {
    kind: CommandKind::Evalsha,
    name: "evalsha",
    arity: Arity::Minimum(3),
    run: evalsha,
    keys: Keys::Argument(2),
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn evalsha(client: &mut Client, store: &Store) -> CommandResult {
    let sha = client.request.pop()?;
    let sha = String::from_utf8_lossy(&sha).to_ascii_lowercase();

    let source = store
        .scripts
        .lock()
        .get(&sha)
        .cloned()
        .ok_or(ReplyError::Noscript)?;

    run_script(client, store, source)
}

fn run_script(client: &mut Client, store: &Store, source: Bytes) -> CommandResult {
    let numkeys = client.request.numkeys()?;
    let mut keys = Vec::with_capacity(numkeys);
    for _ in 0..numkeys {
        keys.push(client.request.pop()?);
    }
    let argv: Vec<Bytes> = client.request.iter().collect();

    script::run(client, store, &source, keys, argv);
    Ok(())
}

pub static SCRIPT: Command = Command {
    kind: CommandKind::Script,
    name: "script",
    arity: Arity::Minimum(2),
    run: script_command,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: false,
    write: false,
};

fn script_command(client: &mut Client, store: &Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"load") {
        let source = client.request.pop()?;
        if !client.request.is_empty() {
            return Err(client.request.wrong_arguments().into());
        }
        let sha = script::sha1_hex(&source);
        store.scripts.lock().insert(sha.clone(), source);
        client.reply(Reply::Bulk(Bytes::from(sha)));
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"exists") {
        let shas: Vec<Bytes> = client.request.iter().collect();
        let scripts = store.scripts.lock();
        let replies: Vec<Reply> = shas
            .iter()
            .map(|sha| {
                let sha = String::from_utf8_lossy(sha).to_ascii_lowercase();
                Reply::from(scripts.contains_key(&sha))
            })
            .collect();
        drop(scripts);
        client.array(replies.into_iter());
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"flush") {
        store.scripts.lock().clear();
        client.reply("OK");
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"kill") {
        // Scripts run to completion on their own connection; there is
        // never one to kill from here.
        return Err(ReplyError::NotBusy.into());
    }

    if subcommand.eq_ignore_ascii_case(b"show") {
        let sha = client.request.pop()?;
        let sha = String::from_utf8_lossy(&sha).to_ascii_lowercase();
        let source = store
            .scripts
            .lock()
            .get(&sha)
            .cloned()
            .ok_or(ReplyError::Noscript)?;
        client.reply(Reply::Bulk(source));
        return Ok(());
    }

    Err(client.request.unknown_subcommand().into())
}
