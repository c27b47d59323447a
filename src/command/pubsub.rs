use crate::{
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    pubsub::Subscriber,
    reply::Reply,
    store::Store,
};
use bytes::Bytes;

pub static PUBLISH: Command = Command {
    kind: CommandKind::Publish,
    name: "publish",
    arity: Arity::Exact(3),
    run: publish,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: true,
    write: false,
};

fn publish(client: &mut Client, store: &Store) -> CommandResult {
    let channel = client.request.pop()?;
    let message = client.request.pop()?;
    let delivered = store.pubsub.lock().publish(&channel, &message);
    client.reply(delivered);
    Ok(())
}

pub static SUBSCRIBE: Command = Command {
    kind: CommandKind::Subscribe,
    name: "subscribe",
    arity: Arity::Minimum(2),
    run: subscribe,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: true,
    write: false,
};

fn subscribe(client: &mut Client, store: &Store) -> CommandResult {
    while let Some(channel) = client.request.try_pop() {
        {
            let subscriber = Subscriber::new(client.id, client.reply_sender.clone());
            store.pubsub.lock().subscribe(channel.clone(), subscriber);
        }
        client.channels.insert(channel.clone());

        client.reply(Reply::Array(3));
        client.reply(Reply::Bulk(Bytes::from_static(b"subscribe")));
        client.reply(Reply::Bulk(channel));
        client.reply(client.subscription_count());
    }
    Ok(())
}

pub static PSUBSCRIBE: Command = Command {
    kind: CommandKind::Psubscribe,
    name: "psubscribe",
    arity: Arity::Minimum(2),
    run: psubscribe,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: true,
    write: false,
};

fn psubscribe(client: &mut Client, store: &Store) -> CommandResult {
    while let Some(pattern) = client.request.try_pop() {
        {
            let subscriber = Subscriber::new(client.id, client.reply_sender.clone());
            store.pubsub.lock().psubscribe(pattern.clone(), subscriber);
        }
        client.patterns.insert(pattern.clone());

        client.reply(Reply::Array(3));
        client.reply(Reply::Bulk(Bytes::from_static(b"psubscribe")));
        client.reply(Reply::Bulk(pattern));
        client.reply(client.subscription_count());
    }
    Ok(())
}

pub static UNSUBSCRIBE: Command = Command {
    kind: CommandKind::Unsubscribe,
    name: "unsubscribe",
    arity: Arity::Minimum(1),
    run: unsubscribe,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: true,
    write: false,
};

fn unsubscribe(client: &mut Client, store: &Store) -> CommandResult {
    let mut channels: Vec<Bytes> = client.request.iter().collect();
    if channels.is_empty() {
        channels = client.channels.iter().cloned().collect();
    }

    if channels.is_empty() {
        // Nothing was subscribed: one confirmation with a nil channel.
        client.reply(Reply::Array(3));
        client.reply(Reply::Bulk(Bytes::from_static(b"unsubscribe")));
        client.reply(Reply::Nil);
        client.reply(client.subscription_count());
        return Ok(());
    }

    for channel in channels {
        store.pubsub.lock().unsubscribe(&channel, client.id);
        client.channels.remove(&channel);

        client.reply(Reply::Array(3));
        client.reply(Reply::Bulk(Bytes::from_static(b"unsubscribe")));
        client.reply(Reply::Bulk(channel));
        client.reply(client.subscription_count());
    }
    Ok(())
}

pub static PUNSUBSCRIBE: Command = Command {
    kind: CommandKind::Punsubscribe,
    name: "punsubscribe",
    arity: Arity::Minimum(1),
    run: punsubscribe,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: true,
    pubsub: true,
    write: false,
};

fn punsubscribe(client: &mut Client, store: &Store) -> CommandResult {
    let mut patterns: Vec<Bytes> = client.request.iter().collect();
    if patterns.is_empty() {
        patterns = client.patterns.iter().cloned().collect();
    }

    if patterns.is_empty() {
        client.reply(Reply::Array(3));
        client.reply(Reply::Bulk(Bytes::from_static(b"punsubscribe")));
        client.reply(Reply::Nil);
        client.reply(client.subscription_count());
        return Ok(());
    }

    for pattern in patterns {
        store.pubsub.lock().punsubscribe(&pattern, client.id);
        client.patterns.remove(&pattern);

        client.reply(Reply::Array(3));
        client.reply(Reply::Bulk(Bytes::from_static(b"punsubscribe")));
        client.reply(Reply::Bulk(pattern));
        client.reply(client.subscription_count());
    }
    Ok(())
}

pub static PUBSUB: Command = Command {
    kind: CommandKind::Pubsub,
    name: "pubsub",
    arity: Arity::Minimum(2),
    run: pubsub,
    keys: Keys::None,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: true,
    write: false,
};

fn pubsub(client: &mut Client, store: &Store) -> CommandResult {
    let subcommand = client.request.pop()?;

    if subcommand.eq_ignore_ascii_case(b"channels") {
        let pattern = client.request.try_pop();
        let channels = store.pubsub.lock().channels(pattern.as_deref());
        client.array(channels.into_iter().map(Reply::from));
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"numsub") {
        let channels: Vec<Bytes> = client.request.iter().collect();
        let pubsub = store.pubsub.lock();
        let counts: Vec<(Bytes, usize)> = channels
            .into_iter()
            .map(|channel| {
                let count = pubsub.numsub(&channel);
                (channel, count)
            })
            .collect();
        drop(pubsub);

        client.reply(Reply::Array(counts.len() * 2));
        for (channel, count) in counts {
            client.reply(Reply::Bulk(channel));
            client.reply(count);
        }
        return Ok(());
    }

    if subcommand.eq_ignore_ascii_case(b"numpat") {
        let numpat = store.pubsub.lock().numpat();
        client.reply(numpat);
        return Ok(());
    }

    Err(client.request.unknown_subcommand().into())
}
