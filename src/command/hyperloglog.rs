use crate::{
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    db::Str,
    hyperloglog,
    reply::ReplyError,
    store::Store,
};

/// Fetch a key's sketch bytes, validating the magic. `Ok(None)` when the
/// key is absent.
fn sketch_of(
    db: &crate::db::DbInner,
    key: &[u8],
) -> Result<Option<Vec<u8>>, ReplyError> {
    match db.get_str(key)? {
        Some(value) => {
            let bytes = value.to_bytes().to_vec();
            if !hyperloglog::is_valid(&bytes) {
                return Err(ReplyError::InvalidHll);
            }
            Ok(Some(bytes))
        }
        None => Ok(None),
    }
}

pub static PFADD: Command = Command {
    kind: CommandKind::Pfadd,
    name: "pfadd",
    arity: Arity::Minimum(2),
    run: pfadd,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn pfadd(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let elements: Vec<_> = client.request.iter().collect();

    let mut db = store.db(client.db)?.write();
    let existing = sketch_of(&db, &key)?;
    let created = existing.is_none();
    let mut sketch = existing.unwrap_or_else(hyperloglog::create);

    let mut changed = false;
    for element in &elements {
        changed |= hyperloglog::add(&mut sketch, element);
    }

    if created || changed {
        db.set(&key, Str::Raw(sketch).into());
    }
    drop(db);
    client.reply(created || changed);
    Ok(())
}

pub static PFCOUNT: Command = Command {
    kind: CommandKind::Pfcount,
    name: "pfcount",
    arity: Arity::Minimum(2),
    run: pfcount,
    keys: Keys::All,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn pfcount(client: &mut Client, store: &Store) -> CommandResult {
    let keys: Vec<_> = client.request.iter().collect();
    let db = store.db(client.db)?.read();

    let count = if keys.len() == 1 {
        match sketch_of(&db, &keys[0])? {
            Some(sketch) => hyperloglog::count(&sketch),
            None => 0,
        }
    } else {
        // Multiple keys: count the union without touching the stored
        // sketches.
        let mut merged = hyperloglog::create();
        for key in &keys {
            if let Some(sketch) = sketch_of(&db, key)? {
                hyperloglog::merge(&mut merged, &sketch);
            }
        }
        hyperloglog::count(&merged)
    };
    drop(db);

    client.reply(i64::try_from(count).unwrap_or(i64::MAX));
    Ok(())
}

pub static PFMERGE: Command = Command {
    kind: CommandKind::Pfmerge,
    name: "pfmerge",
    arity: Arity::Minimum(2),
    run: pfmerge,
    keys: Keys::All,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn pfmerge(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    let sources: Vec<_> = client.request.iter().collect();

    let mut db = store.db(client.db)?.write();
    let mut merged = match sketch_of(&db, &destination)? {
        Some(sketch) => sketch,
        None => hyperloglog::create(),
    };

    for source in &sources {
        if let Some(sketch) = sketch_of(&db, source)? {
            hyperloglog::merge(&mut merged, &sketch);
        }
    }

    db.set(&destination, Str::Raw(merged).into());
    drop(db);
    client.reply("OK");
    Ok(())
}
