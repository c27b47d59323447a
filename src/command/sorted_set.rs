use crate::{
    bytes::{lex, parse},
    client::Client,
    command::{scan_arguments, Arity, Command, CommandKind, CommandResult, Keys},
    db::SortedSet,
    glob,
    reply::{format_double, Reply, ReplyError},
    skiplist::End,
    store::Store,
};
use bytes::Bytes;
use logos::Logos;
use ordered_float::NotNan;

/// Clamp a `(start, stop)` rank pair with negative indexing onto
/// `0..len`, half-open. `None` means empty.
fn rank_range(len: usize, start: i64, stop: i64) -> Option<std::ops::Range<usize>> {
    let len_i = i64::try_from(len).ok()?;
    if len_i == 0 {
        return None;
    }
    let start = if start < 0 { (len_i + start).max(0) } else { start };
    let stop = if stop < 0 { len_i + stop } else { stop.min(len_i - 1) };
    if start > stop || start >= len_i || stop < 0 {
        return None;
    }
    Some(usize::try_from(start).ok()?..usize::try_from(stop).ok()? + 1)
}

fn with_scores(client: &mut Client) -> Result<bool, ReplyError> {
    match client.request.try_pop() {
        Some(raw) if raw.eq_ignore_ascii_case(b"withscores") => Ok(true),
        Some(_) => Err(ReplyError::Syntax),
        None => Ok(false),
    }
}

/// Send `(member, score)` pairs, scores included when asked for.
fn reply_pairs(client: &mut Client, pairs: Vec<(f64, Bytes)>, withscores: bool) {
    if withscores {
        client.reply(Reply::Array(pairs.len() * 2));
        for (score, member) in pairs {
            client.reply(Reply::Bulk(member));
            client.reply(Reply::Bulk(format_double(score).into()));
        }
    } else {
        client.reply(Reply::Array(pairs.len()));
        for (_, member) in pairs {
            client.reply(Reply::Bulk(member));
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum ZaddOption {
    #[regex(b"(?i:ch)")]
    Ch,

    #[regex(b"(?i:incr)")]
    Incr,

    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:xx)")]
    Xx,
}

pub static ZADD: Command = Command {
    kind: CommandKind::Zadd,
    name: "zadd",
    arity: Arity::Minimum(4),
    run: zadd,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zadd(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;

    let mut nx = false;
    let mut xx = false;
    let mut ch = false;
    let mut incr = false;

    // Options end at the first thing that isn't one.
    while let Some(peeked) = client.request.peek() {
        match lex(&peeked[..]) {
            Some(ZaddOption::Nx) => nx = true,
            Some(ZaddOption::Xx) => xx = true,
            Some(ZaddOption::Ch) => ch = true,
            Some(ZaddOption::Incr) => incr = true,
            None => break,
        }
        client.request.try_pop();
    }

    if nx && xx {
        return Err(ReplyError::XxAndNx.into());
    }
    client.request.assert_pairs()?;
    if client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }

    let mut pairs = Vec::new();
    while !client.request.is_empty() {
        let score = client.request.not_nan()?;
        let member = client.request.pop()?;
        pairs.push((score, member));
    }

    if incr && pairs.len() != 1 {
        return Err(ReplyError::Syntax.into());
    }

    let mut db = store.db(client.db)?.write();
    let set = db.sorted_set_or_default(&key)?;

    if incr {
        let (score, member) = pairs.into_iter().next().expect("exactly one pair");
        let exists = set.contains(&member);
        if (nx && exists) || (xx && !exists) {
            drop(db);
            client.reply(Reply::Nil);
            return Ok(());
        }
        let Some(next) = set.incr(&member, *score) else {
            return Err(ReplyError::NanOrInfinity.into());
        };
        db.touch(&key);
        drop(db);
        client.reply(Reply::Bulk(format_double(next).into()));
        return Ok(());
    }

    let mut added = 0;
    let mut changed = 0;
    for (score, member) in pairs {
        let exists = set.contains(&member);
        if (nx && exists) || (xx && !exists) {
            continue;
        }
        let previous = set.score(&member);
        if set.insert(score, member) {
            added += 1;
        } else if previous != Some(*score) {
            changed += 1;
        }
    }

    db.touch(&key);
    drop(db);
    client.reply(if ch { added + changed } else { added });
    Ok(())
}

pub static ZCARD: Command = Command {
    kind: CommandKind::Zcard,
    name: "zcard",
    arity: Arity::Exact(2),
    run: zcard,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zcard(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let len = db.get_sorted_set(&key)?.map_or(0, SortedSet::len);
    drop(db);
    client.reply(len);
    Ok(())
}

pub static ZCOUNT: Command = Command {
    kind: CommandKind::Zcount,
    name: "zcount",
    arity: Arity::Exact(4),
    run: zcount,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zcount(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let min = client.request.score_bound()?;
    let max = client.request.score_bound()?;

    let db = store.db(client.db)?.read();
    let count = db
        .get_sorted_set(&key)?
        .map_or(0, |set| set.count(&(min, max)));
    drop(db);
    client.reply(count);
    Ok(())
}

pub static ZINCRBY: Command = Command {
    kind: CommandKind::Zincrby,
    name: "zincrby",
    arity: Arity::Exact(4),
    run: zincrby,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zincrby(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let by = client.request.not_nan()?;
    let member = client.request.pop()?;

    let mut db = store.db(client.db)?.write();
    let set = db.sorted_set_or_default(&key)?;
    let Some(next) = set.incr(&member, *by) else {
        return Err(ReplyError::NanOrInfinity.into());
    };
    db.touch(&key);
    drop(db);
    client.reply(Reply::Bulk(format_double(next).into()));
    Ok(())
}

pub static ZMSCORE: Command = Command {
    kind: CommandKind::Zmscore,
    name: "zmscore",
    arity: Arity::Minimum(3),
    run: zmscore,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zmscore(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<_> = client.request.iter().collect();

    let db = store.db(client.db)?.read();
    let set = db.get_sorted_set(&key)?;
    let replies: Vec<Reply> = members
        .iter()
        .map(|member| {
            set.and_then(|set| set.score(member))
                .map_or(Reply::Nil, |score| {
                    Reply::Bulk(format_double(score).into())
                })
        })
        .collect();
    drop(db);
    client.array(replies.into_iter());
    Ok(())
}

pub static ZPOPMAX: Command = Command {
    kind: CommandKind::Zpopmax,
    name: "zpopmax",
    arity: Arity::Minimum(2),
    run: zpopmax,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zpopmax(client: &mut Client, store: &Store) -> CommandResult {
    zpop(client, store, End::Max)
}

pub static ZPOPMIN: Command = Command {
    kind: CommandKind::Zpopmin,
    name: "zpopmin",
    arity: Arity::Minimum(2),
    run: zpopmin,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zpopmin(client: &mut Client, store: &Store) -> CommandResult {
    zpop(client, store, End::Min)
}

fn zpop(client: &mut Client, store: &Store, end: End) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(raw) => Some(parse::<usize>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };

    let mut db = store.db(client.db)?.write();
    let mut popped = Vec::new();
    if let Some(set) = db.mut_sorted_set(&key)? {
        let wanted = count.unwrap_or(1);
        for _ in 0..wanted {
            match set.pop(end) {
                Some(pair) => popped.push(pair),
                None => break,
            }
        }
        if !popped.is_empty() {
            db.touch(&key);
        }
    }
    drop(db);

    client.reply(Reply::Array(popped.len() * 2));
    for (score, member) in popped {
        client.reply(Reply::Bulk(member));
        client.reply(Reply::Bulk(format_double(score).into()));
    }
    Ok(())
}

pub static ZRANDMEMBER: Command = Command {
    kind: CommandKind::Zrandmember,
    name: "zrandmember",
    arity: Arity::Minimum(2),
    run: zrandmember,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrandmember(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let count = match client.request.try_pop() {
        Some(raw) => Some(parse::<i64>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };
    let withscores = match client.request.try_pop() {
        Some(raw) if raw.eq_ignore_ascii_case(b"withscores") => true,
        Some(_) => return Err(ReplyError::Syntax.into()),
        None => false,
    };
    if withscores && count.is_none() {
        return Err(ReplyError::Syntax.into());
    }

    let db = store.db(client.db)?.read();
    let Some(set) = db.get_sorted_set(&key)? else {
        drop(db);
        match count {
            Some(_) => client.array(std::iter::empty::<Reply>()),
            None => client.reply(Reply::Nil),
        }
        return Ok(());
    };

    let Some(count) = count else {
        let member = set
            .random_members(1)
            .into_iter()
            .next()
            .map(|(member, _)| Reply::Bulk(member));
        drop(db);
        client.reply(member);
        return Ok(());
    };

    let sample: Vec<(Bytes, f64)> = if count >= 0 {
        set.random_members(usize::try_from(count).unwrap_or(0))
    } else {
        let wanted = usize::try_from(count.unsigned_abs()).unwrap_or(0);
        let mut out = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            if let Some(pick) = set.random_members(1).into_iter().next() {
                out.push(pick);
            }
        }
        out
    };
    drop(db);

    let mut items = Vec::new();
    for (member, score) in sample {
        items.push(Reply::Bulk(member));
        if withscores {
            items.push(Reply::Bulk(format_double(score).into()));
        }
    }
    client.array(items.into_iter());
    Ok(())
}

pub static ZRANGE: Command = Command {
    kind: CommandKind::Zrange,
    name: "zrange",
    arity: Arity::Minimum(4),
    run: zrange,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrange(client: &mut Client, store: &Store) -> CommandResult {
    range_by_rank(client, store, false)
}

pub static ZREVRANGE: Command = Command {
    kind: CommandKind::Zrevrange,
    name: "zrevrange",
    arity: Arity::Minimum(4),
    run: zrevrange,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrevrange(client: &mut Client, store: &Store) -> CommandResult {
    range_by_rank(client, store, true)
}

fn range_by_rank(client: &mut Client, store: &Store, reverse: bool) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;
    let withscores = with_scores(client)?;
    if !client.request.is_empty() {
        return Err(ReplyError::Syntax.into());
    }

    let db = store.db(client.db)?.read();
    let pairs: Vec<(f64, Bytes)> = match db.get_sorted_set(&key)? {
        Some(set) => match rank_range(set.len(), start, stop) {
            Some(range) => {
                let iter = if reverse {
                    set.rev_range_by_rank(range)
                } else {
                    set.range_by_rank(range)
                };
                iter.map(|(score, member)| (score, member.clone())).collect()
            }
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    drop(db);

    reply_pairs(client, pairs, withscores);
    Ok(())
}

pub static ZRANGEBYSCORE: Command = Command {
    kind: CommandKind::Zrangebyscore,
    name: "zrangebyscore",
    arity: Arity::Minimum(4),
    run: zrangebyscore,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrangebyscore(client: &mut Client, store: &Store) -> CommandResult {
    range_by_score(client, store, false)
}

pub static ZREVRANGEBYSCORE: Command = Command {
    kind: CommandKind::Zrevrangebyscore,
    name: "zrevrangebyscore",
    arity: Arity::Minimum(4),
    run: zrevrangebyscore,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrevrangebyscore(client: &mut Client, store: &Store) -> CommandResult {
    range_by_score(client, store, true)
}

fn range_by_score(client: &mut Client, store: &Store, reverse: bool) -> CommandResult {
    let key = client.request.pop()?;

    // The reverse form takes (max, min).
    let (min, max) = if reverse {
        let max = client.request.score_bound()?;
        let min = client.request.score_bound()?;
        (min, max)
    } else {
        let min = client.request.score_bound()?;
        let max = client.request.score_bound()?;
        (min, max)
    };

    let mut withscores = false;
    let mut limit: Option<(usize, i64)> = None;
    while let Some(option) = client.request.try_pop() {
        if option.eq_ignore_ascii_case(b"withscores") {
            withscores = true;
        } else if option.eq_ignore_ascii_case(b"limit") {
            let offset = client.request.usize()?;
            let count = client.request.i64()?;
            limit = Some((offset, count));
        } else {
            return Err(ReplyError::Syntax.into());
        }
    }

    let db = store.db(client.db)?.read();
    let mut pairs: Vec<(f64, Bytes)> = match db.get_sorted_set(&key)? {
        Some(set) => {
            let bounds = (min, max);
            let iter = if reverse {
                set.rev_range_by_score(&bounds)
            } else {
                set.range_by_score(&bounds)
            };
            iter.map(|(score, member)| (score, member.clone())).collect()
        }
        None => Vec::new(),
    };
    drop(db);

    if let Some((offset, count)) = limit {
        pairs = pairs.into_iter().skip(offset).collect();
        if count >= 0 {
            pairs.truncate(usize::try_from(count).unwrap_or(0));
        }
    }

    reply_pairs(client, pairs, withscores);
    Ok(())
}

pub static ZRANK: Command = Command {
    kind: CommandKind::Zrank,
    name: "zrank",
    arity: Arity::Exact(3),
    run: zrank,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrank(client: &mut Client, store: &Store) -> CommandResult {
    rank(client, store, false)
}

pub static ZREVRANK: Command = Command {
    kind: CommandKind::Zrevrank,
    name: "zrevrank",
    arity: Arity::Exact(3),
    run: zrevrank,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zrevrank(client: &mut Client, store: &Store) -> CommandResult {
    rank(client, store, true)
}

fn rank(client: &mut Client, store: &Store, reverse: bool) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;

    let db = store.db(client.db)?.read();
    let rank = db.get_sorted_set(&key)?.and_then(|set| {
        if reverse {
            set.rev_rank(&member)
        } else {
            set.rank(&member)
        }
    });
    drop(db);

    match rank {
        Some(rank) => client.reply(rank),
        None => client.reply(Reply::Nil),
    }
    Ok(())
}

pub static ZREM: Command = Command {
    kind: CommandKind::Zrem,
    name: "zrem",
    arity: Arity::Minimum(3),
    run: zrem,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zrem(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let mut db = store.db(client.db)?.write();
    let Some(set) = db.mut_sorted_set(&key)? else {
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

pub static ZREMRANGEBYRANK: Command = Command {
    kind: CommandKind::Zremrangebyrank,
    name: "zremrangebyrank",
    arity: Arity::Exact(4),
    run: zremrangebyrank,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zremrangebyrank(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let start = client.request.i64()?;
    let stop = client.request.i64()?;

    let mut db = store.db(client.db)?.write();
    let mut removed = 0;
    if let Some(set) = db.mut_sorted_set(&key)? {
        if let Some(range) = rank_range(set.len(), start, stop) {
            removed = set.remove_range_by_rank(range);
        }
        if removed > 0 {
            db.touch(&key);
        }
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static ZREMRANGEBYSCORE: Command = Command {
    kind: CommandKind::Zremrangebyscore,
    name: "zremrangebyscore",
    arity: Arity::Exact(4),
    run: zremrangebyscore,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zremrangebyscore(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let min = client.request.score_bound()?;
    let max = client.request.score_bound()?;

    let mut db = store.db(client.db)?.write();
    let mut removed = 0;
    if let Some(set) = db.mut_sorted_set(&key)? {
        removed = set.remove_range_by_score(&(min, max));
        if removed > 0 {
            db.touch(&key);
        }
    }
    drop(db);
    client.reply(removed);
    Ok(())
}

pub static ZSCAN: Command = Command {
    kind: CommandKind::Zscan,
    name: "zscan",
    arity: Arity::Minimum(3),
    run: zscan,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zscan(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let (cursor, count, pattern) = scan_arguments(client)?;

    let db = store.db(client.db)?.read();
    let mut items: Vec<Reply> = Vec::new();
    let mut next = 0;
    if let Some(set) = db.get_sorted_set(&key)? {
        let mut cursor = cursor;
        loop {
            cursor = set.scan(cursor, |member, score| {
                let matched = pattern
                    .as_deref()
                    .is_none_or(|pattern| glob::matches(member, pattern));
                if matched {
                    items.push(Reply::from(member));
                    items.push(Reply::Bulk(format_double(score).into()));
                }
            });
            if cursor == 0 || items.len() / 2 >= count {
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

pub static ZSCORE: Command = Command {
    kind: CommandKind::Zscore,
    name: "zscore",
    arity: Arity::Exact(3),
    run: zscore,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zscore(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;
    let db = store.db(client.db)?.read();
    let score = db.get_sorted_set(&key)?.and_then(|set| set.score(&member));
    drop(db);

    match score {
        Some(score) => client.reply(Reply::Bulk(format_double(score).into())),
        None => client.reply(Reply::Nil),
    }
    Ok(())
}

/// ZUNION/ZINTER/ZDIFF share a shape with their STORE forms, like the
/// plain-set algebra. Ties aggregate by summing scores.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ZAlgebra {
    Diff,
    Inter,
    Union,
}

fn zalgebra(
    client: &mut Client,
    store: &Store,
    op: ZAlgebra,
    destination: Option<Bytes>,
) -> CommandResult {
    let numkeys = client.request.numkeys()?;
    let mut keys = Vec::with_capacity(numkeys);
    for _ in 0..numkeys {
        keys.push(client.request.pop()?);
    }

    let withscores = if destination.is_none() {
        with_scores(client)?
    } else {
        if !client.request.is_empty() {
            return Err(ReplyError::Syntax.into());
        }
        false
    };

    let mut db = store.db(client.db)?.write();

    let mut result = SortedSet::default();
    {
        let mut sets = Vec::with_capacity(keys.len());
        for key in &keys {
            sets.push(db.get_sorted_set(key)?);
        }

        match op {
            ZAlgebra::Union => {
                for set in sets.iter().copied().flatten() {
                    for (score, member) in set.iter() {
                        if result.incr(member, score).is_none() {
                            result.remove(member);
                        }
                    }
                }
            }
            ZAlgebra::Inter => {
                if let Some(Some(first)) = sets.first() {
                    for (score, member) in first.iter() {
                        let mut total = score;
                        let everywhere = sets[1..].iter().all(|other| match other {
                            Some(other) => match other.score(member) {
                                Some(score) => {
                                    total += score;
                                    true
                                }
                                None => false,
                            },
                            None => false,
                        });
                        if everywhere {
                            if let Ok(total) = NotNan::new(total) {
                                result.insert(total, member.clone());
                            }
                        }
                    }
                }
            }
            ZAlgebra::Diff => {
                if let Some(Some(first)) = sets.first() {
                    for (score, member) in first.iter() {
                        let elsewhere = sets[1..]
                            .iter()
                            .any(|other| other.is_some_and(|other| other.contains(member)));
                        if !elsewhere {
                            if let Ok(score) = NotNan::new(score) {
                                result.insert(score, member.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    match destination {
        Some(destination) => {
            let len = result.len();
            if result.is_empty() {
                db.remove(&destination);
            } else {
                db.set(&destination, result.into());
            }
            drop(db);
            client.reply(len);
        }
        None => {
            drop(db);
            let pairs: Vec<(f64, Bytes)> = result
                .iter()
                .map(|(score, member)| (score, member.clone()))
                .collect();
            reply_pairs(client, pairs, withscores);
        }
    }
    Ok(())
}

pub static ZDIFF: Command = Command {
    kind: CommandKind::Zdiff,
    name: "zdiff",
    arity: Arity::Minimum(3),
    run: zdiff,
    keys: Keys::Argument(1),
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zdiff(client: &mut Client, store: &Store) -> CommandResult {
    zalgebra(client, store, ZAlgebra::Diff, None)
}

pub static ZDIFFSTORE: Command = Command {
    kind: CommandKind::Zdiffstore,
    name: "zdiffstore",
    arity: Arity::Minimum(4),
    run: zdiffstore,
    keys: Keys::Argument(2),
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zdiffstore(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    zalgebra(client, store, ZAlgebra::Diff, Some(destination))
}

pub static ZINTER: Command = Command {
    kind: CommandKind::Zinter,
    name: "zinter",
    arity: Arity::Minimum(3),
    run: zinter,
    keys: Keys::Argument(1),
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zinter(client: &mut Client, store: &Store) -> CommandResult {
    zalgebra(client, store, ZAlgebra::Inter, None)
}

pub static ZINTERSTORE: Command = Command {
    kind: CommandKind::Zinterstore,
    name: "zinterstore",
    arity: Arity::Minimum(4),
    run: zinterstore,
    keys: Keys::Argument(2),
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zinterstore(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    zalgebra(client, store, ZAlgebra::Inter, Some(destination))
}

pub static ZUNION: Command = Command {
    kind: CommandKind::Zunion,
    name: "zunion",
    arity: Arity::Minimum(3),
    run: zunion,
    keys: Keys::Argument(1),
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn zunion(client: &mut Client, store: &Store) -> CommandResult {
    zalgebra(client, store, ZAlgebra::Union, None)
}

pub static ZUNIONSTORE: Command = Command {
    kind: CommandKind::Zunionstore,
    name: "zunionstore",
    arity: Arity::Minimum(4),
    run: zunionstore,
    keys: Keys::Argument(2),
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn zunionstore(client: &mut Client, store: &Store) -> CommandResult {
    let destination = client.request.pop()?;
    zalgebra(client, store, ZAlgebra::Union, Some(destination))
}
