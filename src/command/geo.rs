use crate::{
    bytes::lex,
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    db::SortedSet,
    geo,
    reply::{Reply, ReplyError},
    store::Store,
};
use bytes::Bytes;
use logos::Logos;
use ordered_float::NotNan;

/// A 52-bit cell id is stored as the member's sorted-set score.
#[allow(clippy::cast_precision_loss)]
fn bits_to_score(bits: u64) -> f64 {
    bits as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn score_to_bits(score: f64) -> u64 {
    score as u64
}

fn unit_scale(unit: &[u8]) -> Result<f64, ReplyError> {
    if unit.eq_ignore_ascii_case(b"m") {
        Ok(1.0)
    } else if unit.eq_ignore_ascii_case(b"km") {
        Ok(1000.0)
    } else if unit.eq_ignore_ascii_case(b"mi") {
        Ok(1609.34)
    } else if unit.eq_ignore_ascii_case(b"ft") {
        Ok(0.3048)
    } else {
        Err(ReplyError::Unit)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum GeoaddOption {
    #[regex(b"(?i:ch)")]
    Ch,

    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:xx)")]
    Xx,
}

pub static GEOADD: Command = Command {
    kind: CommandKind::Geoadd,
    name: "geoadd",
    arity: Arity::Minimum(5),
    run: geoadd,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn geoadd(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;

    let mut nx = false;
    let mut xx = false;
    let mut ch = false;
    while let Some(peeked) = client.request.peek() {
        match lex(&peeked[..]) {
            Some(GeoaddOption::Nx) => nx = true,
            Some(GeoaddOption::Xx) => xx = true,
            Some(GeoaddOption::Ch) => ch = true,
            None => break,
        }
        client.request.try_pop();
    }
    if nx && xx {
        return Err(ReplyError::XxAndNx.into());
    }

    if client.request.remaining() % 3 != 0 || client.request.is_empty() {
        return Err(client.request.wrong_arguments().into());
    }

    let mut triples = Vec::new();
    while !client.request.is_empty() {
        let longitude = client.request.f64()?;
        let latitude = client.request.f64()?;
        let member = client.request.pop()?;
        let bits = geo::encode(longitude, latitude)
            .ok_or(ReplyError::GeoPair(longitude, latitude))?;
        triples.push((bits, member));
    }

    let mut db = store.db(client.db)?.write();
    let set = db.sorted_set_or_default(&key)?;

    let mut added = 0;
    let mut changed = 0;
    for (bits, member) in triples {
        let exists = set.contains(&member);
        if (nx && exists) || (xx && !exists) {
            continue;
        }
        let score = bits_to_score(bits);
        let previous = set.score(&member);
        let inserted = set.insert(
            NotNan::new(score).expect("cell ids are finite"),
            member,
        );
        if inserted {
            added += 1;
        } else if previous != Some(score) {
            // An unchanged position counts neither as added nor changed.
            changed += 1;
        }
    }

    db.touch(&key);
    drop(db);
    client.reply(if ch { added + changed } else { added });
    Ok(())
}

pub static GEOPOS: Command = Command {
    kind: CommandKind::Geopos,
    name: "geopos",
    arity: Arity::Minimum(2),
    run: geopos,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn geopos(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<_> = client.request.iter().collect();

    let db = store.db(client.db)?.read();
    let set = db.get_sorted_set(&key)?;
    let positions: Vec<Option<(f64, f64)>> = members
        .iter()
        .map(|member| {
            set.and_then(|set| set.score(member))
                .map(|score| geo::decode(score_to_bits(score)))
        })
        .collect();
    drop(db);

    client.reply(Reply::Array(positions.len()));
    for position in positions {
        match position {
            Some((longitude, latitude)) => {
                client.reply(Reply::Array(2));
                client.reply(Reply::Bulk(format!("{longitude:.17}").into()));
                client.reply(Reply::Bulk(format!("{latitude:.17}").into()));
            }
            None => client.reply(Reply::Nil),
        }
    }
    Ok(())
}

pub static GEODIST: Command = Command {
    kind: CommandKind::Geodist,
    name: "geodist",
    arity: Arity::Minimum(4),
    run: geodist,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn geodist(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let first = client.request.pop()?;
    let second = client.request.pop()?;
    let scale = match client.request.try_pop() {
        Some(unit) => unit_scale(&unit)?,
        None => 1.0,
    };

    let db = store.db(client.db)?.read();
    let set = db.get_sorted_set(&key)?;
    let pair = set.and_then(|set| {
        let a = set.score(&first)?;
        let b = set.score(&second)?;
        Some((a, b))
    });
    drop(db);

    match pair {
        Some((a, b)) => {
            let (lon1, lat1) = geo::decode(score_to_bits(a));
            let (lon2, lat2) = geo::decode(score_to_bits(b));
            let meters = geo::distance(lon1, lat1, lon2, lat2);
            client.reply(Reply::Bulk(format!("{:.4}", meters / scale).into()));
        }
        None => client.reply(Reply::Nil),
    }
    Ok(())
}

pub static GEOHASH: Command = Command {
    kind: CommandKind::Geohash,
    name: "geohash",
    arity: Arity::Minimum(2),
    run: geohash,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn geohash(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let members: Vec<_> = client.request.iter().collect();

    let db = store.db(client.db)?.read();
    let set = db.get_sorted_set(&key)?;
    let hashes: Vec<Option<String>> = members
        .iter()
        .map(|member| {
            set.and_then(|set| set.score(member)).map(|score| {
                let (longitude, latitude) = geo::decode(score_to_bits(score));
                geo::geohash(longitude, latitude)
            })
        })
        .collect();
    drop(db);

    client.reply(Reply::Array(hashes.len()));
    for hash in hashes {
        match hash {
            Some(hash) => client.reply(Reply::Bulk(hash.into())),
            None => client.reply(Reply::Nil),
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct RadiusOptions {
    withcoord: bool,
    withdist: bool,
    withhash: bool,
    count: Option<usize>,
    descending: bool,
    store: Option<Bytes>,
    storedist: Option<Bytes>,
}

fn radius_options(client: &mut Client) -> Result<RadiusOptions, ReplyError> {
    let mut options = RadiusOptions::default();

    while let Some(option) = client.request.try_pop() {
        if option.eq_ignore_ascii_case(b"withcoord") {
            options.withcoord = true;
        } else if option.eq_ignore_ascii_case(b"withdist") {
            options.withdist = true;
        } else if option.eq_ignore_ascii_case(b"withhash") {
            options.withhash = true;
        } else if option.eq_ignore_ascii_case(b"count") {
            let count = client.request.usize()?;
            if count == 0 {
                return Err(ReplyError::Syntax);
            }
            options.count = Some(count);
        } else if option.eq_ignore_ascii_case(b"asc") {
            options.descending = false;
        } else if option.eq_ignore_ascii_case(b"desc") {
            options.descending = true;
        } else if option.eq_ignore_ascii_case(b"store") {
            options.store = Some(client.request.pop()?);
        } else if option.eq_ignore_ascii_case(b"storedist") {
            options.storedist = Some(client.request.pop()?);
        } else {
            return Err(ReplyError::Syntax);
        }
    }

    let storing = options.store.is_some() || options.storedist.is_some();
    if storing && (options.withcoord || options.withdist || options.withhash) {
        return Err(ReplyError::Syntax);
    }

    Ok(options)
}

pub static GEORADIUS: Command = Command {
    kind: CommandKind::Georadius,
    name: "georadius",
    arity: Arity::Minimum(6),
    run: georadius,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn georadius(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let longitude = client.request.f64()?;
    let latitude = client.request.f64()?;
    if geo::encode(longitude, latitude).is_none() {
        return Err(ReplyError::GeoPair(longitude, latitude).into());
    }
    radius_search(client, store, key, longitude, latitude)
}

pub static GEORADIUSBYMEMBER: Command = Command {
    kind: CommandKind::Georadiusbymember,
    name: "georadiusbymember",
    arity: Arity::Minimum(5),
    run: georadiusbymember,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn georadiusbymember(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let member = client.request.pop()?;

    let db = store.db(client.db)?.read();
    let score = db
        .get_sorted_set(&key)?
        .and_then(|set| set.score(&member))
        .ok_or(ReplyError::NoSuchKey)?;
    drop(db);

    let (longitude, latitude) = geo::decode(score_to_bits(score));
    radius_search(client, store, key, longitude, latitude)
}

fn radius_search(
    client: &mut Client,
    store: &Store,
    key: Bytes,
    longitude: f64,
    latitude: f64,
) -> CommandResult {
    let radius = client.request.f64()?;
    let scale = unit_scale(&client.request.pop()?)?;
    let radius_m = radius * scale;
    let options = radius_options(client)?;

    let mut db = store.db(client.db)?.write();

    // Brute force: decode every member and filter by distance.
    let mut hits: Vec<(Bytes, f64, u64)> = Vec::new();
    if let Some(set) = db.get_sorted_set(&key)? {
        for (score, member) in set.iter() {
            let bits = score_to_bits(score);
            let (lon, lat) = geo::decode(bits);
            let meters = geo::distance(longitude, latitude, lon, lat);
            if meters <= radius_m {
                hits.push((member.clone(), meters, bits));
            }
        }
    }

    hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    if options.descending {
        hits.reverse();
    }
    if let Some(count) = options.count {
        hits.truncate(count);
    }

    if let Some(destination) = options.store.clone().or_else(|| options.storedist.clone()) {
        let by_distance = options.storedist.is_some();
        let mut result = SortedSet::default();
        for (member, meters, bits) in &hits {
            let score = if by_distance {
                *meters / scale
            } else {
                bits_to_score(*bits)
            };
            if let Ok(score) = NotNan::new(score) {
                result.insert(score, member.clone());
            }
        }
        let len = result.len();
        if result.is_empty() {
            db.remove(&destination);
        } else {
            db.set(&destination, result.into());
        }
        drop(db);
        client.reply(len);
        return Ok(());
    }
    drop(db);

    let plain = !options.withcoord && !options.withdist && !options.withhash;
    client.reply(Reply::Array(hits.len()));
    for (member, meters, bits) in hits {
        if plain {
            client.reply(Reply::Bulk(member));
            continue;
        }

        let mut parts = 1;
        parts += usize::from(options.withdist);
        parts += usize::from(options.withhash);
        parts += usize::from(options.withcoord);
        client.reply(Reply::Array(parts));
        client.reply(Reply::Bulk(member));
        if options.withdist {
            client.reply(Reply::Bulk(format!("{:.4}", meters / scale).into()));
        }
        if options.withhash {
            client.reply(i64::try_from(bits).unwrap_or(i64::MAX));
        }
        if options.withcoord {
            let (lon, lat) = geo::decode(bits);
            client.reply(Reply::Array(2));
            client.reply(Reply::Bulk(format!("{lon:.17}").into()));
            client.reply(Reply::Bulk(format!("{lat:.17}").into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_roundtrip_cell_ids() {
        let bits = geo::encode(13.361_389, 38.115_556).unwrap();
        assert_eq!(score_to_bits(bits_to_score(bits)), bits);
    }

    #[test]
    fn units() {
        assert_eq!(unit_scale(b"m").unwrap(), 1.0);
        assert_eq!(unit_scale(b"KM").unwrap(), 1000.0);
        assert!(unit_scale(b"furlongs").is_err());
    }
}
