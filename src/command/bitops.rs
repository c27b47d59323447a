use crate::{
    bytes::parse,
    client::Client,
    command::{Arity, Command, CommandKind, CommandResult, Keys},
    db::Str,
    reply::{Reply, ReplyError},
    store::Store,
};
use bytes::Bytes;

/// Read one bit, MSB-first within each byte.
fn get_bit(bytes: &[u8], offset: usize) -> bool {
    bytes
        .get(offset / 8)
        .is_some_and(|byte| (byte >> (7 - offset % 8)) & 1 == 1)
}

/// Write one bit, zero-extending the buffer as needed. Returns the old
/// value.
fn set_bit(bytes: &mut Vec<u8>, offset: usize, value: bool) -> bool {
    let index = offset / 8;
    if bytes.len() <= index {
        bytes.resize(index + 1, 0);
    }
    let mask = 1u8 << (7 - offset % 8);
    let old = bytes[index] & mask != 0;
    if value {
        bytes[index] |= mask;
    } else {
        bytes[index] &= !mask;
    }
    old
}

pub static SETBIT: Command = Command {
    kind: CommandKind::Setbit,
    name: "setbit",
    arity: Arity::Exact(4),
    run: setbit,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn setbit(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let offset = client.request.bit_offset()?;
    let value = client.request.bit()?;

    let mut db = store.db(client.db)?.write();
    let string = db.str_or_default(&key)?;
    let old = set_bit(string.make_raw(), offset, value);
    db.touch(&key);
    drop(db);
    client.reply(old);
    Ok(())
}

pub static GETBIT: Command = Command {
    kind: CommandKind::Getbit,
    name: "getbit",
    arity: Arity::Exact(3),
    run: getbit,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn getbit(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let offset = client.request.bit_offset()?;

    let db = store.db(client.db)?.read();
    let bit = match db.get_str(&key)? {
        Some(value) => get_bit(&value.to_bytes(), offset),
        None => false,
    };
    drop(db);
    client.reply(bit);
    Ok(())
}

/// Resolve a `[start end]` pair of possibly-negative indices against
/// `len` units. `None` means an empty range.
fn clamp_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start > end || start >= len || end < 0 {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?))
}

pub static BITCOUNT: Command = Command {
    kind: CommandKind::Bitcount,
    name: "bitcount",
    arity: Arity::Minimum(2),
    run: bitcount,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn bitcount(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;

    let range = if client.request.is_empty() {
        None
    } else {
        let start = client.request.i64()?;
        let end = client.request.i64()?;
        let by_bit = match client.request.try_pop() {
            Some(unit) if unit.eq_ignore_ascii_case(b"byte") => false,
            Some(unit) if unit.eq_ignore_ascii_case(b"bit") => true,
            Some(_) => return Err(ReplyError::Syntax.into()),
            None => false,
        };
        Some((start, end, by_bit))
    };

    let db = store.db(client.db)?.read();
    let bytes = match db.get_str(&key)? {
        Some(value) => value.to_bytes(),
        None => Bytes::new(),
    };
    drop(db);

    let count = match range {
        None => bytes.iter().map(|byte| byte.count_ones()).sum::<u32>() as usize,
        Some((start, end, false)) => match clamp_range(bytes.len(), start, end) {
            Some((start, end)) => bytes[start..=end]
                .iter()
                .map(|byte| byte.count_ones())
                .sum::<u32>() as usize,
            None => 0,
        },
        Some((start, end, true)) => match clamp_range(bytes.len() * 8, start, end) {
            Some((start, end)) => (start..=end)
                .filter(|&offset| get_bit(&bytes, offset))
                .count(),
            None => 0,
        },
    };

    client.reply(count);
    Ok(())
}

pub static BITPOS: Command = Command {
    kind: CommandKind::Bitpos,
    name: "bitpos",
    arity: Arity::Minimum(3),
    run: bitpos,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn bitpos(client: &mut Client, store: &Store) -> CommandResult {
    let key = client.request.pop()?;
    let target = client.request.bit()?;
    let start = match client.request.try_pop() {
        Some(raw) => Some(parse::<i64>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };
    let end = match client.request.try_pop() {
        Some(raw) => Some(parse::<i64>(&raw).ok_or(ReplyError::Integer)?),
        None => None,
    };

    let db = store.db(client.db)?.read();
    let bytes = match db.get_str(&key)? {
        Some(value) => value.to_bytes(),
        None => Bytes::new(),
    };
    drop(db);

    let bounded_end = end.is_some();
    let range = clamp_range(
        bytes.len(),
        start.unwrap_or(0),
        end.unwrap_or(-1),
    );

    let position = match range {
        Some((first, last)) => (first * 8..(last + 1) * 8)
            .find(|&offset| get_bit(&bytes, offset) == target),
        None => None,
    };

    let reply = match position {
        Some(position) => i64::try_from(position).unwrap_or(-1),
        // Looking for a zero past the end of the value finds one, unless
        // the caller bounded the search.
        None if !target && !bounded_end => i64::try_from(bytes.len() * 8).unwrap_or(-1),
        None => -1,
    };

    client.reply(reply);
    Ok(())
}

pub static BITOP: Command = Command {
    kind: CommandKind::Bitop,
    name: "bitop",
    arity: Arity::Minimum(4),
    run: bitop,
    keys: Keys::SkipOne,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn bitop(client: &mut Client, store: &Store) -> CommandResult {
    let op = client.request.pop()?;
    let destination = client.request.pop()?;
    let keys: Vec<_> = client.request.iter().collect();

    let not = op.eq_ignore_ascii_case(b"not");
    let name = if op.eq_ignore_ascii_case(b"and") {
        "AND"
    } else if op.eq_ignore_ascii_case(b"or") {
        "OR"
    } else if op.eq_ignore_ascii_case(b"xor") {
        "XOR"
    } else if not {
        "NOT"
    } else {
        return Err(ReplyError::Syntax.into());
    };

    if not && keys.len() != 1 {
        return Err(ReplyError::BitopNot.into());
    }
    if !not && keys.len() < 2 {
        return Err(ReplyError::BitopSources(name).into());
    }

    let mut db = store.db(client.db)?.write();
    let mut sources = Vec::with_capacity(keys.len());
    for key in &keys {
        sources.push(db.get_str(key)?.map(Str::to_bytes));
    }

    let len = sources
        .iter()
        .map(|source| source.as_ref().map_or(0, Bytes::len))
        .max()
        .unwrap_or(0);

    let mut result = vec![0u8; len];
    if not {
        let source = sources[0].as_deref().unwrap_or(&[]);
        for (index, slot) in result.iter_mut().enumerate() {
            *slot = !source.get(index).copied().unwrap_or(0);
        }
    } else {
        for (which, source) in sources.iter().enumerate() {
            let source = source.as_deref().unwrap_or(&[]);
            for (index, slot) in result.iter_mut().enumerate() {
                let byte = source.get(index).copied().unwrap_or(0);
                match name {
                    "AND" => {
                        if which == 0 {
                            *slot = byte;
                        } else {
                            *slot &= byte;
                        }
                    }
                    "OR" => *slot |= byte,
                    _ => *slot ^= byte,
                }
            }
        }
    }

    let len = result.len();
    if result.is_empty() {
        db.remove(&destination);
    } else {
        db.set(&destination, Str::Raw(result).into());
    }
    drop(db);
    client.reply(len);
    Ok(())
}

// BITFIELD machinery.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct FieldType {
    signed: bool,
    width: u32,
}

fn parse_type(raw: &[u8]) -> Option<FieldType> {
    let (signed, digits) = match raw {
        [b'i' | b'I', rest @ ..] => (true, rest),
        [b'u' | b'U', rest @ ..] => (false, rest),
        _ => return None,
    };
    let width: u32 = parse(digits)?;
    let max = if signed { 64 } else { 63 };
    (1..=max).contains(&width).then_some(FieldType { signed, width })
}

fn parse_offset(raw: &[u8], width: u32) -> Option<usize> {
    match raw {
        [b'#', rest @ ..] => {
            let index: usize = parse(rest)?;
            index.checked_mul(width as usize)
        }
        _ => parse(raw),
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Overflow {
    #[default]
    Wrap,
    Sat,
    Fail,
}

/// Read `width` bits at `offset` as an unsigned value.
fn read_bits(bytes: &[u8], offset: usize, width: u32) -> u64 {
    let mut value = 0u64;
    for i in 0..width as usize {
        value = (value << 1) | u64::from(get_bit(bytes, offset + i));
    }
    value
}

fn write_bits(bytes: &mut Vec<u8>, offset: usize, width: u32, value: u64) {
    for i in 0..width as usize {
        let bit = (value >> (width as usize - 1 - i)) & 1 == 1;
        set_bit(bytes, offset + i, bit);
    }
}

/// Interpret raw bits under the field type.
fn decode(raw: u64, field: FieldType) -> i64 {
    if field.signed && field.width < 64 && (raw >> (field.width - 1)) & 1 == 1 {
        // Sign-extend.
        #[allow(clippy::cast_possible_wrap)]
        let value = (raw | (u64::MAX << field.width)) as i64;
        value
    } else {
        #[allow(clippy::cast_possible_wrap)]
        let value = raw as i64;
        value
    }
}

/// Apply overflow semantics to an i128 result. `None` means FAIL.
fn constrain(value: i128, field: FieldType, overflow: Overflow) -> Option<i64> {
    let (min, max): (i128, i128) = if field.signed {
        (
            -(1i128 << (field.width - 1)),
            (1i128 << (field.width - 1)) - 1,
        )
    } else {
        (0, (1i128 << field.width) - 1)
    };

    if (min..=max).contains(&value) {
        return i64::try_from(value).ok();
    }

    match overflow {
        Overflow::Fail => None,
        Overflow::Sat => i64::try_from(if value < min { min } else { max }).ok(),
        Overflow::Wrap => {
            let span = (max - min) + 1;
            let wrapped = ((value - min).rem_euclid(span)) + min;
            i64::try_from(wrapped).ok()
        }
    }
}

#[derive(Debug)]
enum FieldOp {
    Get(FieldType, usize),
    Set(FieldType, usize, i64),
    IncrBy(FieldType, usize, i64),
    Overflow(Overflow),
}

fn parse_field_ops(client: &mut Client, read_only: bool) -> Result<Vec<FieldOp>, ReplyError> {
    let mut ops = Vec::new();

    while let Some(op) = client.request.try_pop() {
        if op.eq_ignore_ascii_case(b"get") {
            let field = parse_type(&client.request.pop()?).ok_or(ReplyError::InvalidBitfield)?;
            let offset =
                parse_offset(&client.request.pop()?, field.width).ok_or(ReplyError::BitOffset)?;
            ops.push(FieldOp::Get(field, offset));
        } else if op.eq_ignore_ascii_case(b"set") {
            if read_only {
                return Err(ReplyError::Bitfieldro);
            }
            let field = parse_type(&client.request.pop()?).ok_or(ReplyError::InvalidBitfield)?;
            let offset =
                parse_offset(&client.request.pop()?, field.width).ok_or(ReplyError::BitOffset)?;
            let value = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
            ops.push(FieldOp::Set(field, offset, value));
        } else if op.eq_ignore_ascii_case(b"incrby") {
            if read_only {
                return Err(ReplyError::Bitfieldro);
            }
            let field = parse_type(&client.request.pop()?).ok_or(ReplyError::InvalidBitfield)?;
            let offset =
                parse_offset(&client.request.pop()?, field.width).ok_or(ReplyError::BitOffset)?;
            let by = parse(&client.request.pop()?).ok_or(ReplyError::Integer)?;
            ops.push(FieldOp::IncrBy(field, offset, by));
        } else if op.eq_ignore_ascii_case(b"overflow") {
            if read_only {
                return Err(ReplyError::Bitfieldro);
            }
            let mode = client.request.pop()?;
            let mode = if mode.eq_ignore_ascii_case(b"wrap") {
                Overflow::Wrap
            } else if mode.eq_ignore_ascii_case(b"sat") {
                Overflow::Sat
            } else if mode.eq_ignore_ascii_case(b"fail") {
                Overflow::Fail
            } else {
                return Err(ReplyError::InvalidOverflow);
            };
            ops.push(FieldOp::Overflow(mode));
        } else {
            return Err(ReplyError::Syntax);
        }
    }

    Ok(ops)
}

pub static BITFIELD: Command = Command {
    kind: CommandKind::Bitfield,
    name: "bitfield",
    arity: Arity::Minimum(2),
    run: bitfield,
    keys: Keys::Single,
    readonly: false,
    admin: false,
    noscript: false,
    pubsub: false,
    write: true,
};

fn bitfield(client: &mut Client, store: &Store) -> CommandResult {
    run_bitfield(client, store, false)
}

pub static BITFIELD_RO: Command = Command {
    kind: CommandKind::Bitfieldro,
    name: "bitfield_ro",
    arity: Arity::Minimum(2),
    run: bitfield_ro,
    keys: Keys::Single,
    readonly: true,
    admin: false,
    noscript: false,
    pubsub: false,
    write: false,
};

fn bitfield_ro(client: &mut Client, store: &Store) -> CommandResult {
    run_bitfield(client, store, true)
}

fn run_bitfield(client: &mut Client, store: &Store, read_only: bool) -> CommandResult {
    let key = client.request.pop()?;
    let ops = parse_field_ops(client, read_only)?;

    let mut db = store.db(client.db)?.write();

    // Pure GETs never create the key.
    let writes = ops
        .iter()
        .any(|op| matches!(op, FieldOp::Set(..) | FieldOp::IncrBy(..)));

    let mut scratch: Vec<u8>;
    let buffer: &mut Vec<u8> = if writes {
        db.str_or_default(&key)?.make_raw()
    } else {
        scratch = db
            .get_str(&key)?
            .map(|value| value.to_bytes().to_vec())
            .unwrap_or_default();
        &mut scratch
    };

    let mut overflow = Overflow::default();
    let mut replies = Vec::new();
    let mut mutated = false;

    for op in ops {
        match op {
            FieldOp::Overflow(mode) => overflow = mode,
            FieldOp::Get(field, offset) => {
                let raw = read_bits(buffer, offset, field.width);
                replies.push(Reply::Integer(decode(raw, field)));
            }
            FieldOp::Set(field, offset, value) => {
                let old = decode(read_bits(buffer, offset, field.width), field);
                match constrain(i128::from(value), field, overflow) {
                    Some(value) => {
                        #[allow(clippy::cast_sign_loss)]
                        write_bits(buffer, offset, field.width, value as u64);
                        mutated = true;
                        replies.push(Reply::Integer(old));
                    }
                    None => replies.push(Reply::Nil),
                }
            }
            FieldOp::IncrBy(field, offset, by) => {
                let old = decode(read_bits(buffer, offset, field.width), field);
                let next = i128::from(old) + i128::from(by);
                match constrain(next, field, overflow) {
                    Some(value) => {
                        #[allow(clippy::cast_sign_loss)]
                        write_bits(buffer, offset, field.width, value as u64);
                        mutated = true;
                        replies.push(Reply::Integer(value));
                    }
                    None => replies.push(Reply::Nil),
                }
            }
        }
    }

    if mutated {
        db.touch(&key);
    }
    drop(db);

    client.array(replies.into_iter());
    Ok(())
}
