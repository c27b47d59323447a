//! The embedded scripting host. Scripts run on a piccolo Lua VM with
//! `KEYS` and `ARGV` bound as tables; `server.call`/`server.pcall` (also
//! aliased as `redis.*`) dispatch back through the command table on the
//! calling connection. Scripts are cached under their SHA-1 hex.

use crate::{
    client::Client,
    reply::{Reply, ReplyError, StatusReply},
    store::Store,
};
use bytes::Bytes;
use piccolo::{Callback, CallbackReturn, Closure, Context, Executor, Lua, Table, Value, Variadic};
use sha1::{Digest, Sha1};
use std::{cell::Cell, collections::VecDeque};

/// The lowercase SHA-1 hex of a script body.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(40);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// A reply tree, bridging the flat reply stream and Lua values.
#[derive(Debug)]
enum ScriptValue {
    Nil,
    Int(i64),
    Bulk(Vec<u8>),
    Status(Vec<u8>),
    Error(String),
    Array(Vec<ScriptValue>),
}

impl<'gc> piccolo::FromMultiValue<'gc> for ScriptValue {
    fn from_multi_value(
        ctx: Context<'gc>,
        mut values: impl Iterator<Item = Value<'gc>>,
    ) -> Result<Self, piccolo::TypeError> {
        Ok(from_lua(ctx, values.next().unwrap_or(Value::Nil)))
    }
}

/// Lua → reply conversion: numbers truncate to integers, strings become
/// bulk, tables become arrays (with `err`/`ok` escapes), booleans map to
/// 1/nil.
fn from_lua<'gc>(ctx: Context<'gc>, value: Value<'gc>) -> ScriptValue {
    match value {
        Value::Nil | Value::Boolean(false) => ScriptValue::Nil,
        Value::Boolean(true) => ScriptValue::Int(1),
        Value::Integer(n) => ScriptValue::Int(n),
        #[allow(clippy::cast_possible_truncation)]
        Value::Number(n) => ScriptValue::Int(n as i64),
        Value::String(s) => ScriptValue::Bulk(s.as_bytes().to_vec()),
        Value::Table(table) => {
            if let Value::String(err) = table.get(ctx, "err") {
                return ScriptValue::Error(String::from_utf8_lossy(err.as_bytes()).into_owned());
            }
            if let Value::String(ok) = table.get(ctx, "ok") {
                return ScriptValue::Status(ok.as_bytes().to_vec());
            }
            let mut items = Vec::new();
            let mut index = 1i64;
            loop {
                let item = table.get(ctx, index);
                if matches!(item, Value::Nil) {
                    break;
                }
                items.push(from_lua(ctx, item));
                index += 1;
            }
            ScriptValue::Array(items)
        }
        _ => ScriptValue::Nil,
    }
}

/// Reply → Lua conversion for `server.call` results.
fn to_lua<'gc>(ctx: Context<'gc>, value: &ScriptValue) -> Value<'gc> {
    match value {
        ScriptValue::Nil => Value::Boolean(false),
        ScriptValue::Int(n) => Value::Integer(*n),
        ScriptValue::Bulk(bytes) => Value::String(piccolo::String::from_slice(&ctx, bytes)),
        ScriptValue::Status(bytes) => {
            let table = Table::new(&ctx);
            _ = table.set(ctx, "ok", piccolo::String::from_slice(&ctx, bytes));
            Value::Table(table)
        }
        ScriptValue::Error(message) => {
            let table = Table::new(&ctx);
            _ = table.set(ctx, "err", piccolo::String::from_slice(&ctx, message.as_bytes()));
            Value::Table(table)
        }
        ScriptValue::Array(items) => {
            let table = Table::new(&ctx);
            for (index, item) in items.iter().enumerate() {
                _ = table.set(ctx, i64::try_from(index).unwrap_or(i64::MAX) + 1, to_lua(ctx, item));
            }
            Value::Table(table)
        }
    }
}

/// Rebuild one reply tree from the flat reply stream a handler produced.
fn take_reply(queue: &mut VecDeque<Reply>) -> ScriptValue {
    match queue.pop_front() {
        None | Some(Reply::Nil) => ScriptValue::Nil,
        Some(Reply::Integer(n)) => ScriptValue::Int(n),
        Some(Reply::Bulk(bytes)) => ScriptValue::Bulk(bytes.to_vec()),
        Some(Reply::Status(status)) => ScriptValue::Status(status.as_bytes().to_vec()),
        Some(Reply::Error(error)) => ScriptValue::Error(error.to_string()),
        Some(Reply::Array(len)) => {
            let items = (0..len).map(|_| take_reply(queue)).collect();
            ScriptValue::Array(items)
        }
    }
}

/// Flatten a reply tree back onto the client.
fn emit(client: &mut Client, value: ScriptValue) {
    match value {
        ScriptValue::Nil => client.reply(Reply::Nil),
        ScriptValue::Int(n) => client.reply(n),
        ScriptValue::Bulk(bytes) => client.reply(Reply::Bulk(Bytes::from(bytes))),
        ScriptValue::Status(bytes) => {
            client.reply(Reply::Status(StatusReply::Bytes(Bytes::from(bytes))));
        }
        ScriptValue::Error(message) => {
            client.reply(ReplyError::Custom(message.into_bytes().into()));
        }
        ScriptValue::Array(items) => {
            client.reply(Reply::Array(items.len()));
            for item in items {
                emit(client, item);
            }
        }
    }
}

// The dispatcher hook for server.call: callbacks are 'static, so the
// client/store context rides a thread local for the duration of one
// execution. Scripts run to completion on the calling thread.
thread_local! {
    static HOST: Cell<Option<Host>> = const { Cell::new(None) };
}

#[derive(Clone, Copy)]
struct Host {
    client: *mut Client,
    store: *const Store,
    /// The first `server.call` error, which becomes the script's reply.
    aborted: *mut Option<String>,
}

struct HostGuard;

impl HostGuard {
    fn install(host: Host) -> HostGuard {
        HOST.with(|cell| cell.set(Some(host)));
        HostGuard
    }
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        HOST.with(|cell| cell.set(None));
    }
}

/// Dispatch one command from inside a script.
fn dispatch(arguments: Vec<Vec<u8>>) -> ScriptValue {
    let Some(host) = HOST.with(|cell| cell.get()) else {
        return ScriptValue::Error("ERR script host is gone".to_string());
    };

    // Safety: the pointers are installed by `run` for the duration of one
    // synchronous execution on this thread, and the outer borrows are not
    // used while the VM runs.
    let client = unsafe { &mut *host.client };
    let store = unsafe { &*host.store };

    let saved = std::mem::take(&mut client.request);
    for argument in arguments {
        client.request.push_back(Bytes::from(argument));
    }
    client.run(store);
    client.request = saved;

    take_reply(&mut client.scripting_reply)
}

fn lua_arguments(values: Vec<ScriptValue>) -> Result<Vec<Vec<u8>>, String> {
    if values.is_empty() {
        return Err("ERR wrong number of arguments".to_string());
    }
    values
        .into_iter()
        .map(|value| match value {
            ScriptValue::Bulk(bytes) | ScriptValue::Status(bytes) => Ok(bytes),
            ScriptValue::Int(n) => Ok(n.to_string().into_bytes()),
            _ => Err("ERR Lua redis lib command arguments must be strings or integers".to_string()),
        })
        .collect()
}

fn call_callback<'gc>(ctx: Context<'gc>, pcall: bool) -> Callback<'gc> {
    Callback::from_fn(&ctx, move |ctx, _, mut stack| {
        let values: Variadic<Vec<Value>> = stack.consume(ctx)?;
        let arguments: Vec<ScriptValue> = values
            .0
            .into_iter()
            .map(|value| from_lua(ctx, value))
            .collect();

        let result = match lua_arguments(arguments) {
            Ok(arguments) => dispatch(arguments),
            Err(message) => ScriptValue::Error(message),
        };

        if !pcall {
            if let ScriptValue::Error(message) = &result {
                if let Some(host) = HOST.with(|cell| cell.get()) {
                    // Safety: see `dispatch`.
                    let aborted = unsafe { &mut *host.aborted };
                    if aborted.is_none() {
                        *aborted = Some(message.clone());
                    }
                }
            }
        }

        stack.replace(ctx, to_lua(ctx, &result));
        Ok(CallbackReturn::Return)
    })
}

/// Run a script with its bindings and send the resulting reply.
pub fn run(client: &mut Client, store: &Store, source: &[u8], keys: Vec<Bytes>, argv: Vec<Bytes>) {
    let mut lua = Lua::core();

    let executor = lua.try_enter(|ctx| {
        let keys_table = Table::new(&ctx);
        for (index, key) in keys.iter().enumerate() {
            _ = keys_table.set(
                ctx,
                i64::try_from(index).unwrap_or(i64::MAX) + 1,
                piccolo::String::from_slice(&ctx, &key[..]),
            );
        }
        ctx.set_global("KEYS", keys_table)?;

        let argv_table = Table::new(&ctx);
        for (index, argument) in argv.iter().enumerate() {
            _ = argv_table.set(
                ctx,
                i64::try_from(index).unwrap_or(i64::MAX) + 1,
                piccolo::String::from_slice(&ctx, &argument[..]),
            );
        }
        ctx.set_global("ARGV", argv_table)?;

        let server = Table::new(&ctx);
        _ = server.set(ctx, "call", call_callback(ctx, false));
        _ = server.set(ctx, "pcall", call_callback(ctx, true));
        ctx.set_global("server", server)?;
        ctx.set_global("redis", server)?;

        let closure = Closure::load(ctx, None, source)?;
        Ok(ctx.stash(Executor::start(ctx, closure.into(), ())))
    });

    let executor = match executor {
        Ok(executor) => executor,
        Err(error) => {
            client.reply(ReplyError::Custom(
                format!("ERR Error compiling script: {error}").into_bytes().into(),
            ));
            return;
        }
    };

    let mut aborted: Option<String> = None;
    let was_scripting = client.scripting;
    client.scripting = true;
    client.scripting_reply.clear();

    let result = {
        let _guard = HostGuard::install(Host {
            client: std::ptr::from_mut(client),
            store: std::ptr::from_ref(store),
            aborted: std::ptr::from_mut(&mut aborted),
        });
        lua.execute::<ScriptValue>(&executor)
    };

    client.scripting = was_scripting;
    client.scripting_reply.clear();

    if let Some(message) = aborted {
        client.reply(ReplyError::Custom(message.into_bytes().into()));
        return;
    }

    match result {
        Ok(value) => emit(client, value),
        Err(error) => {
            client.reply(ReplyError::Custom(
                format!("ERR Error running script: {error}").into_bytes().into(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_is_hex_of_the_source() {
        // A fixed vector: sha1("") and sha1("abc").
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn reply_trees_rebuild_from_flat_streams() {
        let mut queue: VecDeque<Reply> = VecDeque::new();
        queue.push_back(Reply::Array(3));
        queue.push_back(Reply::Integer(1));
        queue.push_back(Reply::Array(1));
        queue.push_back(Reply::Bulk(Bytes::from_static(b"x")));
        queue.push_back(Reply::Nil);

        let tree = take_reply(&mut queue);
        match tree {
            ScriptValue::Array(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[0], ScriptValue::Int(1)));
                assert!(matches!(&items[1], ScriptValue::Array(inner) if inner.len() == 1));
                assert!(matches!(items[2], ScriptValue::Nil));
            }
            other => panic!("expected an array, got {other:?}"),
        }
        assert!(queue.is_empty());
    }
}
