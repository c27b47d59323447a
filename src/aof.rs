//! The append-only command log: every executed write command is appended
//! in its RESP form, replayed against an empty keyspace on startup, and
//! periodically compacted by rewriting the live keyspace as the minimal
//! equivalent command stream.

use crate::{
    bytes::lex,
    client::Client,
    db::{Db, DbIndex, StreamId, Value},
    rdb,
    reply::format_double,
    request::Request,
    store::Store,
};
use bytes::Bytes;
use logos::Logos;
use parking_lot::Mutex;
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use triomphe::Arc;

/// When to fsync the log.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FsyncPolicy {
    /// After every appended command.
    Always,

    /// Once per second, from the server timer.
    #[default]
    EverySec,

    /// Never; the OS decides.
    No,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum FsyncToken {
    #[regex(b"(?i:always)")]
    Always,

    #[regex(b"(?i:everysec)")]
    EverySec,

    #[regex(b"(?i:no)")]
    No,
}

impl FsyncPolicy {
    pub fn parse(bytes: &[u8]) -> Option<FsyncPolicy> {
        Some(match lex::<FsyncToken>(bytes)? {
            FsyncToken::Always => FsyncPolicy::Always,
            FsyncToken::EverySec => FsyncPolicy::EverySec,
            FsyncToken::No => FsyncPolicy::No,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FsyncPolicy::Always => "always",
            FsyncPolicy::EverySec => "everysec",
            FsyncPolicy::No => "no",
        }
    }
}

/// Append a command as a RESP array of bulk strings.
fn encode(buffer: &mut Vec<u8>, args: &[Bytes]) {
    _ = write!(buffer, "*{}\r\n", args.len());
    for arg in args {
        _ = write!(buffer, "${}\r\n", arg.len());
        buffer.extend_from_slice(arg);
        buffer.extend_from_slice(b"\r\n");
    }
}

fn select_command(db: DbIndex) -> Vec<Bytes> {
    vec![
        Bytes::from_static(b"SELECT"),
        Bytes::from(db.0.to_string()),
    ]
}

#[derive(Debug)]
struct AofState {
    file: Option<std::fs::File>,

    /// The database the log is currently positioned on; `None` forces a
    /// SELECT before the next command.
    selected: Option<usize>,
}

/// The append-only log manager. The inner state is shared with the
/// rewrite task, which swaps the live file handle when it finishes.
#[derive(Debug)]
pub struct Aof {
    enabled: bool,
    policy: FsyncPolicy,
    path: PathBuf,
    state: Arc<Mutex<AofState>>,
    rewriting: Arc<AtomicBool>,
}

impl Aof {
    pub fn new(enabled: bool, policy: FsyncPolicy, path: PathBuf) -> std::io::Result<Aof> {
        let file = if enabled {
            Some(
                std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)?,
            )
        } else {
            None
        };

        Ok(Aof {
            enabled,
            policy,
            path,
            state: Arc::new(Mutex::new(AofState {
                file,
                selected: None,
            })),
            rewriting: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> FsyncPolicy {
        self.policy
    }

    pub fn is_rewriting(&self) -> bool {
        self.rewriting.load(Ordering::Acquire)
    }

    /// Append one executed write command.
    pub fn append(&self, db: DbIndex, request: &Request) {
        if !self.enabled {
            return;
        }

        let mut buffer = Vec::new();
        let mut state = self.state.lock();

        if state.selected != Some(db.0) {
            encode(&mut buffer, &select_command(db));
            state.selected = Some(db.0);
        }
        let args: Vec<Bytes> = request.iter_all().collect();
        encode(&mut buffer, &args);

        let Some(file) = state.file.as_mut() else {
            return;
        };
        if let Err(error) = file.write_all(&buffer) {
            tracing::error!(%error, "appending to the command log failed");
            return;
        }
        if self.policy == FsyncPolicy::Always {
            if let Err(error) = file.sync_data() {
                tracing::error!(%error, "fsync of the command log failed");
            }
        }
    }

    /// The per-second fsync, driven by the server timer.
    pub fn tick(&self) {
        if !self.enabled || self.policy != FsyncPolicy::EverySec {
            return;
        }
        let mut state = self.state.lock();
        if let Some(file) = state.file.as_mut() {
            _ = file.sync_data();
        }
    }

    /// Replay the log against the (empty) keyspace. Returns the number of
    /// commands applied.
    pub async fn load(store: &Arc<Store>) -> std::io::Result<usize> {
        let path = store.aof.path.clone();
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error),
        };

        store.loading.store(true, Ordering::Release);
        let (mut client, reply_receiver) = Client::detached();
        // Replay replies go nowhere.
        drop(reply_receiver);

        let mut commands = 0;
        let mut reader = respite::RespReader::new(file, respite::RespConfig::default());
        reader
            .requests(|request| {
                use respite::RespRequest::*;
                match request {
                    Argument(argument) => client.request.push_back(argument),
                    End => {
                        client.run(store);
                        client.request.clear();
                        commands += 1;
                    }
                    InvalidArgument | Error(_) => {
                        tracing::warn!("truncated entry at the end of the command log");
                    }
                }
            })
            .await;

        store.loading.store(false, Ordering::Release);
        Ok(commands)
    }

    /// Compact the log in the background: serialise the live keyspace as
    /// commands, then swap the new file in. `Err(())` when a rewrite is
    /// already running.
    #[allow(clippy::result_unit_err)]
    pub fn rewrite(&self, dbs: &[Db]) -> Result<(), ()> {
        if self.rewriting.swap(true, Ordering::AcqRel) {
            return Err(());
        }

        let dumps = rdb::capture(dbs);
        let path = self.path.clone();
        let state = self.state.clone();
        let rewriting = self.rewriting.clone();
        let enabled = self.enabled;
        tokio::task::spawn_blocking(move || {
            match write_rewrite(&path, &dumps, &state, enabled) {
                Ok(()) => tracing::info!("command log rewrite complete"),
                Err(error) => tracing::error!(%error, "command log rewrite failed"),
            }
            rewriting.store(false, Ordering::Release);
        });

        Ok(())
    }
}

/// Serialise dumps as commands into a temp file and swap it in.
fn write_rewrite(
    path: &Path,
    dumps: &[rdb::DbDump],
    state: &Mutex<AofState>,
    enabled: bool,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();

    for (index, dump) in dumps.iter().enumerate() {
        if dump.is_empty() {
            continue;
        }
        encode(&mut buffer, &select_command(DbIndex(index)));

        for (key, value, expires) in dump {
            rewrite_value(&mut buffer, key, value);
            if let Some(at) = expires {
                encode(
                    &mut buffer,
                    &[
                        Bytes::from_static(b"PEXPIREAT"),
                        key.clone(),
                        Bytes::from(at.to_string()),
                    ],
                );
            }
        }
    }

    let temp = path.with_extension("aof.tmp");
    let mut file = std::fs::File::create(&temp)?;
    file.write_all(&buffer)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&temp, path)?;

    // Point the live log at the rewritten file.
    let mut state = state.lock();
    if enabled {
        state.file = Some(
            std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)?,
        );
    }
    state.selected = None;
    Ok(())
}

/// The minimal command rebuilding one key.
fn rewrite_value(buffer: &mut Vec<u8>, key: &Bytes, value: &Value) {
    match value {
        Value::Str(string) => {
            encode(
                buffer,
                &[Bytes::from_static(b"SET"), key.clone(), string.to_bytes()],
            );
        }
        Value::List(list) => {
            let mut args = vec![Bytes::from_static(b"RPUSH"), key.clone()];
            args.extend(list.iter().cloned());
            encode(buffer, &args);
        }
        Value::Hash(hash) => {
            let mut args = vec![Bytes::from_static(b"HSET"), key.clone()];
            for (field, item) in hash.iter() {
                args.push(field.clone());
                args.push(item.clone());
            }
            encode(buffer, &args);
        }
        Value::Set(set) => {
            let mut args = vec![Bytes::from_static(b"SADD"), key.clone()];
            args.extend(set.iter().cloned());
            encode(buffer, &args);
        }
        Value::SortedSet(sorted) => {
            let mut args = vec![Bytes::from_static(b"ZADD"), key.clone()];
            for (score, member) in sorted.iter() {
                args.push(Bytes::from(format_double(score)));
                args.push(member.clone());
            }
            encode(buffer, &args);
        }
        Value::Stream(stream) => {
            for entry in stream.range(StreamId::ZERO, StreamId::MAX) {
                let mut args = vec![
                    Bytes::from_static(b"XADD"),
                    key.clone(),
                    entry.id.to_bytes(),
                ];
                for (field, item) in &entry.fields {
                    args.push(field.clone());
                    args.push(item.clone());
                }
                encode(buffer, &args);
            }
            for (name, group) in &stream.groups {
                encode(
                    buffer,
                    &[
                        Bytes::from_static(b"XGROUP"),
                        Bytes::from_static(b"CREATE"),
                        key.clone(),
                        name.clone(),
                        group.last_delivered.to_bytes(),
                    ],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_policies() {
        assert_eq!(FsyncPolicy::parse(b"always"), Some(FsyncPolicy::Always));
        assert_eq!(FsyncPolicy::parse(b"EVERYSEC"), Some(FsyncPolicy::EverySec));
        assert_eq!(FsyncPolicy::parse(b"no"), Some(FsyncPolicy::No));
        assert_eq!(FsyncPolicy::parse(b"sometimes"), None);
    }

    #[test]
    fn encoding_is_resp() {
        let mut buffer = Vec::new();
        encode(
            &mut buffer,
            &[Bytes::from_static(b"SET"), Bytes::from_static(b"k"), Bytes::from_static(b"v")],
        );
        assert_eq!(
            buffer,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn disabled_log_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        let aof = Aof::new(false, FsyncPolicy::No, path.clone()).unwrap();

        let mut request = Request::default();
        request.push_back(Bytes::from_static(b"SET"));
        request.push_back(Bytes::from_static(b"k"));
        request.push_back(Bytes::from_static(b"v"));
        aof.append(DbIndex(0), &request);

        assert!(!path.exists());
    }

    #[test]
    fn appends_with_select() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        let aof = Aof::new(true, FsyncPolicy::Always, path.clone()).unwrap();

        let mut request = Request::default();
        request.push_back(Bytes::from_static(b"SET"));
        request.push_back(Bytes::from_static(b"k"));
        request.push_back(Bytes::from_static(b"v"));
        aof.append(DbIndex(2), &request);
        aof.append(DbIndex(2), &request);

        let contents = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&contents);
        // One SELECT, then the command twice.
        assert_eq!(text.matches("SELECT").count(), 1);
        assert_eq!(text.matches("SET").count(), 2);
    }
}
