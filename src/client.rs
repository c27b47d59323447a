mod addr;
mod id;
mod info;
mod replier;
mod reply_message;

pub use addr::Addr;
pub use id::ClientId;
pub use info::ClientInfo;
pub use replier::Replier;
pub use reply_message::ReplyMessage;

use crate::{
    command::CommandKind,
    db::DbIndex,
    reply::{Reply, ReplyError},
    request::Request,
    store::Store,
};
use bytes::Bytes;
use hashbrown::HashSet;
use respite::{RespReader, RespRequest};
use std::collections::VecDeque;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use triomphe::Arc;
use web_time::Instant;

/// One queued transaction argument: raw bytes or an end-of-command marker.
pub enum Argument {
    Push(Bytes),
    End,
}

/// The transaction state of a connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tx {
    /// No transaction.
    None,

    /// In a transaction with the number of queued commands.
    Some(usize),

    /// A queueing error poisoned the transaction; EXEC will abort.
    Error(usize),
}

/// Per-connection state and the dispatch loop. The reader and replier run
/// as sibling tasks; this owns everything a command handler can touch.
pub struct Client {
    pub id: ClientId,

    pub addr: Option<Addr>,

    /// The currently selected database.
    pub db: DbIndex,

    /// The decoded request being executed.
    pub request: Request,

    /// Commands queued by MULTI, flattened with end markers.
    pub queue: VecDeque<Argument>,

    tx: Tx,

    /// Set while EXEC re-dispatches the queue.
    pub in_exec: bool,

    /// Set while a script drives the dispatcher; replies divert to
    /// `scripting_reply`.
    pub scripting: bool,

    pub scripting_reply: VecDeque<Reply>,

    /// Channel subscriptions, by name.
    pub channels: HashSet<Bytes>,

    /// Pattern subscriptions, by pattern.
    pub patterns: HashSet<Bytes>,

    pub reply_sender: mpsc::UnboundedSender<ReplyMessage>,

    requests: mpsc::UnboundedReceiver<RespRequest>,

    reader_task: Option<JoinHandle<()>>,

    quitting: bool,
}

impl Client {
    /// Wire a transport up as a connection: spawn the reader, the replier
    /// and the dispatch loop.
    pub fn spawn<S: AsyncRead + AsyncWrite + Send + 'static>(
        stream: S,
        store: Arc<Store>,
        addr: Option<Addr>,
    ) {
        let (reader, writer) = tokio::io::split(stream);
        let (request_sender, requests) = mpsc::unbounded_channel();

        let mut reader = RespReader::new(reader, store.reader_config.clone());
        let reader_task = tokio::spawn(async move {
            reader
                .requests(|request| {
                    _ = request_sender.send(request);
                })
                .await;
        });

        let reply_sender = Replier::spawn(writer);
        let id = ClientId::next();

        store.connect(ClientInfo {
            id,
            addr,
            created_at: Instant::now(),
            reply_sender: reply_sender.clone(),
        });

        let client = Client {
            id,
            addr,
            db: DbIndex(0),
            request: Request::default(),
            queue: VecDeque::new(),
            tx: Tx::None,
            in_exec: false,
            scripting: false,
            scripting_reply: VecDeque::new(),
            channels: HashSet::new(),
            patterns: HashSet::new(),
            reply_sender,
            requests,
            reader_task: Some(reader_task),
            quitting: false,
        };

        tokio::spawn(client.run_loop(store));
    }

    /// A client with no transport, for AOF replay and unit tests. Replies
    /// accumulate on the returned receiver.
    pub fn detached() -> (Client, mpsc::UnboundedReceiver<ReplyMessage>) {
        let (reply_sender, reply_receiver) = mpsc::unbounded_channel();
        let (_request_sender, requests) = mpsc::unbounded_channel();
        let client = Client {
            id: ClientId::next(),
            addr: None,
            db: DbIndex(0),
            request: Request::default(),
            queue: VecDeque::new(),
            tx: Tx::None,
            in_exec: false,
            scripting: false,
            scripting_reply: VecDeque::new(),
            channels: HashSet::new(),
            patterns: HashSet::new(),
            reply_sender,
            requests,
            reader_task: None,
            quitting: false,
        };
        (client, reply_receiver)
    }

    async fn run_loop(mut self, store: Arc<Store>) {
        loop {
            let Some(message) = self.requests.recv().await else {
                break;
            };

            match message {
                RespRequest::Argument(argument) => {
                    self.request.push_back(argument);
                }
                RespRequest::End => {
                    self.run(&store);
                    self.request.clear();
                    if self.quitting {
                        break;
                    }
                }
                RespRequest::InvalidArgument => {
                    self.reply(ReplyError::InvalidArgument);
                }
                RespRequest::Error(error) => {
                    self.reply(ReplyError::Resp(error));
                    break;
                }
            }
        }

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        _ = self.reply_sender.send(ReplyMessage::Quit);
        store.disconnect(self.id);
    }

    /// Dispatch the currently loaded request.
    pub fn run(&mut self, store: &Store) {
        let command = self.request.command;

        if !self.request.is_valid() {
            self.error();
            let reply = self.request.wrong_arguments();
            self.reply(reply);
            return;
        }

        if command.kind == CommandKind::Unknown {
            self.error();
            let name = self.request.get(0).unwrap_or_default();
            self.reply(ReplyError::UnknownCommand(name));
            return;
        }

        if self.scripting && command.noscript {
            self.reply(ReplyError::NoScriptCommand);
            return;
        }

        // In subscriber mode only the subscription commands make sense.
        if self.pubsub_mode() && !command.pubsub_allowed() {
            self.reply(ReplyError::Pubsub(command));
            return;
        }

        // Inside MULTI most commands queue instead of executing.
        if command.queueable() && !self.in_exec {
            match self.tx {
                Tx::Error(count) => {
                    self.set_tx(Tx::Error(count + 1));
                    self.reply("QUEUED");
                    return;
                }
                Tx::Some(count) => {
                    self.set_tx(Tx::Some(count + 1));
                    for argument in self.request.drain() {
                        self.queue.push_back(Argument::Push(argument));
                    }
                    self.queue.push_back(Argument::End);
                    self.reply("QUEUED");
                    return;
                }
                Tx::None => {}
            }
        }

        let key_count = self
            .request
            .keys()
            .map(std::iter::Iterator::count)
            .unwrap_or(0);
        tracing::trace!(command = command.name, keys = key_count, "dispatch");

        // The memory gate: try to evict before a write allocates.
        if command.write && store.eviction.check(&store.dbs).is_err() {
            self.error();
            self.reply(ReplyError::Oom);
            return;
        }

        // Ordinary commands share the execution lock; EXEC takes it
        // exclusively to make its dirty-check-then-run atomic. Nested
        // dispatch (EXEC bodies, scripts) already holds it.
        let permit = (!self.in_exec && !self.scripting && command.kind != CommandKind::Exec)
            .then(|| store.exec_lock.read());

        let result = (command.run)(self, store);
        let failed = matches!(result, Err(Reply::Error(_)));
        match result {
            Ok(()) => {}
            Err(Reply::Error(error)) => {
                self.error();
                self.reply(error);
            }
            Err(reply) => {
                self.reply(reply);
            }
        }

        // Dirty hooks fire and the log is appended inside the permit, so
        // EXEC's atomicity window sees every committed write and the log
        // keeps commit order.
        store.commit();
        if command.write && !failed {
            store.propagate(self.db, &self.request);
        }
        drop(permit);

        store.stats.commands.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// On an error, poison any open transaction.
    pub fn error(&mut self) {
        if let Tx::Some(count) = self.tx {
            self.set_tx(Tx::Error(count));
        }
    }

    pub fn tx(&self) -> Tx {
        self.tx
    }

    pub fn set_tx(&mut self, tx: Tx) -> Tx {
        std::mem::replace(&mut self.tx, tx)
    }

    /// Abandon the current transaction and its watches.
    pub fn discard(&mut self, store: &Store) {
        self.set_tx(Tx::None);
        self.queue.clear();
        store.unwatch(self.id);
    }

    /// Is this connection in subscriber mode?
    pub fn pubsub_mode(&self) -> bool {
        !self.channels.is_empty() || !self.patterns.is_empty()
    }

    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// Stop reading requests after the current reply is flushed.
    pub fn quit(&mut self) {
        self.quitting = true;
    }

    /// Send a reply to the socket, or buffer it for the running script.
    pub fn reply(&mut self, reply: impl Into<Reply>) {
        if self.scripting {
            self.scripting_reply.push_back(reply.into());
        } else {
            _ = self.reply_sender.send(reply.into().into());
        }
    }

    /// Send an array reply from an exact-size iterator.
    pub fn array<I, T>(&mut self, iter: I)
    where
        T: Into<Reply>,
        I: Iterator<Item = T> + ExactSizeIterator,
    {
        self.reply(Reply::Array(iter.len()));
        for reply in iter {
            self.reply(reply);
        }
    }
}
