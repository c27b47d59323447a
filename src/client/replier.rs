use crate::{client::ReplyMessage, reply::Reply};
use respite::{RespError, RespWriter};
use std::io::Write as IoWrite;
use thiserror::Error;
use tokio::{
    io::{AsyncWrite, BufWriter},
    sync::mpsc,
};

/// An error while writing replies.
#[derive(Debug, Error)]
pub enum ReplierError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Resp(#[from] RespError),
}

/// Serialises replies onto the socket in command order. Runs as its own
/// task so slow sockets never block command execution.
pub struct Replier<W: AsyncWrite + Unpin> {
    /// Scratch space for rendering errors.
    buffer: Vec<u8>,

    /// Set by [`ReplyMessage::Quit`]; replies after it are dropped.
    quitting: bool,

    reply_receiver: mpsc::UnboundedReceiver<ReplyMessage>,

    writer: RespWriter<BufWriter<W>>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> Replier<W> {
    /// Spawn a replier task and return its sender.
    pub fn spawn(writer: W) -> mpsc::UnboundedSender<ReplyMessage> {
        let (reply_sender, reply_receiver) = mpsc::unbounded_channel();
        let replier = Replier {
            buffer: Vec::new(),
            quitting: false,
            reply_receiver,
            writer: RespWriter::new(BufWriter::new(writer)),
        };
        tokio::spawn(replier.listen());
        reply_sender
    }

    async fn listen(mut self) {
        if let Err(error) = self.listen_inner().await {
            tracing::debug!(%error, "replier stopped");
        }
    }

    async fn listen_inner(&mut self) -> Result<(), ReplierError> {
        while let Some(message) = self.reply_receiver.recv().await {
            self.message(message).await?;

            // Drain whatever else is queued before paying for a flush.
            while let Ok(message) = self.reply_receiver.try_recv() {
                self.message(message).await?;
            }

            self.writer.flush().await?;
        }
        Ok(())
    }

    async fn message(&mut self, message: ReplyMessage) -> Result<(), ReplierError> {
        match message {
            ReplyMessage::Quit => {
                self.quitting = true;
            }
            ReplyMessage::Reply(reply) => {
                self.write(reply).await?;
            }
        }
        Ok(())
    }

    async fn write(&mut self, reply: Reply) -> Result<(), ReplierError> {
        if self.quitting {
            return Ok(());
        }

        match reply {
            Reply::Array(len) => {
                self.writer.write_array(len).await?;
            }
            Reply::Bulk(bytes) => {
                self.writer.write_blob_string(&bytes[..]).await?;
            }
            Reply::Error(error) => {
                self.buffer.clear();
                write!(self.buffer, "{error}").expect("rendering an error reply");
                self.writer.write_simple_error(&self.buffer[..]).await?;
            }
            Reply::Integer(value) => {
                self.writer.write_integer(value).await?;
            }
            Reply::Nil => {
                self.writer.write_nil().await?;
            }
            Reply::Status(status) => {
                self.writer.write_simple_string(status.as_bytes()).await?;
            }
        }

        Ok(())
    }
}
