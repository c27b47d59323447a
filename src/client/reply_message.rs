use crate::reply::Reply;

/// A message to a connection's [`Replier`][super::Replier] task.
#[derive(Debug)]
pub enum ReplyMessage {
    /// Stop writing; the connection is going away.
    Quit,

    /// Serialise and send one reply frame.
    Reply(Reply),
}

impl From<Reply> for ReplyMessage {
    fn from(reply: Reply) -> Self {
        ReplyMessage::Reply(reply)
    }
}
