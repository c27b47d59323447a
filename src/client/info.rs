use crate::client::{Addr, ClientId, ReplyMessage};
use tokio::sync::mpsc;
use web_time::Instant;

/// What the store tracks about a connection while it is alive.
#[derive(Debug)]
pub struct ClientInfo {
    pub id: ClientId,
    pub addr: Option<Addr>,
    pub created_at: Instant,
    pub reply_sender: mpsc::UnboundedSender<ReplyMessage>,
}

impl ClientInfo {
    /// Seconds since the connection was accepted.
    pub fn age(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }
}
