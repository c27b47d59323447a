use std::sync::atomic::{AtomicI64, Ordering};

/// The id to be assigned to the next client.
static NEXT_ID: AtomicI64 = AtomicI64::new(0);

/// A process-unique connection id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClientId(pub i64);

impl ClientId {
    pub fn next() -> ClientId {
        ClientId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
