use std::net::SocketAddr;

/// The local and peer addresses of a connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Addr {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}
