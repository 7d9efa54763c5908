//! # Proxy chain sockets
//! Open a TCP connection through one or more proxies, each relaying to the
//! next, and use the result like a direct socket.
//!
//! The proxy protocols themselves are not part of this crate: a proxy is
//! anything implementing [`ChainProxy`].

pub mod config;
pub mod error;
pub mod outbound;
pub mod socket;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::ConnectConfig;
pub use error::{Error, ProxyError, Result};
pub use outbound::{ChainProxy, ProxyChain};
pub use socket::{ChainSocket, SocketState};
pub use transport_tokio::{SocketOptions, TcpTransport, TransportSocket};
