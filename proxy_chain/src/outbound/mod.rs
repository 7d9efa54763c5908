mod chain;

pub use chain::ProxyChain;

use crate::{error::ProxyError, utils::SocketAddr};

use std::io;

use async_trait::async_trait;
use dyn_clone::DynClone;
use transport_tokio::{TcpTransport, TransportSocket};

/// One proxy server of a chain.
///
/// Implementations speak a proxy protocol over a transport they are lent for
/// every call; they never keep it. Cloning (through [`dyn_clone::clone_box`])
/// must give an independent proxy with the same configuration, since one
/// configured chain is used to open many connections.
#[async_trait]
pub trait ChainProxy: DynClone + Send + Sync + 'static {
    /// Where this proxy listens.
    fn addr(&self) -> &SocketAddr;

    /// The next proxy, reached by asking this one to relay.
    fn chain_proxy(&self) -> Option<&dyn ChainProxy> {
        None
    }

    fn create_transport(&self) -> Box<dyn TransportSocket> {
        Box::new(TcpTransport::new())
    }

    /// Open the TCP connection to this proxy. Only called on the chain head.
    async fn build_connection(&mut self, transport: &mut dyn TransportSocket) -> io::Result<()> {
        let addr = self.addr();
        transport.connect(&addr.hostname.to_string(), addr.port).await
    }

    /// Called on every hop after the previous hop has relayed to it.
    fn mark_tunneled(&mut self) {}

    /// Ask this proxy to relay the connection to `target`. Resolves once the
    /// proxy has answered.
    async fn request_connect(
        &mut self,
        transport: &mut dyn TransportSocket,
        target: &SocketAddr,
    ) -> Result<(), ProxyError>;
}

dyn_clone::clone_trait_object!(ChainProxy);
