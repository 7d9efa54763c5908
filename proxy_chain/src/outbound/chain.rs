use super::ChainProxy;
use crate::{utils::SocketAddr, Error, Result};

use log::{debug, warn};
use transport_tokio::TransportSocket;

/// Every hop from the head onwards, copied from the configured proxies.
///
/// All hops share one transport: the head is dialed, and each later hop is
/// negotiated through the tunnel the previous ones built.
pub struct ProxyChain {
    hops: Vec<Box<dyn ChainProxy>>,
}

impl ProxyChain {
    pub fn from_head(head: &dyn ChainProxy) -> Self {
        let mut hops = vec![dyn_clone::clone_box(head)];
        let mut next = head.chain_proxy();
        while let Some(proxy) = next {
            hops.push(dyn_clone::clone_box(proxy));
            next = proxy.chain_proxy();
        }
        debug!("Proxy chain has {} hop(s)", hops.len());

        Self { hops }
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Dial the head over `transport`, have each hop relay to the next one,
    /// and finally ask the last hop for `target`.
    ///
    /// Stops at the first failure and leaves `transport` as it is; closing it
    /// is up to the caller.
    pub async fn connect(
        &mut self,
        transport: &mut dyn TransportSocket,
        target: &SocketAddr,
    ) -> Result<()> {
        if transport.is_connected() {
            return Err(Error::InvalidState(
                "transport must be unconnected before dialing the chain head",
            ));
        }

        let (head, rest) = self
            .hops
            .split_first_mut()
            .ok_or(Error::InvalidState("proxy chain is empty"))?;

        if let Err(e) = head.build_connection(transport).await {
            warn!("Could not reach proxy {}: {}", head.addr(), e);
            return Err(e.into());
        }

        let mut previous = head;
        for current in rest.iter_mut() {
            request(previous.as_mut(), transport, current.addr()).await?;
            current.mark_tunneled();
            previous = current;
        }

        request(previous.as_mut(), transport, target).await
    }
}

async fn request(
    hop: &mut dyn ChainProxy,
    transport: &mut dyn TransportSocket,
    target: &SocketAddr,
) -> Result<()> {
    debug!("Asking {} to relay to {}", hop.addr(), target);
    match hop.request_connect(transport, target).await {
        Ok(()) => Ok(()),
        Err(source) => {
            warn!("Proxy {} did not relay to {}: {}", hop.addr(), target, source);
            Err(Error::ProxyProtocol {
                proxy: hop.addr().clone(),
                source,
            })
        }
    }
}
