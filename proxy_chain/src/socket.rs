use crate::{
    config::ConnectConfig,
    outbound::{ChainProxy, ProxyChain},
    utils::{
        dns::{resolve, resolve_addr_v4, resolve_v4},
        HostName, Resolve, SocketAddr, SystemResolver,
    },
    Error, Result,
};

use std::{
    io,
    net::IpAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use log::debug;
use socket2::SockAddr;
use transport_tokio::{SocketOptions, TransportSocket};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketState {
    /// No destination yet
    Unbound,
    Connected,
    Closed,
}

/// A TCP connection made through a chain of proxies, usable like a plain
/// socket.
///
/// ```no_run
/// # async fn run(proxy: &dyn proxy_chain::ChainProxy) -> proxy_chain::Result<()> {
/// use proxy_chain::ChainSocket;
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// let mut socket = ChainSocket::connect_host(proxy, "whois.internic.net", 43, false).await?;
/// socket.write_all(b"example.org\r\n").await?;
/// let mut answer = String::new();
/// socket.read_to_string(&mut answer).await?;
/// # Ok(())
/// # }
/// ```
///
/// Every transport operation goes to the transport held at the time of the
/// call, which is replaced on each (re)connect. Without a transport, option
/// getters return zero or `false` and setters do nothing.
pub struct ChainSocket {
    proxy: Box<dyn ChainProxy>,
    transport: Option<Box<dyn TransportSocket>>,
    destination: Option<SocketAddr>,
    state: SocketState,
    ipv4_only: bool,
    resolver: Arc<dyn Resolve>,
    /// Applied to every transport this socket creates
    timeout: Option<Duration>,
    options: SocketOptions,
}

impl ChainSocket {
    /// An unbound socket; call [`ChainSocket::connect`] later.
    pub fn new(proxy: &dyn ChainProxy, ipv4_only: bool) -> Self {
        let transport = proxy.create_transport();
        Self::adopt(proxy, transport, ipv4_only)
    }

    /// An unbound socket that will dial the chain head over `transport`.
    pub fn from_transport(
        proxy: &dyn ChainProxy,
        transport: Box<dyn TransportSocket>,
        ipv4_only: bool,
    ) -> Result<Self> {
        if transport.is_connected() {
            return Err(Error::InvalidState("transport should be unconnected"));
        }
        Ok(Self::adopt(proxy, transport, ipv4_only))
    }

    /// An unbound socket with options, timeout and address family preference
    /// taken from `config`.
    pub fn from_config(proxy: &dyn ChainProxy, config: &ConnectConfig) -> Result<Self> {
        let mut socket = Self::new(proxy, config.ipv4_only());
        socket.timeout = config.connect_timeout();
        socket.options = config.socket.clone().unwrap_or_default();
        if let Some(transport) = socket.transport.as_deref_mut() {
            configure(transport, socket.timeout, &socket.options)?;
        }
        Ok(socket)
    }

    pub async fn connect_host(
        proxy: &dyn ChainProxy,
        host: &str,
        port: u16,
        ipv4_only: bool,
    ) -> Result<Self> {
        let mut socket = Self::new(proxy, ipv4_only);
        socket.connect(host, port).await?;
        Ok(socket)
    }

    pub async fn connect_endpoint(
        proxy: &dyn ChainProxy,
        endpoint: &SockAddr,
        ipv4_only: bool,
    ) -> Result<Self> {
        let mut socket = Self::new(proxy, ipv4_only);
        socket.connect_addr(endpoint, None).await?;
        Ok(socket)
    }

    fn adopt(proxy: &dyn ChainProxy, transport: Box<dyn TransportSocket>, ipv4_only: bool) -> Self {
        Self {
            proxy: dyn_clone::clone_box(proxy),
            transport: Some(transport),
            destination: None,
            state: SocketState::Unbound,
            ipv4_only,
            resolver: Arc::new(SystemResolver),
            timeout: None,
            options: SocketOptions::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Connect to `host:port` through the chain. `host` may be a bracketed
    /// IPv6 literal.
    ///
    /// A failed attempt leaves the state as it was when the chain was
    /// dialed: `Unbound`, since a reconnect closes the previous connection
    /// first. If the head was reached, call [`ChainSocket::close`] before
    /// trying again.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let mut hostname: HostName = host.parse()?;
        if self.ipv4_only {
            hostname = match hostname {
                HostName::V4(v4) => resolve_addr_v4(&*self.resolver, v4.into()).await?.into(),
                HostName::V6(v6) => resolve_addr_v4(&*self.resolver, v6.into()).await?.into(),
                HostName::Domain(domain) => resolve_v4(&*self.resolver, &domain).await?.into(),
            };
        }
        self.establish(SocketAddr::new(hostname, port), None).await
    }

    /// Connect to an IP endpoint through the chain. `timeout` bounds the dial
    /// to the chain head; the handshakes after it are not bounded.
    pub async fn connect_addr(
        &mut self,
        endpoint: &SockAddr,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut addr = endpoint.as_socket().ok_or(Error::UnsupportedAddressType)?;
        if self.ipv4_only {
            addr.set_ip(resolve_addr_v4(&*self.resolver, addr.ip()).await?);
        }
        self.establish(addr.into(), Some(timeout)).await
    }

    async fn establish(
        &mut self,
        destination: SocketAddr,
        timeout: Option<Option<Duration>>,
    ) -> Result<()> {
        let mut chain = ProxyChain::from_head(&*self.proxy);
        self.prepare_transport()?;
        self.destination = Some(destination.clone());

        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(Error::InvalidState("no transport"))?;
        if let Some(timeout) = timeout {
            transport.set_timeout(timeout);
        }
        chain.connect(transport, &destination).await?;

        debug!("Connected to {} through {} proxies", destination, chain.len());
        self.state = SocketState::Connected;
        Ok(())
    }

    /// Make sure an unconnected transport is ready for the chain head,
    /// replacing a used one.
    fn prepare_transport(&mut self) -> Result<()> {
        match self.state {
            SocketState::Connected => {
                self.state = SocketState::Unbound;
                if let Some(mut old) = self.transport.take() {
                    old.close()?;
                }
            }
            _ => {
                if self.transport.as_ref().is_some_and(|t| t.is_connected()) {
                    return Err(Error::InvalidState(
                        "an earlier connect attempt failed, close the socket before retrying",
                    ));
                }
            }
        }

        if self.transport.as_ref().map_or(true, |t| t.is_closed()) {
            let mut transport = self.proxy.create_transport();
            configure(&mut *transport, self.timeout, &self.options)?;
            self.transport = Some(transport);
        }
        Ok(())
    }

    /// Close the transport. Closing twice is fine.
    pub fn close(&mut self) -> io::Result<()> {
        self.state = SocketState::Closed;
        if let Some(mut transport) = self.transport.take() {
            transport.close()?;
        }
        Ok(())
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn proxy(&self) -> &dyn ChainProxy {
        &*self.proxy
    }

    pub fn is_ipv4_only(&self) -> bool {
        self.ipv4_only
    }

    pub fn destination(&self) -> Option<&SocketAddr> {
        self.destination.as_ref()
    }

    /// Destination port, 0 before the first connect.
    pub fn port(&self) -> u16 {
        self.destination.as_ref().map_or(0, |d| d.port)
    }

    /// Destination address, resolved on every call. `None` when it is not
    /// known or does not resolve.
    pub async fn peer_ip(&self) -> Option<IpAddr> {
        let destination = self.destination.as_ref()?;
        match &destination.hostname {
            HostName::V4(v4) => Some((*v4).into()),
            HostName::V6(v6) => Some((*v6).into()),
            HostName::Domain(domain) => resolve(&*self.resolver, domain).await.ok(),
        }
    }

    pub fn transport(&self) -> Option<&dyn TransportSocket> {
        self.transport.as_deref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut dyn TransportSocket> {
        match self.transport.as_deref_mut() {
            Some(transport) => Some(transport),
            None => None,
        }
    }

    fn get<T: Default>(
        &self,
        f: impl FnOnce(&dyn TransportSocket) -> io::Result<T>,
    ) -> io::Result<T> {
        match self.transport.as_deref() {
            Some(transport) => f(transport),
            None => Ok(T::default()),
        }
    }

    fn set(
        &mut self,
        f: impl FnOnce(&mut dyn TransportSocket) -> io::Result<()>,
    ) -> io::Result<()> {
        match self.transport.as_deref_mut() {
            Some(transport) => f(transport),
            None => Ok(()),
        }
    }

    pub fn bind(&mut self, addr: std::net::SocketAddr) -> io::Result<()> {
        self.set(|t| t.bind(addr))
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.transport.as_ref()?.local_addr().ok()
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }

    /// Address of the chain head this socket is connected to.
    pub fn remote_addr(&self) -> Option<std::net::SocketAddr> {
        self.transport.as_ref()?.peer_addr().ok()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    pub fn is_bound(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_bound())
    }

    pub fn is_closed(&self) -> bool {
        self.transport.as_ref().map_or(true, |t| t.is_closed())
    }

    pub fn is_input_shutdown(&self) -> bool {
        self.transport.as_ref().map_or(true, |t| t.is_input_shutdown())
    }

    pub fn is_output_shutdown(&self) -> bool {
        self.transport.as_ref().map_or(true, |t| t.is_output_shutdown())
    }

    pub fn shutdown_input(&mut self) -> io::Result<()> {
        self.set(|t| t.shutdown_input())
    }

    pub fn shutdown_output(&mut self) -> io::Result<()> {
        self.set(|t| t.shutdown_output())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.transport.as_ref().and_then(|t| t.timeout())
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        if let Some(transport) = self.transport.as_mut() {
            transport.set_timeout(timeout);
        }
    }

    pub fn nodelay(&self) -> io::Result<bool> {
        self.get(|t| t.nodelay())
    }

    pub fn set_nodelay(&mut self, on: bool) -> io::Result<()> {
        self.set(|t| t.set_nodelay(on))
    }

    pub fn keepalive(&self) -> io::Result<bool> {
        self.get(|t| t.keepalive())
    }

    pub fn set_keepalive(&mut self, on: bool) -> io::Result<()> {
        self.set(|t| t.set_keepalive(on))
    }

    pub fn linger(&self) -> io::Result<Option<Duration>> {
        self.get(|t| t.linger())
    }

    pub fn set_linger(&mut self, linger: Option<Duration>) -> io::Result<()> {
        self.set(|t| t.set_linger(linger))
    }

    pub fn out_of_band_inline(&self) -> io::Result<bool> {
        self.get(|t| t.out_of_band_inline())
    }

    pub fn set_out_of_band_inline(&mut self, on: bool) -> io::Result<()> {
        self.set(|t| t.set_out_of_band_inline(on))
    }

    pub fn send_urgent_data(&mut self, data: u8) -> io::Result<()> {
        self.set(|t| t.send_urgent_data(data))
    }

    pub fn send_buffer_size(&self) -> io::Result<usize> {
        self.get(|t| t.send_buffer_size())
    }

    pub fn set_send_buffer_size(&mut self, size: usize) -> io::Result<()> {
        self.set(|t| t.set_send_buffer_size(size))
    }

    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        self.get(|t| t.recv_buffer_size())
    }

    pub fn set_recv_buffer_size(&mut self, size: usize) -> io::Result<()> {
        self.set(|t| t.set_recv_buffer_size(size))
    }

    pub fn traffic_class(&self) -> io::Result<u32> {
        self.get(|t| t.traffic_class())
    }

    pub fn set_traffic_class(&mut self, tos: u32) -> io::Result<()> {
        self.set(|t| t.set_traffic_class(tos))
    }

    pub fn reuse_address(&self) -> io::Result<bool> {
        self.get(|t| t.reuse_address())
    }

    pub fn set_reuse_address(&mut self, on: bool) -> io::Result<()> {
        self.set(|t| t.set_reuse_address(on))
    }
}

fn configure(
    transport: &mut dyn TransportSocket,
    timeout: Option<Duration>,
    options: &SocketOptions,
) -> io::Result<()> {
    if timeout.is_some() {
        transport.set_timeout(timeout);
    }
    options.apply_to(transport)
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket has no transport")
}

impl AsyncRead for ChainSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_read(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for ChainSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_flush(cx),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
