use crate::{SocketOptions, TransportSocket};

use std::{
    io::{self, Error, ErrorKind},
    net::{Shutdown, SocketAddr},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{lookup_host, TcpSocket, TcpStream},
};

use async_trait::async_trait;
use cfg_if::cfg_if;
use log::debug;
use socket2::SockRef;

enum State {
    /// Not dialed yet. Options are kept in `TcpTransport::options`.
    Idle,
    Connected(TcpStream),
    Closed,
}

/// TCP transport built on tokio.
///
/// Options set before [`TransportSocket::connect`] are remembered and applied
/// to the socket right before it dials; afterwards they go straight to the
/// kernel.
pub struct TcpTransport {
    state: State,
    options: SocketOptions,
    bind_addr: Option<SocketAddr>,
    timeout: Option<Duration>,
    input_shutdown: bool,
    output_shutdown: bool,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::with_options(SocketOptions {
            nodelay: Some(true),
            ..Default::default()
        })
    }

    pub fn with_options(options: SocketOptions) -> Self {
        Self {
            state: State::Idle,
            options,
            bind_addr: None,
            timeout: None,
            input_shutdown: false,
            output_shutdown: false,
        }
    }

    /// The connected stream, or `None` while still idle.
    fn stream(&self) -> io::Result<Option<&TcpStream>> {
        match &self.state {
            State::Idle => Ok(None),
            State::Connected(stream) => Ok(Some(stream)),
            State::Closed => Err(closed()),
        }
    }

    fn connected_stream(&self) -> io::Result<&TcpStream> {
        self.stream()?
            .ok_or_else(|| ErrorKind::NotConnected.into())
    }

    async fn dial(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in lookup_host((host, port)).await? {
            if let Some(bind) = self.bind_addr {
                if bind.is_ipv4() != addr.is_ipv4() {
                    continue;
                }
            }

            match self.dial_one(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Dial {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("no usable address for {}:{}", host, port),
            )
        }))
    }

    async fn dial_one(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };

        self.options.apply(&SockRef::from(&socket))?;
        if let Some(bind) = self.bind_addr {
            socket.bind(bind)?;
        }

        socket.connect(addr).await
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportSocket for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        match self.state {
            State::Idle => {}
            State::Connected(_) => {
                return Err(Error::new(
                    ErrorKind::AlreadyExists,
                    "transport is already connected",
                ))
            }
            State::Closed => return Err(closed()),
        }

        let stream = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.dial(host, port))
                .await
                .map_err(|_| Error::new(ErrorKind::TimedOut, "connect timed out"))??,
            None => self.dial(host, port).await?,
        };
        debug!("Transport connected to {}:{}", host, port);

        self.state = State::Connected(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the stream closes the descriptor
        self.state = State::Closed;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn is_bound(&self) -> bool {
        self.bind_addr.is_some() || self.is_connected()
    }

    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        match self.state {
            State::Idle => {
                self.bind_addr = Some(addr);
                Ok(())
            }
            State::Connected(_) => Err(Error::new(
                ErrorKind::AlreadyExists,
                "transport is already bound",
            )),
            State::Closed => Err(closed()),
        }
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.connected_stream()?.peer_addr()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.connected_stream()?.local_addr()
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        SockRef::from(self.connected_stream()?).shutdown(Shutdown::Read)?;
        self.input_shutdown = true;
        Ok(())
    }

    fn shutdown_output(&mut self) -> io::Result<()> {
        SockRef::from(self.connected_stream()?).shutdown(Shutdown::Write)?;
        self.output_shutdown = true;
        Ok(())
    }

    fn is_input_shutdown(&self) -> bool {
        self.input_shutdown
    }

    fn is_output_shutdown(&self) -> bool {
        self.output_shutdown
    }

    fn nodelay(&self) -> io::Result<bool> {
        match self.stream()? {
            Some(stream) => stream.nodelay(),
            None => Ok(self.options.nodelay.unwrap_or_default()),
        }
    }

    fn set_nodelay(&mut self, on: bool) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return stream.set_nodelay(on);
        }
        self.options.nodelay = Some(on);
        Ok(())
    }

    fn keepalive(&self) -> io::Result<bool> {
        match self.stream()? {
            Some(stream) => SockRef::from(stream).keepalive(),
            None => Ok(self.options.keepalive.unwrap_or_default()),
        }
    }

    fn set_keepalive(&mut self, on: bool) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return SockRef::from(stream).set_keepalive(on);
        }
        self.options.keepalive = Some(on);
        Ok(())
    }

    fn linger(&self) -> io::Result<Option<Duration>> {
        match self.stream()? {
            Some(stream) => SockRef::from(stream).linger(),
            None => Ok(self.options.linger),
        }
    }

    fn set_linger(&mut self, linger: Option<Duration>) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return SockRef::from(stream).set_linger(linger);
        }
        self.options.linger = linger;
        Ok(())
    }

    fn out_of_band_inline(&self) -> io::Result<bool> {
        match self.stream()? {
            Some(stream) => SockRef::from(stream).out_of_band_inline(),
            None => Ok(self.options.out_of_band_inline.unwrap_or_default()),
        }
    }

    fn set_out_of_band_inline(&mut self, on: bool) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return SockRef::from(stream).set_out_of_band_inline(on);
        }
        self.options.out_of_band_inline = Some(on);
        Ok(())
    }

    fn send_urgent_data(&mut self, data: u8) -> io::Result<()> {
        SockRef::from(self.connected_stream()?).send_out_of_band(&[data])?;
        Ok(())
    }

    fn send_buffer_size(&self) -> io::Result<usize> {
        match self.stream()? {
            Some(stream) => SockRef::from(stream).send_buffer_size(),
            None => Ok(self.options.send_buffer_size.unwrap_or_default()),
        }
    }

    fn set_send_buffer_size(&mut self, size: usize) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return SockRef::from(stream).set_send_buffer_size(size);
        }
        self.options.send_buffer_size = Some(size);
        Ok(())
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        match self.stream()? {
            Some(stream) => SockRef::from(stream).recv_buffer_size(),
            None => Ok(self.options.recv_buffer_size.unwrap_or_default()),
        }
    }

    fn set_recv_buffer_size(&mut self, size: usize) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return SockRef::from(stream).set_recv_buffer_size(size);
        }
        self.options.recv_buffer_size = Some(size);
        Ok(())
    }

    fn traffic_class(&self) -> io::Result<u32> {
        match self.stream()? {
            Some(stream) => traffic_class(&SockRef::from(stream)),
            None => Ok(self.options.traffic_class.unwrap_or_default()),
        }
    }

    fn set_traffic_class(&mut self, tos: u32) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return set_traffic_class(&SockRef::from(stream), tos);
        }
        self.options.traffic_class = Some(tos);
        Ok(())
    }

    fn reuse_address(&self) -> io::Result<bool> {
        match self.stream()? {
            Some(stream) => SockRef::from(stream).reuse_address(),
            None => Ok(self.options.reuse_address.unwrap_or_default()),
        }
    }

    fn set_reuse_address(&mut self, on: bool) -> io::Result<()> {
        if let Some(stream) = self.stream()? {
            return SockRef::from(stream).set_reuse_address(on);
        }
        self.options.reuse_address = Some(on);
        Ok(())
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.state {
            State::Connected(stream) => Pin::new(stream).poll_read(cx, buf),
            State::Idle => Poll::Ready(Err(ErrorKind::NotConnected.into())),
            State::Closed => Poll::Ready(Err(closed())),
        }
    }
}

impl AsyncWrite for TcpTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.state {
            State::Connected(stream) => Pin::new(stream).poll_write(cx, buf),
            State::Idle => Poll::Ready(Err(ErrorKind::NotConnected.into())),
            State::Closed => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.state {
            State::Connected(stream) => Pin::new(stream).poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.state {
            State::Connected(stream) => Pin::new(stream).poll_shutdown(cx),
            _ => Poll::Ready(Ok(())),
        }
    }
}

fn closed() -> Error {
    Error::new(ErrorKind::NotConnected, "transport is closed")
}

cfg_if! {
    if #[cfg(not(any(
        target_os = "fuchsia",
        target_os = "redox",
        target_os = "solaris",
        target_os = "illumos"
    )))] {
        pub(crate) fn traffic_class(socket: &SockRef<'_>) -> io::Result<u32> {
            socket.tos()
        }

        pub(crate) fn set_traffic_class(socket: &SockRef<'_>, tos: u32) -> io::Result<()> {
            socket.set_tos(tos)
        }
    } else {
        pub(crate) fn traffic_class(_socket: &SockRef<'_>) -> io::Result<u32> {
            Err(Error::new(
                ErrorKind::Unsupported,
                "IP_TOS is not supported on this platform",
            ))
        }

        pub(crate) fn set_traffic_class(_socket: &SockRef<'_>, _tos: u32) -> io::Result<()> {
            Err(Error::new(
                ErrorKind::Unsupported,
                "IP_TOS is not supported on this platform",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    #[test]
    fn idle_transport_remembers_options() {
        let mut transport = TcpTransport::new();
        transport.set_recv_buffer_size(32 * 1024).unwrap();
        transport.set_reuse_address(true).unwrap();
        transport.set_linger(None).unwrap();

        assert!(!transport.is_connected());
        assert!(!transport.is_bound());
        assert_eq!(transport.recv_buffer_size().unwrap(), 32 * 1024);
        assert!(transport.reuse_address().unwrap());
        assert_eq!(transport.linger().unwrap(), None);
        assert_eq!(
            transport.peer_addr().unwrap_err().kind(),
            ErrorKind::NotConnected
        );
    }

    #[tokio::test]
    async fn connects_and_carries_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0; 4];
            conn.read_exact(&mut buf).await.unwrap();
            conn.write_all(&buf).await.unwrap();
        });

        let mut transport = TcpTransport::new();
        transport.set_keepalive(true).unwrap();
        transport.connect("127.0.0.1", addr.port()).await.unwrap();

        assert!(transport.is_connected());
        assert!(transport.is_bound());
        assert_eq!(transport.peer_addr().unwrap(), addr);
        assert!(transport.nodelay().unwrap());
        assert!(transport.keepalive().unwrap());

        transport.write_all(b"ping").await.unwrap();
        let mut buf = [0; 4];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.await.unwrap();

        transport.close().unwrap();
        assert!(transport.is_closed());
        assert!(!transport.is_connected());
        assert!(transport.nodelay().is_err());
    }

    #[test]
    fn idle_linger_keeps_sub_second_precision() {
        let mut transport = TcpTransport::new();
        transport.set_linger(Some(Duration::from_millis(500))).unwrap();
        assert_eq!(transport.linger().unwrap(), Some(Duration::from_millis(500)));

        transport.set_linger(Some(Duration::from_millis(1500))).unwrap();
        assert_eq!(transport.linger().unwrap(), Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn second_connect_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", port).await.unwrap();
        let err = transport.connect("127.0.0.1", port).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn closed_transport_can_not_dial() {
        let mut transport = TcpTransport::new();
        transport.close().unwrap();
        assert!(transport.connect("127.0.0.1", 9).await.is_err());
    }
}
