//! # Transport sockets for proxied TCP connections
//! A transport socket is the raw byte stream a proxy chain is negotiated over.
//! It starts unconnected, is dialed to the first proxy, and then carries every
//! hop's handshake followed by the destination's application data.

mod options;
mod tcp;

pub use options::SocketOptions;
pub use tcp::TcpTransport;

use std::{io, net::SocketAddr, time::Duration};
use tokio::io::{AsyncRead, AsyncWrite};

use async_trait::async_trait;

pub trait Stream: AsyncRead + AsyncWrite {}
impl<RW> Stream for RW where RW: AsyncRead + AsyncWrite {}

/// A byte stream socket that can be dialed once and then read, written and tuned.
///
/// Option accessors have defaults so that transports without socket-level
/// options (in-memory pipes, test doubles) only implement the lifecycle.
#[async_trait]
pub trait TransportSocket: Stream + Unpin + Send + Sync {
    /// Dial `host:port`, bounded by [`TransportSocket::timeout`] when one is set.
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn close(&mut self) -> io::Result<()>;

    /// Timeout applied to the dial.
    fn timeout(&self) -> Option<Duration>;

    fn set_timeout(&mut self, timeout: Option<Duration>);

    fn is_bound(&self) -> bool {
        self.is_connected()
    }

    fn bind(&mut self, _addr: SocketAddr) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transport can not be bound",
        ))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn shutdown_output(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_input_shutdown(&self) -> bool {
        false
    }

    fn is_output_shutdown(&self) -> bool {
        false
    }

    fn nodelay(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn set_nodelay(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }

    fn keepalive(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn set_keepalive(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }

    fn linger(&self) -> io::Result<Option<Duration>> {
        Ok(None)
    }

    fn set_linger(&mut self, _linger: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn out_of_band_inline(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn set_out_of_band_inline(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }

    /// Send one byte of TCP urgent data.
    fn send_urgent_data(&mut self, _data: u8) -> io::Result<()> {
        Ok(())
    }

    fn send_buffer_size(&self) -> io::Result<usize> {
        Ok(0)
    }

    fn set_send_buffer_size(&mut self, _size: usize) -> io::Result<()> {
        Ok(())
    }

    fn recv_buffer_size(&self) -> io::Result<usize> {
        Ok(0)
    }

    fn set_recv_buffer_size(&mut self, _size: usize) -> io::Result<()> {
        Ok(())
    }

    /// IP type-of-service byte.
    fn traffic_class(&self) -> io::Result<u32> {
        Ok(0)
    }

    fn set_traffic_class(&mut self, _tos: u32) -> io::Result<()> {
        Ok(())
    }

    fn reuse_address(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn set_reuse_address(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }
}
