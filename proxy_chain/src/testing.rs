//! Test doubles: a proxy that records what it is asked to do, an in-memory
//! transport and a table-driven resolver.

use crate::{error::ProxyError, outbound::ChainProxy, utils::Resolve, utils::SocketAddr};

use std::{
    collections::HashMap,
    io,
    net::IpAddr,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use async_trait::async_trait;
use transport_tokio::TransportSocket;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Dial(String),
    Request { via: String, target: String },
    Tunneled(String),
    Close,
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn dials(&self) -> usize {
        self.count(|e| matches!(e, Event::Dial(_)))
    }

    pub fn requests(&self) -> usize {
        self.count(|e| matches!(e, Event::Request { .. }))
    }

    pub fn last_request_target(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::Request { target, .. } => Some(target),
            _ => None,
        })
    }

    fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| f(e)).count()
    }
}

#[derive(Clone)]
enum Failure {
    Reject,
    RejectTarget(String),
    Io(io::ErrorKind),
}

#[derive(Clone)]
pub struct StubProxy {
    addr: SocketAddr,
    next: Option<Box<StubProxy>>,
    failure: Option<Failure>,
    negotiated: bool,
    log: EventLog,
}

impl StubProxy {
    pub fn new(addr: &str, log: &EventLog) -> Self {
        Self {
            addr: addr.parse().unwrap(),
            next: None,
            failure: None,
            negotiated: false,
            log: log.clone(),
        }
    }

    pub fn chain(mut self, next: StubProxy) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn reject(mut self) -> Self {
        self.failure = Some(Failure::Reject);
        self
    }

    /// Reject only requests for `target`.
    pub fn reject_target(mut self, target: &str) -> Self {
        self.failure = Some(Failure::RejectTarget(target.to_string()));
        self
    }

    pub fn fail_io(mut self, kind: io::ErrorKind) -> Self {
        self.failure = Some(Failure::Io(kind));
        self
    }
}

#[async_trait]
impl ChainProxy for StubProxy {
    fn addr(&self) -> &SocketAddr {
        &self.addr
    }

    fn chain_proxy(&self) -> Option<&dyn ChainProxy> {
        self.next.as_deref().map(|p| p as &dyn ChainProxy)
    }

    fn create_transport(&self) -> Box<dyn TransportSocket> {
        Box::new(StubTransport::new(&self.log))
    }

    fn mark_tunneled(&mut self) {
        self.log.push(Event::Tunneled(self.addr.to_string()));
    }

    async fn request_connect(
        &mut self,
        transport: &mut dyn TransportSocket,
        target: &SocketAddr,
    ) -> Result<(), ProxyError> {
        self.log.push(Event::Request {
            via: self.addr.to_string(),
            target: target.to_string(),
        });

        if self.negotiated {
            return Err(ProxyError::Malformed("hop negotiated twice".to_string()));
        }
        self.negotiated = true;
        if !transport.is_connected() {
            return Err(ProxyError::Io(io::ErrorKind::NotConnected.into()));
        }

        match &self.failure {
            None => Ok(()),
            Some(Failure::Reject) => Err(ProxyError::Rejected("general failure".to_string())),
            Some(Failure::RejectTarget(blocked)) if *blocked == target.to_string() => {
                Err(ProxyError::Rejected("not allowed".to_string()))
            }
            Some(Failure::RejectTarget(_)) => Ok(()),
            Some(Failure::Io(kind)) => Err(ProxyError::Io((*kind).into())),
        }
    }
}

pub struct StubTransport {
    connected: bool,
    closed: bool,
    refuse: bool,
    timeout: Option<Duration>,
    nodelay: bool,
    log: EventLog,
}

impl StubTransport {
    pub fn new(log: &EventLog) -> Self {
        Self {
            connected: false,
            closed: false,
            refuse: false,
            timeout: None,
            nodelay: false,
            log: log.clone(),
        }
    }

    pub fn connected(mut self) -> Self {
        self.connected = true;
        self
    }

    pub fn refuse_dial(mut self) -> Self {
        self.refuse = true;
        self
    }
}

#[async_trait]
impl TransportSocket for StubTransport {
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        if self.closed || self.refuse {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        self.log.push(Event::Dial(format!("{}:{}", host, port)));
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> io::Result<()> {
        self.log.push(Event::Close);
        self.connected = false;
        self.closed = true;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn nodelay(&self) -> io::Result<bool> {
        Ok(self.nodelay)
    }

    fn set_nodelay(&mut self, on: bool) -> io::Result<()> {
        self.nodelay = on;
        Ok(())
    }
}

impl AsyncRead for StubTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for StubTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[derive(Default)]
pub struct StubResolver {
    records: HashMap<String, Vec<IpAddr>>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, addrs: Vec<IpAddr>) -> Self {
        self.records.insert(host.to_string(), addrs);
        self
    }
}

#[async_trait]
impl Resolve for StubResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.records
            .get(host)
            .cloned()
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }
}
