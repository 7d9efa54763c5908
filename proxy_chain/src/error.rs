use crate::utils::SocketAddr;

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not resolve host {0}")]
    HostUnresolvable(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("unsupported address type")]
    UnsupportedAddressType,

    /// A hop answered its connect request with a failure. Never retried.
    #[error("proxy {proxy} failed to relay: {source}")]
    ProxyProtocol {
        proxy: SocketAddr,
        #[source]
        source: ProxyError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] json5::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True when a proxy explicitly refused the request, as opposed to the
    /// exchange breaking down.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::ProxyProtocol {
                source: ProxyError::Rejected(_),
                ..
            }
        )
    }
}

/// Failure of a single hop's connect request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
