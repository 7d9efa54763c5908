use crate::Error;

use std::{io, net::IpAddr};

use async_trait::async_trait;
use log::debug;

/// Name lookup used by [`crate::ChainSocket`]. Returns every record for `host`.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system's resolver, through tokio's blocking pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

async fn lookup(resolver: &dyn Resolve, host: &str) -> Result<Vec<IpAddr>, Error> {
    match resolver.lookup(host).await {
        Ok(addrs) if !addrs.is_empty() => Ok(addrs),
        Ok(_) => Err(Error::HostUnresolvable(host.to_string())),
        Err(e) => {
            debug!("Lookup of {} failed: {}", host, e);
            Err(Error::HostUnresolvable(host.to_string()))
        }
    }
}

/// First IPv4 record for `host`, or the first record of any family when there
/// is none. Only an empty or failed lookup is an error.
pub async fn resolve_v4(resolver: &dyn Resolve, host: &str) -> Result<IpAddr, Error> {
    let addrs = lookup(resolver, host).await?;
    let first = addrs[0].to_canonical();
    Ok(addrs
        .into_iter()
        .map(|addr| addr.to_canonical())
        .find(IpAddr::is_ipv4)
        .unwrap_or(first))
}

/// [`resolve_v4`] for an address that is already resolved.
pub async fn resolve_addr_v4(resolver: &dyn Resolve, addr: IpAddr) -> Result<IpAddr, Error> {
    resolve_v4(resolver, &addr.to_string()).await
}

/// First record for `host`, whatever its family.
pub async fn resolve(resolver: &dyn Resolve, host: &str) -> Result<IpAddr, Error> {
    Ok(lookup(resolver, host).await?[0])
}
