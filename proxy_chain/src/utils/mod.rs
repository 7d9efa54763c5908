mod addr;
pub mod dns;

pub use addr::{HostName, SocketAddr};
pub use dns::{Resolve, SystemResolver};
