use crate::TransportSocket;

use std::{io, time::Duration};

use serde::{Deserialize, Serialize};
use socket2::SockRef;

/// Socket options waiting to be applied. `None` leaves the system default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketOptions {
    pub nodelay: Option<bool>,
    pub keepalive: Option<bool>,
    /// SO_LINGER, written as `linger_ms` in configuration
    #[serde(default, rename = "linger_ms", with = "millis")]
    pub linger: Option<Duration>,
    pub out_of_band_inline: Option<bool>,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
    pub traffic_class: Option<u32>,
    pub reuse_address: Option<bool>,
}

impl SocketOptions {
    /// Push every option that is set onto `transport`.
    pub fn apply_to(&self, transport: &mut dyn TransportSocket) -> io::Result<()> {
        if let Some(on) = self.nodelay {
            transport.set_nodelay(on)?;
        }
        if let Some(on) = self.keepalive {
            transport.set_keepalive(on)?;
        }
        if self.linger.is_some() {
            transport.set_linger(self.linger)?;
        }
        if let Some(on) = self.out_of_band_inline {
            transport.set_out_of_band_inline(on)?;
        }
        if let Some(size) = self.send_buffer_size {
            transport.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            transport.set_recv_buffer_size(size)?;
        }
        if let Some(tos) = self.traffic_class {
            transport.set_traffic_class(tos)?;
        }
        if let Some(on) = self.reuse_address {
            transport.set_reuse_address(on)?;
        }
        Ok(())
    }

    /// Set the options on a socket that has not been connected yet.
    pub(crate) fn apply(&self, socket: &SockRef<'_>) -> io::Result<()> {
        if let Some(on) = self.nodelay {
            socket.set_nodelay(on)?;
        }
        if let Some(on) = self.keepalive {
            socket.set_keepalive(on)?;
        }
        if self.linger.is_some() {
            socket.set_linger(self.linger)?;
        }
        if let Some(on) = self.out_of_band_inline {
            socket.set_out_of_band_inline(on)?;
        }
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        if let Some(tos) = self.traffic_class {
            crate::tcp::set_traffic_class(socket, tos)?;
        }
        if let Some(on) = self.reuse_address {
            socket.set_reuse_address(on)?;
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
