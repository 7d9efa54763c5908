use crate::Error;

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use transport_tokio::SocketOptions;

/// Per-connection settings, usually read from a JSON5 file:
///
/// ```text
/// {
///     ipv4_only: true,
///     connect_timeout_ms: 5000,
///     socket: { nodelay: true, keepalive: true, linger_ms: 0 },
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub ipv4_only: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub socket: Option<SocketOptions>,
}

impl ConnectConfig {
    pub fn ipv4_only(&self) -> bool {
        self.ipv4_only.unwrap_or(false)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

impl FromStr for ConnectConfig {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(json5::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json5() {
        let config: ConnectConfig = r#"{
            // comments are fine
            ipv4_only: true,
            connect_timeout_ms: 2500,
            socket: { keepalive: true, send_buffer_size: 65536, linger_ms: 250 },
        }"#
        .parse()
        .unwrap();

        assert!(config.ipv4_only());
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(2500)));
        let socket = config.socket.unwrap();
        assert_eq!(socket.keepalive, Some(true));
        assert_eq!(socket.send_buffer_size, Some(65536));
        assert_eq!(socket.linger, Some(Duration::from_millis(250)));
        assert_eq!(socket.nodelay, None);
    }

    #[test]
    fn empty_object_is_all_defaults() {
        let config: ConnectConfig = "{}".parse().unwrap();
        assert_eq!(config, ConnectConfig::default());
        assert!(!config.ipv4_only());
    }

    #[test]
    fn bad_input_is_a_config_error() {
        assert!(matches!(
            "{ ipv4_only: 3 }".parse::<ConnectConfig>(),
            Err(Error::Config(_))
        ));
    }
}
