use std::time::Duration;

use encoding_rs::{Encoding, GBK};

use crate::errors::{GatewayError, Result};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Per-gateway settings, fixed when the client is built.
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub connect_timeout: Duration,
    /// Text encoding spoken by the gateway. Most legacy trading gateways use GBK.
    pub encoding: &'static Encoding,
    /// Capacity of each of the send and receive buffers.
    pub buffer_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            encoding: GBK,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl GatewayConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Zero is bumped to one byte so the receive drain can always make progress.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Looks up an encoding by its WHATWG label, e.g. `gbk`, `gb18030`, `utf-8`.
    pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
        Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| GatewayError::UnknownEncoding {
            label: label.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use encoding_rs::{GB18030, UTF_8};

    use super::*;

    #[test]
    fn defaults_match_gateway_conventions() {
        let config = GatewayConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_millis(1000));
        assert_eq!(config.encoding, GBK);
        assert_eq!(config.buffer_capacity, 4096);
    }

    #[test]
    fn builder_overrides() {
        let config = GatewayConfig::default()
            .with_connect_timeout(Duration::from_millis(250))
            .with_encoding(UTF_8)
            .with_buffer_capacity(0);

        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.encoding, UTF_8);
        assert_eq!(config.buffer_capacity, 1);
    }

    #[test]
    fn encoding_labels() {
        assert_eq!(GatewayConfig::encoding_for_label("GBK").unwrap(), GBK);
        assert_eq!(GatewayConfig::encoding_for_label(" gb18030 ").unwrap(), GB18030);
        assert_eq!(GatewayConfig::encoding_for_label("utf8").unwrap(), UTF_8);

        match GatewayConfig::encoding_for_label("klingon") {
            Err(GatewayError::UnknownEncoding { label }) => assert_eq!(label, "klingon"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
