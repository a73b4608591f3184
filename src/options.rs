use std::time::Duration;

use crate::compression::DeflateConfig;

/// The maximum TCP segment lifetime, RFC 793.
const TCP_MAXIMUM_SEGMENT_LIFETIME: Duration = Duration::from_secs(2 * 60);

/// Twice the maximum TCP segment lifetime.
const DEFAULT_CLOSING_TIMEOUT: Duration =
    Duration::from_secs(2 * TCP_MAXIMUM_SEGMENT_LIFETIME.as_secs());

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Receiving data that would grow the receive buffer beyond this fails the channel.
    pub max_receive_buffer: usize,
    /// How long to wait for the server to close the stream after the closing handshake started.
    pub closing_timeout: Duration,
    /// `None` disables `permessage-deflate`.
    pub deflate: Option<DeflateConfig>,
    /// Extra request headers, such as `Origin` or `User-Agent`.
    pub headers: Vec<(String, String)>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            max_receive_buffer: usize::MAX,
            closing_timeout: DEFAULT_CLOSING_TIMEOUT,
            deflate: Some(DeflateConfig::default()),
            headers: Vec::new(),
        }
    }
}

impl ChannelOptions {
    pub const fn max_receive_buffer(&self) -> usize {
        self.max_receive_buffer
    }

    pub const fn with_max_receive_buffer(mut self, max_receive_buffer: usize) -> Self {
        self.max_receive_buffer = max_receive_buffer;
        self
    }

    pub const fn closing_timeout(&self) -> Duration {
        self.closing_timeout
    }

    pub const fn with_closing_timeout(mut self, closing_timeout: Duration) -> Self {
        self.closing_timeout = closing_timeout;
        self
    }

    pub fn deflate(&self) -> Option<&DeflateConfig> {
        self.deflate.as_ref()
    }

    pub fn with_deflate(mut self, deflate: Option<DeflateConfig>) -> Self {
        self.deflate = deflate;
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
