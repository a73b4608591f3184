//! The opening handshake of a client connection (RFC 6455 section 4.1).

use base64::{Engine as _, engine::general_purpose};
use httparse::{Header, Status};
use rand_core::RngCore;
use sha1::{Digest, Sha1};

use crate::{
    compression::{DeflateConfig, DeflateParams},
    error::HandshakeError,
};

const ACCEPT_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The max number of response headers to allocate space for.
const MAX_HEADERS: usize = 64;

/// A parsed `ws://` or `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketUrl {
    raw: String,
    host: String,
    port: u16,
    /// Path and query, never empty.
    resource: String,
    secure: bool,
}

impl WebSocketUrl {
    pub fn parse(url: &str) -> Result<Self, HandshakeError> {
        let invalid = |reason: &str| HandshakeError::InvalidUrl(format!("{url}: {reason}"));

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;

        let secure = if scheme.eq_ignore_ascii_case("ws") {
            false
        } else if scheme.eq_ignore_ascii_case("wss") {
            true
        } else {
            return Err(invalid("scheme must be 'ws' or 'wss'"));
        };

        if rest.contains('#') {
            return Err(invalid("URL has fragment component"));
        }

        let (authority, resource) = match rest.find(['/', '?']) {
            Some(index) if rest.as_bytes()[index] == b'?' => {
                (&rest[..index], format!("/{}", &rest[index..]))
            }
            Some(index) => (&rest[..index], rest[index..].to_string()),
            None => (rest, String::from("/")),
        };

        let default_port = if secure { 443 } else { 80 };

        let (host, port) = if let Some(after_bracket) = authority.strip_prefix('[') {
            let (host, after) = after_bracket
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;

            let port = match after.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid("invalid port"))?,
                None if after.is_empty() => default_port,
                None => return Err(invalid("invalid authority")),
            };

            (format!("[{host}]"), port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (
                    host.to_string(),
                    port.parse().map_err(|_| invalid("invalid port"))?,
                ),
                None => (authority.to_string(), default_port),
            }
        };

        if host.is_empty() || host == "[]" {
            return Err(invalid("empty host"));
        }

        Ok(Self {
            raw: url.to_string(),
            host,
            port,
            resource,
            secure,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// The `Host` header value, with the port only when it is not the default.
    pub fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };

        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    Incomplete,
    Connected,
    Failed,
}

/// Builds the client request and validates the server response.
#[derive(Debug)]
pub struct Handshake {
    url: WebSocketUrl,
    /// Requested subprotocols, in request order.
    protocols: Vec<String>,
    sec_key: String,
    deflate: Option<DeflateConfig>,
    headers: Vec<(String, String)>,
    mode: HandshakeMode,
    failure: Option<HandshakeError>,
    server_protocol: String,
    accepted_extensions: String,
    set_cookie: Option<String>,
    set_cookie2: Option<String>,
    negotiated_deflate: Option<DeflateParams>,
}

impl Handshake {
    /// `protocol` is the comma separated list of requested subprotocols, possibly empty.
    pub fn new<R: RngCore>(url: WebSocketUrl, protocol: &str, rng: &mut R) -> Self {
        let protocols = protocol
            .split(',')
            .map(str::trim)
            .filter(|protocol| !protocol.is_empty())
            .map(String::from)
            .collect();

        Self {
            url,
            protocols,
            sec_key: generate_sec_key(rng),
            deflate: None,
            headers: Vec::new(),
            mode: HandshakeMode::Incomplete,
            failure: None,
            server_protocol: String::new(),
            accepted_extensions: String::new(),
            set_cookie: None,
            set_cookie2: None,
            negotiated_deflate: None,
        }
    }

    /// Offers `permessage-deflate` in the request and checks the server's answer to it.
    pub fn add_deflate_offer(&mut self, config: DeflateConfig) {
        self.deflate = Some(config);
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn url(&self) -> &WebSocketUrl {
        &self.url
    }

    pub fn sec_key(&self) -> &str {
        &self.sec_key
    }

    /// The opening request.
    pub fn client_request(&self) -> Vec<u8> {
        let mut request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n",
            self.url.resource(),
            self.url.host_header(),
            self.sec_key,
        );

        if !self.protocols.is_empty() {
            request.push_str(&format!(
                "Sec-WebSocket-Protocol: {}\r\n",
                self.protocols.join(", ")
            ));
        }

        if let Some(deflate) = &self.deflate {
            request.push_str(&format!("Sec-WebSocket-Extensions: {}\r\n", deflate.offer()));
        }

        for (name, value) in &self.headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }

        request.push_str("\r\n");

        request.into_bytes()
    }

    /// Reads the server response from the start of `buf`.
    ///
    /// Returns 0 while the header block is incomplete. Otherwise returns the number of bytes
    /// the response occupies and moves to [`HandshakeMode::Connected`] or
    /// [`HandshakeMode::Failed`]. Bytes after the header block are frames and are not
    /// consumed.
    pub fn read_server_handshake(&mut self, buf: &[u8]) -> usize {
        if self.mode != HandshakeMode::Incomplete {
            return 0;
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        let consumed = match response.parse(buf) {
            Ok(Status::Partial) => return 0,
            Ok(Status::Complete(len)) => len,
            Err(err) => {
                self.set_failed(HandshakeError::Http(err));
                return buf.len();
            }
        };

        match self.check_response(response.code, response.headers) {
            Ok(()) => {
                tracing::debug!(url = self.url.as_str(), protocol = %self.server_protocol, extensions = %self.accepted_extensions, "Handshake completed");

                self.mode = HandshakeMode::Connected;
            }
            Err(err) => self.set_failed(err),
        }

        consumed
    }

    fn set_failed(&mut self, error: HandshakeError) {
        tracing::debug!(url = self.url.as_str(), %error, "Handshake failed");

        self.mode = HandshakeMode::Failed;
        self.failure = Some(error);
    }

    fn check_response(
        &mut self,
        code: Option<u16>,
        headers: &[Header<'_>],
    ) -> Result<(), HandshakeError> {
        if code != Some(101) {
            return Err(HandshakeError::InvalidStatusCode(code));
        }

        let upgrade = header_value_str(headers, "upgrade").ok_or(HandshakeError::MissingUpgrade)?;

        if !upgrade.trim().eq_ignore_ascii_case("websocket") {
            return Err(HandshakeError::InvalidUpgrade);
        }

        let connection =
            header_value_str(headers, "connection").ok_or(HandshakeError::MissingConnection)?;

        if !connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        {
            return Err(HandshakeError::InvalidConnection);
        }

        let accept = header_value_str(headers, "sec-websocket-accept")
            .ok_or(HandshakeError::MissingAccept)?;

        if accept.trim() != generate_sec_accept(self.sec_key.as_bytes()) {
            return Err(HandshakeError::InvalidAccept);
        }

        if let Some(protocol) = header_value_str(headers, "sec-websocket-protocol") {
            let protocol = protocol.trim();

            if !self.protocols.iter().any(|sent| sent == protocol) {
                return Err(HandshakeError::UnexpectedProtocol(protocol.to_string()));
            }

            self.server_protocol = protocol.to_string();
        }

        let extensions = joined_header_values(headers, "sec-websocket-extensions");

        match &self.deflate {
            Some(deflate) => {
                self.negotiated_deflate = deflate.negotiate(extensions.as_deref())?;
            }
            None if extensions.is_some() => {
                return Err(HandshakeError::Extension(
                    crate::error::CompressionError::InvalidExtension(String::from(
                        "Received extension response without any request",
                    )),
                ));
            }
            None => {}
        }

        self.accepted_extensions = extensions.unwrap_or_default();
        self.set_cookie = header_value_str(headers, "set-cookie").map(String::from);
        self.set_cookie2 = header_value_str(headers, "set-cookie2").map(String::from);

        Ok(())
    }

    pub const fn mode(&self) -> HandshakeMode {
        self.mode
    }

    pub fn failure_reason(&self) -> Option<&HandshakeError> {
        self.failure.as_ref()
    }

    /// The subprotocol the server selected, empty if none.
    pub fn server_protocol(&self) -> &str {
        &self.server_protocol
    }

    /// The `Sec-WebSocket-Extensions` the server accepted, empty if none.
    pub fn accepted_extensions(&self) -> &str {
        &self.accepted_extensions
    }

    pub fn server_set_cookie(&self) -> Option<&str> {
        self.set_cookie.as_deref()
    }

    pub fn server_set_cookie2(&self) -> Option<&str> {
        self.set_cookie2.as_deref()
    }

    pub const fn negotiated_deflate(&self) -> Option<DeflateParams> {
        self.negotiated_deflate
    }
}

fn header_value_str<'buf>(headers: &[Header<'buf>], name: &str) -> Option<&'buf str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .and_then(|header| core::str::from_utf8(header.value).ok())
}

/// Every value of a repeatable header, comma joined.
fn joined_header_values(headers: &[Header<'_>], name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case(name))
        .filter_map(|header| core::str::from_utf8(header.value).ok())
        .map(str::trim)
        .collect();

    (!values.is_empty()).then(|| values.join(", "))
}

fn generate_sec_key<R: RngCore>(rng: &mut R) -> String {
    let mut key: [u8; 16] = [0; 16];

    rng.fill_bytes(&mut key);

    general_purpose::STANDARD.encode(key)
}

pub(crate) fn generate_sec_accept(sec_key: &[u8]) -> String {
    let mut sha1 = Sha1::new();

    sha1.update(sec_key);
    sha1.update(ACCEPT_GUID);

    general_purpose::STANDARD.encode(sha1.finalize())
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn handshake(protocol: &str) -> Handshake {
        let url = WebSocketUrl::parse("ws://example.com/chat?room=1").unwrap();

        Handshake::new(url, protocol, &mut StdRng::seed_from_u64(1))
    }

    fn response(handshake: &Handshake, extra: &str) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             {extra}\r\n",
            generate_sec_accept(handshake.sec_key().as_bytes())
        )
    }

    mod url {
        use super::*;

        #[test]
        fn defaults() {
            let url = WebSocketUrl::parse("ws://example.com").unwrap();

            assert_eq!(url.host(), "example.com");
            assert_eq!(url.port(), 80);
            assert_eq!(url.resource(), "/");
            assert_eq!(url.host_header(), "example.com");
            assert!(!url.is_secure());
        }

        #[test]
        fn secure_with_port_and_query() {
            let url = WebSocketUrl::parse("wss://example.com:8443/a/b?x=1").unwrap();

            assert!(url.is_secure());
            assert_eq!(url.port(), 8443);
            assert_eq!(url.resource(), "/a/b?x=1");
            assert_eq!(url.host_header(), "example.com:8443");
        }

        #[test]
        fn query_without_path() {
            let url = WebSocketUrl::parse("ws://example.com?x=1").unwrap();

            assert_eq!(url.resource(), "/?x=1");
        }

        #[test]
        fn ipv6() {
            let url = WebSocketUrl::parse("ws://[::1]:9001/").unwrap();

            assert_eq!(url.host(), "[::1]");
            assert_eq!(url.port(), 9001);
        }

        #[test]
        fn rejected() {
            for url in [
                "http://example.com",
                "example.com",
                "ws://",
                "ws://example.com:port",
                "ws://example.com/#fragment",
            ] {
                assert!(
                    matches!(WebSocketUrl::parse(url), Err(HandshakeError::InvalidUrl(_))),
                    "{url}"
                );
            }
        }
    }

    #[test]
    fn rfc_accept_value() {
        // RFC 6455 section 1.3.
        assert_eq!(
            generate_sec_accept(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn client_request() {
        let mut handshake = handshake("chat, superchat");
        handshake.add_deflate_offer(DeflateConfig::default());
        handshake.add_header("Origin", "http://example.com");

        let request = String::from_utf8(handshake.client_request()).unwrap();

        assert!(request.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains(&format!("Sec-WebSocket-Key: {}\r\n", handshake.sec_key())));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.contains("Sec-WebSocket-Protocol: chat, superchat\r\n"));
        assert!(request.contains("Sec-WebSocket-Extensions: permessage-deflate\r\n"));
        assert!(request.contains("Origin: http://example.com\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn partial_response() {
        let mut handshake = handshake("");
        let response = response(&handshake, "");

        assert_eq!(
            handshake.read_server_handshake(&response.as_bytes()[..response.len() - 1]),
            0
        );
        assert_eq!(handshake.mode(), HandshakeMode::Incomplete);
    }

    #[test]
    fn ok_leaves_frames_in_buffer() {
        let mut handshake = handshake("chat");
        let response = response(
            &handshake,
            "Sec-WebSocket-Protocol: chat\r\nSet-Cookie: id=1\r\n",
        );

        let mut buf = response.clone().into_bytes();
        buf.extend_from_slice(&[0x81, 0x00]);

        assert_eq!(handshake.read_server_handshake(&buf), response.len());
        assert_eq!(handshake.mode(), HandshakeMode::Connected);
        assert_eq!(handshake.server_protocol(), "chat");
        assert_eq!(handshake.accepted_extensions(), "");
        assert_eq!(handshake.server_set_cookie(), Some("id=1"));
        assert_eq!(handshake.server_set_cookie2(), None);
        assert!(handshake.failure_reason().is_none());
    }

    #[test]
    fn negotiates_deflate() {
        let mut handshake = handshake("");
        handshake.add_deflate_offer(DeflateConfig::default());

        let response = response(
            &handshake,
            "Sec-WebSocket-Extensions: permessage-deflate; server_no_context_takeover\r\n",
        );

        handshake.read_server_handshake(response.as_bytes());

        assert_eq!(handshake.mode(), HandshakeMode::Connected);
        assert_eq!(
            handshake.accepted_extensions(),
            "permessage-deflate; server_no_context_takeover"
        );
        assert_eq!(
            handshake.negotiated_deflate(),
            Some(DeflateParams {
                server_no_context_takeover: true,
                client_no_context_takeover: false,
            })
        );
    }

    mod failures {
        use super::*;

        fn failure(handshake: &mut Handshake, response: &str) -> HandshakeError {
            assert_eq!(
                handshake.read_server_handshake(response.as_bytes()),
                response.len()
            );
            assert_eq!(handshake.mode(), HandshakeMode::Failed);

            handshake.failure_reason().cloned().unwrap()
        }

        #[test]
        fn invalid_status_code() {
            let mut handshake = handshake("");

            let error = failure(&mut handshake, "HTTP/1.1 200 OK\r\n\r\n");

            assert_eq!(error, HandshakeError::InvalidStatusCode(Some(200)));
            assert_eq!(error.to_string(), "Unexpected response code: 200");
        }

        #[test]
        fn missing_upgrade() {
            let mut handshake = handshake("");

            let error = failure(
                &mut handshake,
                "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\n\r\n",
            );

            assert_eq!(error, HandshakeError::MissingUpgrade);
        }

        #[test]
        fn invalid_connection() {
            let mut handshake = handshake("");

            let error = failure(
                &mut handshake,
                "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: close\r\n\r\n",
            );

            assert_eq!(error, HandshakeError::InvalidConnection);
        }

        #[test]
        fn invalid_accept() {
            let mut handshake = handshake("");

            let error = failure(
                &mut handshake,
                "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: nope\r\n\r\n",
            );

            assert_eq!(error, HandshakeError::InvalidAccept);
        }

        #[test]
        fn unexpected_protocol() {
            let mut handshake = handshake("chat");
            let response = response(&handshake, "Sec-WebSocket-Protocol: other\r\n");

            let error = failure(&mut handshake, &response);

            assert_eq!(error, HandshakeError::UnexpectedProtocol(String::from("other")));
        }

        #[test]
        fn unsolicited_extension() {
            let mut handshake = handshake("");
            let response = response(&handshake, "Sec-WebSocket-Extensions: permessage-deflate\r\n");

            let error = failure(&mut handshake, &response);

            assert!(matches!(error, HandshakeError::Extension(_)));
        }

        #[test]
        fn malformed_http() {
            let mut handshake = handshake("");

            let error = failure(&mut handshake, "HTTP/1.1 abc\r\n\r\n");

            assert!(matches!(error, HandshakeError::Http(_)));
        }
    }
}
