//! Error types.
//!
//! The `Display` output of every error is the diagnostic logged when the channel fails.

use crate::{OpCode, blob::BlobLoadError};

/// A frame that cannot be parsed at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("WebSocket frame length too large: {len} bytes")]
    PayloadTooLarge { len: u64 },
}

/// A well formed frame that breaks the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unrecognized frame opcode: {opcode}")]
    ReservedOpCode { opcode: u8 },
    #[error("One or more reserved bits are on: reserved2 = {rsv2}, reserved3 = {rsv3}")]
    ReservedBitsNotZero { rsv2: u8, rsv3: u8 },
    #[error("A server must not mask any frames that it sends to the client.")]
    MaskedServerFrame,
    #[error("Received fragmented control frame: opcode = {opcode}")]
    ControlFrameFragmented { opcode: u8 },
    #[error("Received control frame having too long payload: {len} bytes")]
    ControlFramePayloadTooLarge { len: usize },
    #[error("Received new data frame but previous continuous frame is unfinished.")]
    UnfinishedContinuation,
    #[error("Received unexpected continuation frame.")]
    UnexpectedContinuation,
    #[error("Could not decode a text frame as UTF-8.")]
    InvalidUtf8,
    #[error("Received a broken close frame containing invalid size body.")]
    InvalidCloseFrame,
}

impl ProtocolError {
    pub(crate) const fn reserved_opcode(opcode: OpCode) -> Self {
        Self::ReservedOpCode {
            opcode: opcode.as_u8(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    #[error("Compressed bit must be 0 if no negotiated permessage-deflate extension")]
    UnexpectedCompressedFrame,
    #[error("Received compressed control frame: opcode = {opcode}")]
    CompressedControlFrame { opcode: u8 },
    #[error("Received continuation frame with the compressed bit set")]
    CompressedContinuation,
    #[error("Failed to decompress frame: {0}")]
    Inflate(String),
    #[error("Failed to compress frame: {0}")]
    Deflate(String),
    #[error("Decompressed message exceeds {limit} bytes")]
    InflatedTooLarge { limit: usize },
    #[error("Compression context was released after the connection failed")]
    Released,
    #[error("Invalid 'Sec-WebSocket-Extensions' header: {0}")]
    InvalidExtension(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    #[error("Invalid HTTP response: {0}")]
    Http(#[from] httparse::Error),
    #[error("Unexpected response code: {}", .0.map(|code| code.to_string()).unwrap_or_default())]
    InvalidStatusCode(Option<u16>),
    #[error("Error during WebSocket handshake: 'Upgrade' header is missing")]
    MissingUpgrade,
    #[error("Error during WebSocket handshake: 'Upgrade' header value is not 'WebSocket'")]
    InvalidUpgrade,
    #[error("Error during WebSocket handshake: 'Connection' header is missing")]
    MissingConnection,
    #[error("Error during WebSocket handshake: 'Connection' header value is not 'Upgrade'")]
    InvalidConnection,
    #[error("Error during WebSocket handshake: 'Sec-WebSocket-Accept' header is missing")]
    MissingAccept,
    #[error("Error during WebSocket handshake: Incorrect 'Sec-WebSocket-Accept' header value")]
    InvalidAccept,
    #[error(
        "Error during WebSocket handshake: 'Sec-WebSocket-Protocol' header value '{0}' in response does not match any of sent values"
    )]
    UnexpectedProtocol(String),
    #[error("Error during WebSocket handshake: {0}")]
    Extension(#[from] CompressionError),
}

/// Everything that fails a channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Compression(#[from] CompressionError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error("Failed to load Blob: {0}")]
    BlobRead(#[from] BlobLoadError),
    #[error("Ran out of memory while receiving WebSocket data.")]
    ReceiveBufferOverflow,
    #[error("Failed to send WebSocket handshake.")]
    HandshakeSendFailed,
    #[error("Failed to send WebSocket frame.")]
    SendFailed,
    #[error("WebSocket is closed before the connection is established.")]
    ClosedBeforeEstablished,
    #[error("WebSocket network error: {0}")]
    Network(String),
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),
}
