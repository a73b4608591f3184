//! `permessage-deflate` (RFC 7692) and the framer that applies it.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::{Frame, OpCode, error::CompressionError};

const EXTENSION_NAME: &str = "permessage-deflate";

/// The empty stored block a sync flush ends with. Stripped from outgoing messages, appended to
/// incoming ones.
const DEFLATE_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

const CHUNK: usize = 4096;

/// Settings for the `permessage-deflate` offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    /// 0-9.
    pub compression_level: u32,
    /// Ask the server to let us reset our compression context after every message.
    pub request_no_context_takeover: bool,
    /// Incoming messages inflating beyond this fail the connection.
    pub max_inflated_size: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            compression_level: 6,
            request_no_context_takeover: false,
            max_inflated_size: 64 * 1024 * 1024,
        }
    }
}

impl DeflateConfig {
    pub const fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = if level > 9 { 9 } else { level };
        self
    }

    pub const fn with_request_no_context_takeover(mut self, value: bool) -> Self {
        self.request_no_context_takeover = value;
        self
    }

    pub const fn with_max_inflated_size(mut self, size: usize) -> Self {
        self.max_inflated_size = size;
        self
    }

    /// The `Sec-WebSocket-Extensions` request value.
    pub fn offer(&self) -> String {
        match self.request_no_context_takeover {
            false => String::from(EXTENSION_NAME),
            true => format!("{EXTENSION_NAME}; client_no_context_takeover"),
        }
    }

    /// Checks the server's `Sec-WebSocket-Extensions` response against our offer.
    ///
    /// `Ok(None)` means the server declined compression.
    pub fn negotiate(
        &self,
        response: Option<&str>,
    ) -> Result<Option<DeflateParams>, CompressionError> {
        let Some(response) = response else {
            return Ok(None);
        };

        let mut negotiated: Option<DeflateParams> = None;

        for extension in response.split(',').map(str::trim) {
            let mut params = extension.split(';').map(str::trim);

            match params.next() {
                Some(EXTENSION_NAME) => {}
                Some(other) => {
                    return Err(CompressionError::InvalidExtension(format!(
                        "Received unexpected extension: {other}"
                    )));
                }
                None => continue,
            }

            if negotiated.is_some() {
                return Err(CompressionError::InvalidExtension(String::from(
                    "permessage-deflate accepted more than once",
                )));
            }

            let mut accepted = DeflateParams {
                server_no_context_takeover: false,
                client_no_context_takeover: self.request_no_context_takeover,
            };

            for param in params {
                let (name, value) = match param.split_once('=') {
                    Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                    None => (param, None),
                };

                match (name, value) {
                    ("server_no_context_takeover", None) => {
                        accepted.server_no_context_takeover = true;
                    }
                    ("client_no_context_takeover", None) => {
                        accepted.client_no_context_takeover = true;
                    }
                    ("server_max_window_bits", Some(bits)) => {
                        // Our decompressor always runs with a 15 bit window, which inflates
                        // anything produced with a smaller one.
                        match bits.parse::<u8>() {
                            Ok(8..=15) => {}
                            _ => {
                                return Err(CompressionError::InvalidExtension(format!(
                                    "invalid server_max_window_bits: {bits}"
                                )));
                            }
                        }
                    }
                    _ => {
                        return Err(CompressionError::InvalidExtension(format!(
                            "unexpected permessage-deflate parameter: {param}"
                        )));
                    }
                }
            }

            negotiated = Some(accepted);
        }

        Ok(negotiated)
    }
}

/// What the server agreed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateParams {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
}

/// The negotiated compression contexts of one connection.
#[derive(Debug)]
pub struct Deflate {
    params: DeflateParams,
    level: u32,
    max_inflated_size: usize,
    compressor: Option<Compress>,
    decompressor: Option<Decompress>,
    /// Bytes inflated so far for the message being received.
    inflated: usize,
}

impl Deflate {
    pub fn new(config: &DeflateConfig, params: DeflateParams) -> Self {
        Self {
            params,
            level: config.compression_level,
            max_inflated_size: config.max_inflated_size,
            compressor: None,
            decompressor: None,
            inflated: 0,
        }
    }

    /// Compresses a whole message.
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let level = self.level;
        let compressor = self
            .compressor
            .get_or_insert_with(|| Compress::new(Compression::new(level), false));

        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        let mut input = data;

        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(CHUNK);
            }

            let before = compressor.total_in();

            compressor
                .compress_vec(input, &mut out, FlushCompress::Sync)
                .map_err(|err| CompressionError::Deflate(err.to_string()))?;

            let consumed = (compressor.total_in() - before) as usize;
            input = &input[consumed..];

            if input.is_empty() && out.len() < out.capacity() {
                break;
            }
        }

        if out.ends_with(&DEFLATE_TAIL) {
            out.truncate(out.len() - DEFLATE_TAIL.len());
        }

        if self.params.client_no_context_takeover {
            self.compressor = None;
        }

        Ok(out)
    }

    /// Inflates one fragment of a compressed message. `fin` marks the last fragment.
    pub fn decompress(&mut self, data: &[u8], fin: bool) -> Result<Vec<u8>, CompressionError> {
        let decompressor = self
            .decompressor
            .get_or_insert_with(|| Decompress::new(false));

        let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(CHUNK));
        let limit = self.max_inflated_size.saturating_sub(self.inflated);

        inflate_into(decompressor, data, &mut out, limit, self.max_inflated_size)?;

        if fin {
            inflate_into(
                decompressor,
                &DEFLATE_TAIL,
                &mut out,
                limit,
                self.max_inflated_size,
            )?;

            self.inflated = 0;

            if self.params.server_no_context_takeover {
                self.decompressor = None;
            }
        } else {
            self.inflated += out.len();
        }

        Ok(out)
    }
}

fn inflate_into(
    decompressor: &mut Decompress,
    mut input: &[u8],
    out: &mut Vec<u8>,
    limit: usize,
    max_inflated_size: usize,
) -> Result<(), CompressionError> {
    loop {
        if out.capacity() - out.len() < CHUNK {
            out.reserve(CHUNK);
        }

        let before_in = decompressor.total_in();
        let before_out = decompressor.total_out();

        let status = decompressor
            .decompress_vec(input, out, FlushDecompress::Sync)
            .map_err(|err| CompressionError::Inflate(err.to_string()))?;

        let consumed = (decompressor.total_in() - before_in) as usize;
        let produced = (decompressor.total_out() - before_out) as usize;

        input = &input[consumed..];

        if out.len() > limit {
            return Err(CompressionError::InflatedTooLarge {
                limit: max_inflated_size,
            });
        }

        match status {
            Status::StreamEnd => break,
            Status::BufError if consumed == 0 && produced == 0 => break,
            _ => {}
        }

        if input.is_empty() && out.len() < out.capacity() {
            break;
        }
    }

    Ok(())
}

#[derive(Debug)]
enum State {
    /// Not offered, declined, or not yet negotiated.
    Disabled,
    Enabled(Box<Deflate>),
    /// The connection failed and the contexts were dropped.
    Released,
}

/// Applies the negotiated compression to frames, or passes them through untouched.
#[derive(Debug)]
pub struct CompressionFramer {
    config: Option<DeflateConfig>,
    state: State,
    /// Whether the message currently being received is compressed.
    inflating: bool,
}

impl CompressionFramer {
    pub const fn new(config: Option<DeflateConfig>) -> Self {
        Self {
            config,
            state: State::Disabled,
            inflating: false,
        }
    }

    /// Whether compression should be offered during the handshake.
    pub const fn can_deflate(&self) -> bool {
        self.config.is_some() && !matches!(self.state, State::Released)
    }

    pub fn config(&self) -> Option<&DeflateConfig> {
        self.config.as_ref()
    }

    /// Starts compressing with the parameters the server accepted.
    pub fn enable(&mut self, params: DeflateParams) {
        if let Some(config) = &self.config {
            self.state = State::Enabled(Box::new(Deflate::new(config, params)));
        }
    }

    pub const fn is_enabled(&self) -> bool {
        matches!(self.state, State::Enabled(_))
    }

    pub fn inflate<'a>(&mut self, frame: Frame<'a>) -> Result<Frame<'a>, CompressionError> {
        let deflate = match &mut self.state {
            State::Enabled(deflate) => deflate,
            State::Disabled if frame.rsv1() => {
                return Err(CompressionError::UnexpectedCompressedFrame);
            }
            State::Disabled => return Ok(frame),
            State::Released => return Err(CompressionError::Released),
        };

        match frame.opcode() {
            OpCode::Text | OpCode::Binary => self.inflating = frame.rsv1(),
            OpCode::Continuation if frame.rsv1() => {
                return Err(CompressionError::CompressedContinuation);
            }
            OpCode::Continuation => {}
            opcode if frame.rsv1() => {
                return Err(CompressionError::CompressedControlFrame {
                    opcode: opcode.as_u8(),
                });
            }
            _ => return Ok(frame),
        }

        if !self.inflating {
            return Ok(frame);
        }

        let fin = frame.is_final();
        let payload = deflate.decompress(frame.payload(), fin)?;

        if fin {
            self.inflating = false;
        }

        Ok(frame.with_payload(payload).with_rsv1(false))
    }

    pub fn deflate<'a>(&mut self, frame: Frame<'a>) -> Result<Frame<'a>, CompressionError> {
        let deflate = match &mut self.state {
            State::Enabled(deflate) => deflate,
            State::Disabled => return Ok(frame),
            State::Released => return Err(CompressionError::Released),
        };

        if !frame.opcode().is_data() {
            return Ok(frame);
        }

        let payload = deflate.compress(frame.payload())?;

        Ok(frame.with_payload(payload).with_rsv1(true))
    }

    /// Drops both contexts. Every later call fails.
    pub fn did_fail(&mut self) {
        if self.is_enabled() {
            self.state = State::Released;
        }

        self.inflating = false;
    }
}
