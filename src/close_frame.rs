use crate::{CloseCode, error::ProtocolError};

/// A control frame payload holds at most 125 bytes, two of them the code.
const MAX_REASON_LEN: usize = 123;

/// The payload of a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The reason as a code.
    code: CloseCode,
    /// The reason as text string.
    reason: String,
}

impl CloseFrame {
    /// Creates a new [`CloseFrame`].
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn no_reason(code: CloseCode) -> Self {
        Self::new(code, "")
    }

    /// Returns the close code.
    pub const fn code(&self) -> CloseCode {
        self.code
    }

    /// Returns the reason as a string slice.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Reads the payload of a received Close frame.
    ///
    /// An empty payload yields [`CloseCode::NoStatusReceived`]. A payload of exactly one byte
    /// is malformed. Codes that must not appear on the wire are reported as
    /// [`CloseCode::Abnormal`]. A reason that is not valid UTF-8 is dropped.
    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        match payload {
            [] => Ok(Self::no_reason(CloseCode::NoStatusReceived)),
            [_] => Err(ProtocolError::InvalidCloseFrame),
            [high, low, reason @ ..] => {
                let code = CloseCode::received(u16::from_be_bytes([*high, *low]));
                let reason = core::str::from_utf8(reason).unwrap_or_default();

                Ok(Self::new(code, reason))
            }
        }
    }

    /// Writes the big-endian code followed by the UTF-8 reason.
    ///
    /// The reason is cut at a character boundary so the payload fits in a control frame.
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let reason = truncate(&self.reason, MAX_REASON_LEN);

        let mut payload = Vec::with_capacity(2 + reason.len());

        payload.extend_from_slice(&self.code.into_u16().to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());

        payload
    }
}

fn truncate(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }

    let mut end = max_len;

    while !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}
