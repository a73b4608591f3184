use std::borrow::Cow;

use crate::OpCode;

/// A single WebSocket frame.
///
/// Decoded frames borrow their payload from the receive buffer unless it had to be unmasked
/// or inflated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Indicates if this is the final frame in a message.
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    /// Whether the frame was masked on the wire.
    masked: bool,
    /// The opcode of the frame.
    opcode: OpCode,
    /// The payload of the frame, unmasked.
    payload: Cow<'a, [u8]>,
}

impl<'a> Frame<'a> {
    /// Creates a new `Frame` instance with all reserved bits cleared.
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            masked: false,
            opcode,
            payload: payload.into(),
        }
    }

    pub(crate) const fn with_reserved(mut self, rsv1: bool, rsv2: bool, rsv3: bool) -> Self {
        self.rsv1 = rsv1;
        self.rsv2 = rsv2;
        self.rsv3 = rsv3;
        self
    }

    pub(crate) const fn with_masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    pub(crate) const fn with_rsv1(mut self, rsv1: bool) -> Self {
        self.rsv1 = rsv1;
        self
    }

    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Cow::Owned(payload);
        self
    }

    /// Returns whether this is the final frame in a message.
    pub const fn is_final(&self) -> bool {
        self.fin
    }

    /// The per-message compression bit.
    pub const fn rsv1(&self) -> bool {
        self.rsv1
    }

    pub const fn rsv2(&self) -> bool {
        self.rsv2
    }

    pub const fn rsv3(&self) -> bool {
        self.rsv3
    }

    pub const fn is_masked(&self) -> bool {
        self.masked
    }

    /// Returns the opcode of the frame.
    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the payload of the frame.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Cow<'a, [u8]> {
        self.payload
    }
}

/// The fixed part of a frame on the wire.
#[derive(Debug)]
pub struct Header {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    /// The length of the payload.
    payload_len: usize,
}

impl Header {
    pub fn new(frame: &Frame<'_>, mask: Option<[u8; 4]>) -> Self {
        Self {
            fin: frame.fin,
            rsv1: frame.rsv1,
            rsv2: frame.rsv2,
            rsv3: frame.rsv3,
            opcode: frame.opcode,
            mask,
            payload_len: frame.payload.len(),
        }
    }

    /// The number of bytes [`Header::write`] appends.
    pub const fn encoded_len(&self) -> usize {
        let length_field = if self.payload_len < 126 {
            0
        } else if self.payload_len < 65536 {
            2
        } else {
            8
        };

        2 + length_field + if self.mask.is_some() { 4 } else { 0 }
    }

    /// Appends the header to `dst`, using the shortest length encoding for the payload.
    pub fn write(&self, dst: &mut Vec<u8>) {
        dst.push(
            (self.fin as u8) << 7
                | (self.rsv1 as u8) << 6
                | (self.rsv2 as u8) << 5
                | (self.rsv3 as u8) << 4
                | self.opcode.as_u8(),
        );

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        let len = self.payload_len;

        if len < 126 {
            dst.push(mask_bit | len as u8);
        } else if len < 65536 {
            dst.push(mask_bit | 126);
            dst.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            dst.push(mask_bit | 127);
            dst.extend_from_slice(&(len as u64).to_be_bytes());
        }

        if let Some(mask) = self.mask {
            dst.extend_from_slice(&mask);
        }
    }
}
