use std::borrow::Cow;

use rand::Rng;
use rand_core::RngCore;

use crate::{
    Frame, OpCode,
    error::FrameDecodeError,
    frame::Header,
};

const MIN_HEADER_SIZE: usize = 2;

/// The largest payload length RFC 6455 allows, the most significant bit of the 64-bit length must be 0.
const MAX_PAYLOAD_LEN: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Attempts to parse exactly one frame from the start of `src`.
///
/// # Return value
///
/// - `Ok(None)` if `src` does not hold a whole frame yet.
/// - `Ok(Some((frame, consumed)))` with the number of bytes the frame occupies in `src`.
/// - `Err(error)` if the frame can never be parsed.
///
/// No protocol rule beyond the wire layout is checked here. Masked payloads are unmasked.
pub fn decode(src: &[u8]) -> Result<Option<(Frame<'_>, usize)>, FrameDecodeError> {
    if src.len() < MIN_HEADER_SIZE {
        return Ok(None);
    }

    let fin = src[0] & 0b10000000 != 0;
    let rsv1 = src[0] & 0b01000000 != 0;
    let rsv2 = src[0] & 0b00100000 != 0;
    let rsv3 = src[0] & 0b00010000 != 0;
    let opcode = OpCode::from_u8(src[0] & 0b00001111);

    let masked = src[1] & 0b10000000 != 0;
    let length_code = src[1] & 0x7F;

    let extra = match length_code {
        126 => 2,
        127 => 8,
        _ => 0,
    };

    let header_len = MIN_HEADER_SIZE + extra + masked as usize * 4;

    if src.len() < header_len {
        return Ok(None);
    }

    let payload_len = match length_code {
        126 => u16::from_be_bytes([src[2], src[3]]) as u64,
        127 => u64::from_be_bytes([
            src[2], src[3], src[4], src[5], src[6], src[7], src[8], src[9],
        ]),
        len => len as u64,
    };

    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FrameDecodeError::PayloadTooLarge { len: payload_len });
    }

    let end = usize::try_from(payload_len)
        .ok()
        .and_then(|len| header_len.checked_add(len))
        .ok_or(FrameDecodeError::PayloadTooLarge { len: payload_len })?;

    if src.len() < end {
        return Ok(None);
    }

    let payload = &src[header_len..end];

    let payload = match masked {
        false => Cow::Borrowed(payload),
        true => {
            let key = [
                src[2 + extra],
                src[3 + extra],
                src[4 + extra],
                src[5 + extra],
            ];

            let mut payload = payload.to_vec();
            crate::mask::unmask(&mut payload, key);

            Cow::Owned(payload)
        }
    };

    let frame = Frame::new(fin, opcode, payload)
        .with_reserved(rsv1, rsv2, rsv3)
        .with_masked(masked);

    Ok(Some((frame, end)))
}

/// Serializes frames, masking them with fresh keys when configured to.
#[derive(Debug)]
pub struct FramesCodec<R> {
    mask: bool,
    rng: R,
}

impl<R> FramesCodec<R> {
    /// A codec that masks every frame, as a client must.
    pub const fn client(rng: R) -> Self {
        Self { mask: true, rng }
    }

    /// A codec that never masks.
    pub const fn server(rng: R) -> Self {
        Self { mask: false, rng }
    }

    pub fn set_mask(&mut self, mask: bool) {
        self.mask = mask;
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

impl<R: RngCore> FramesCodec<R> {
    /// Appends the wire bytes of `frame` to `dst`.
    pub fn encode(&mut self, frame: &Frame<'_>, dst: &mut Vec<u8>) {
        let mask: Option<[u8; 4]> = self.mask.then(|| self.rng.random());

        encode_with_mask(frame, mask, dst);
    }
}

/// Appends the wire bytes of `frame` to `dst`, masked with `mask` if given.
pub fn encode_with_mask(frame: &Frame<'_>, mask: Option<[u8; 4]>, dst: &mut Vec<u8>) {
    let header = Header::new(frame, mask);

    dst.reserve(header.encoded_len() + frame.payload().len());

    header.write(dst);

    let start = dst.len();
    dst.extend_from_slice(frame.payload());

    if let Some(mask) = mask {
        crate::mask::unmask(&mut dst[start..], mask);
    }
}
