/// XORs `buf` with `mask`, cycling the key from its first byte.
///
/// Applying the same key twice restores the input.
pub fn unmask(buf: &mut [u8], mask: [u8; 4]) {
    for (index, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[index & 3];
    }
}
