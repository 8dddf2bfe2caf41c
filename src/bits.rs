/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

/// Round `n` up to the next multiple of `align`.
pub fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

/// Split `len` bytes off the front of `buf`, or return `None` without consuming anything if
/// fewer than `len` bytes remain.
pub fn try_pull<'a>(buf: &mut &'a [u8], len: usize) -> Option<&'a [u8]> {
    if buf.len() < len {
        return None;
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Some(head)
}

/// Append `n` zero bytes to `bytes`.
pub fn put_zeros(bytes: &mut Vec<u8>, n: usize) {
    bytes.resize(bytes.len() + n, 0);
}

/// Zero-pad `bytes` so that the region starting at `start` is a multiple of 8 bytes long.
pub fn pad_to_8(bytes: &mut Vec<u8>, start: usize) {
    let len = bytes.len() - start;
    put_zeros(bytes, round_up(len, 8) - len);
}

/// True if every byte of `buf` is zero.
pub fn is_all_zeros(buf: &[u8]) -> bool {
    buf.iter().all(|b| *b == 0)
}
