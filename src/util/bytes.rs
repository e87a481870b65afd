// Byte strings as unsigned big-endian integers

/// `value + 1` as a new buffer. An all-`0xFF` input carries into a new
/// leading byte (`[0xFF, 0xFF]` becomes `[0x01, 0x00, 0x00]`).
#[must_use]
pub fn increment(value: &[u8]) -> Vec<u8> {
    let mut out = value.to_vec();
    for byte in out.iter_mut().rev() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            return out;
        }
    }
    out.insert(0, 0x01);
    out
}

/// `value - 1` as a new buffer of the same length, `None` when `value` is all zero.
#[must_use]
pub fn decrement(value: &[u8]) -> Option<Vec<u8>> {
    if value.iter().all(|&b| b == 0) {
        return None;
    }
    let mut out = value.to_vec();
    for byte in out.iter_mut().rev() {
        let (next, borrow) = byte.overflowing_sub(1);
        *byte = next;
        if !borrow {
            break;
        }
    }
    Some(out)
}
