//! Base64 variable-length quantities as used by the `mappings` field.

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const SHIFT: u32 = 5;
const CONTINUATION: u32 = 1 << SHIFT;
const MASK: u32 = CONTINUATION - 1;

/// Appends the VLQ encoding of `value` to `out`.
pub fn encode(value: i64, out: &mut String) {
    let mut vlq: u64 = if value < 0 {
        ((value.unsigned_abs()) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & MASK as u64) as u32;
        vlq >>= SHIFT;
        if vlq > 0 {
            digit |= CONTINUATION;
        }
        out.push(BASE64[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn digit_value(b: u8) -> Option<u32> {
    let v = match b {
        b'A'..=b'Z' => b - b'A',
        b'a'..=b'z' => b - b'a' + 26,
        b'0'..=b'9' => b - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(v as u32)
}

/// Decodes every VLQ value of one segment (the text between commas).
///
/// Returns `None` on an invalid digit, a dangling continuation, or a value
/// that does not fit in an `i64`.
pub fn decode_segment(segment: &str) -> Option<Vec<i64>> {
    let mut values = Vec::with_capacity(5);
    let mut acc: u64 = 0;
    let mut shift: u32 = 0;
    let mut pending = false;

    for b in segment.bytes() {
        let digit = digit_value(b)?;
        if shift >= 64 {
            return None;
        }
        acc |= ((digit & MASK) as u64) << shift;
        if digit & CONTINUATION != 0 {
            shift += SHIFT;
            pending = true;
            continue;
        }
        let negative = acc & 1 == 1;
        let magnitude = (acc >> 1) as i64;
        values.push(if negative { -magnitude } else { magnitude });
        acc = 0;
        shift = 0;
        pending = false;
    }

    if pending {
        return None;
    }
    Some(values)
}
