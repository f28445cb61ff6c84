//! Hex encoding helpers shared by the framing layer and command handlers.

pub(crate) fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// Lowercase hex digit for the low nibble of `val`.
pub(crate) fn hex_char(val: u8) -> u8 {
    match val & 0xf {
        nibble @ 0..=9 => nibble + b'0',
        nibble => nibble - 10 + b'a',
    }
}

/// Encode bytes as two lowercase hex digits each, high nibble first.
pub fn hexify(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for &byte in data {
        out.push(hex_char(byte >> 4) as char);
        out.push(hex_char(byte) as char);
    }
    out
}

/// Decode pairs of hex digits into bytes.
///
/// A trailing odd digit is dropped, so only even-length input round-trips
/// through [`hexify`]. Characters outside `[0-9a-fA-F]` decode as zero
/// nibbles.
pub fn unhexify(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let high = hex_value(pair[0]).unwrap_or(0);
        let low = hex_value(pair[1]).unwrap_or(0);
        out.push((high << 4) | low);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hexify_uses_lowercase_high_nibble_first() {
        assert_eq!(hexify(b"\x00\x7f\xa5"), "007fa5");
        assert_eq!(hexify(b"how are you?\n"), "686f772061726520796f753f0a");
    }

    #[test]
    fn unhexify_inverts_hexify() {
        let payload = b"thread info la la la";
        assert_eq!(unhexify(&hexify(payload)), payload);
    }

    #[test]
    fn unhexify_accepts_uppercase_digits() {
        assert_eq!(unhexify("7FA5"), vec![0x7f, 0xa5]);
    }

    #[test]
    fn unhexify_drops_trailing_odd_digit() {
        assert_eq!(unhexify("414"), vec![0x41]);
        assert_eq!(unhexify("4"), Vec::<u8>::new());
        assert_eq!(unhexify(""), Vec::<u8>::new());
    }

    #[test]
    fn unhexify_maps_stray_characters_to_zero_nibbles() {
        assert_eq!(unhexify("zz41"), vec![0x00, 0x41]);
        assert_eq!(unhexify("4z"), vec![0x40]);
    }
}
