//! Internal character model and its multibyte byte representation.
//!
//! Decoded text is a sequence of `u32` code points drawn from an extended
//! character space:
//!
//! - `0..=0x10FFFF` coincide with Unicode.
//! - `0x110000..=0x3FFF7F` hold characters of charsets that are not unified
//!   with Unicode (see [`crate::charset`]).
//! - `0x3FFF80..=0x3FFFFF` are "raw 8-bit" characters: a byte that could not
//!   be decoded is kept as `0x3FFF00 + byte` so no input is ever lost.
//!
//! The multibyte representation is UTF-8 extended with a 5-byte form for the
//! non-Unicode range; raw bytes use the otherwise-overlong `C0`/`C1` 2-byte
//! forms so every raw byte round-trips through two bytes.

/// Largest Unicode scalar value.
pub const MAX_UNICODE_CHAR: u32 = 0x10FFFF;
/// Largest character that has a 4-byte multibyte form.
pub const MAX_4_BYTE_CHAR: u32 = 0x1FFFFF;
/// Largest character that is not a raw byte.
pub const MAX_5_BYTE_CHAR: u32 = 0x3FFF7F;
/// Largest character code.
pub const MAX_CHAR: u32 = 0x3FFFFF;
/// Offset of raw 8-bit characters: `byte8 char = BYTE8_OFFSET + byte`.
pub const BYTE8_OFFSET: u32 = 0x3FFF00;
/// Longest multibyte form of a single character.
pub const MAX_MULTIBYTE_LENGTH: usize = 5;

/// Character used when nothing better is available.
pub const REPLACEMENT_CHAR: u32 = 0xFFFD;

/// Returns `true` for the 7-bit ASCII range.
#[inline]
pub fn is_ascii(c: u32) -> bool {
    c < 0x80
}

/// Returns `true` if `c` is a raw 8-bit character.
#[inline]
pub fn char_is_byte8(c: u32) -> bool {
    c > MAX_5_BYTE_CHAR && c <= MAX_CHAR
}

/// Raw 8-bit character for a byte in `0x80..=0xFF`.
#[inline]
pub fn byte8_to_char(b: u8) -> u32 {
    BYTE8_OFFSET + u32::from(b)
}

/// Byte carried by a raw 8-bit character.
#[inline]
pub fn char_to_byte8(c: u32) -> u8 {
    debug_assert!(char_is_byte8(c));
    (c - BYTE8_OFFSET) as u8
}

/// The character a byte stands for when it cannot be decoded.
///
/// ASCII bytes stay ASCII; everything else becomes a raw 8-bit character.
#[inline]
pub fn raw_byte_char(b: u8) -> u32 {
    if b < 0x80 {
        u32::from(b)
    } else {
        byte8_to_char(b)
    }
}

/// Returns `true` if `c` is a valid character code.
#[inline]
pub fn is_valid_char(c: u32) -> bool {
    c <= MAX_CHAR
}

/// Number of bytes in the multibyte form of `c`.
pub fn char_bytes(c: u32) -> usize {
    match c {
        0..=0x7F => 1,
        0x80..=0x7FF => 2,
        0x800..=0xFFFF => 3,
        0x10000..=MAX_4_BYTE_CHAR => 4,
        0x200000..=MAX_5_BYTE_CHAR => 5,
        _ => 2,
    }
}

/// Writes the multibyte form of `c` into `buf`, returning its length.
pub fn char_string(c: u32, buf: &mut [u8; MAX_MULTIBYTE_LENGTH]) -> usize {
    match c {
        0..=0x7F => {
            buf[0] = c as u8;
            1
        }
        0x80..=0x7FF => {
            buf[0] = 0xC0 | (c >> 6) as u8;
            buf[1] = 0x80 | (c & 0x3F) as u8;
            2
        }
        0x800..=0xFFFF => {
            buf[0] = 0xE0 | (c >> 12) as u8;
            buf[1] = 0x80 | ((c >> 6) & 0x3F) as u8;
            buf[2] = 0x80 | (c & 0x3F) as u8;
            3
        }
        0x10000..=MAX_4_BYTE_CHAR => {
            buf[0] = 0xF0 | (c >> 18) as u8;
            buf[1] = 0x80 | ((c >> 12) & 0x3F) as u8;
            buf[2] = 0x80 | ((c >> 6) & 0x3F) as u8;
            buf[3] = 0x80 | (c & 0x3F) as u8;
            4
        }
        0x200000..=MAX_5_BYTE_CHAR => {
            buf[0] = 0xF8;
            buf[1] = 0x80 | ((c >> 18) & 0x0F) as u8;
            buf[2] = 0x80 | ((c >> 12) & 0x3F) as u8;
            buf[3] = 0x80 | ((c >> 6) & 0x3F) as u8;
            buf[4] = 0x80 | (c & 0x3F) as u8;
            5
        }
        _ => {
            let b = char_to_byte8(c.min(MAX_CHAR).max(BYTE8_OFFSET + 0x80));
            buf[0] = 0xC0 | ((b >> 6) & 1);
            buf[1] = 0x80 | (b & 0x3F);
            2
        }
    }
}

/// Appends the multibyte form of `c` to `out`.
pub fn push_char_string(c: u32, out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_MULTIBYTE_LENGTH];
    let len = char_string(c, &mut buf);
    out.extend_from_slice(&buf[..len]);
}

#[inline]
fn is_trailing(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Reads one character from the start of a multibyte sequence.
///
/// Returns the character and the number of bytes it occupied, or `None` if
/// `bytes` does not start with a well-formed multibyte sequence.
pub fn string_char(bytes: &[u8]) -> Option<(u32, usize)> {
    let b0 = *bytes.first()?;
    if b0 < 0x80 {
        return Some((u32::from(b0), 1));
    }
    let need = match b0 {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        0xF8 => 5,
        _ => return None,
    };
    if bytes.len() < need || !bytes[1..need].iter().all(|&b| is_trailing(b)) {
        return None;
    }
    let c = match need {
        2 if b0 < 0xC2 => {
            let b = 0x80 | ((b0 & 1) << 6) | (bytes[1] & 0x3F);
            byte8_to_char(b)
        }
        2 => (u32::from(b0 & 0x1F) << 6) | u32::from(bytes[1] & 0x3F),
        3 => {
            (u32::from(b0 & 0x0F) << 12)
                | (u32::from(bytes[1] & 0x3F) << 6)
                | u32::from(bytes[2] & 0x3F)
        }
        4 => {
            (u32::from(b0 & 0x07) << 18)
                | (u32::from(bytes[1] & 0x3F) << 12)
                | (u32::from(bytes[2] & 0x3F) << 6)
                | u32::from(bytes[3] & 0x3F)
        }
        _ => {
            (u32::from(bytes[1] & 0x0F) << 18)
                | (u32::from(bytes[2] & 0x3F) << 12)
                | (u32::from(bytes[3] & 0x3F) << 6)
                | u32::from(bytes[4] & 0x3F)
        }
    };
    Some((c, need))
}

/// Converts a multibyte byte sequence to characters.
///
/// Bytes that do not start a well-formed sequence become raw 8-bit
/// characters.
pub fn chars_from_multibyte(bytes: &[u8]) -> Vec<u32> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match string_char(&bytes[i..]) {
            Some((c, len)) => {
                out.push(c);
                i += len;
            }
            None => {
                out.push(raw_byte_char(bytes[i]));
                i += 1;
            }
        }
    }
    out
}

/// Converts characters to their multibyte representation.
pub fn multibyte_from_chars(chars: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(chars.len());
    for &c in chars {
        push_char_string(c, &mut out);
    }
    out
}

/// Converts characters to a Rust string, mapping raw bytes and non-Unicode
/// characters to U+FFFD.
pub fn chars_to_string_lossy(chars: &[u32]) -> String {
    chars
        .iter()
        .map(|&c| char::from_u32(c).unwrap_or('\u{FFFD}'))
        .collect()
}

/// Characters of a Rust string.
pub fn chars_of(s: &str) -> Vec<u32> {
    s.chars().map(u32::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte8_mapping() {
        assert_eq!(byte8_to_char(0x80), 0x3FFF80);
        assert_eq!(byte8_to_char(0xFF), MAX_CHAR);
        assert!(char_is_byte8(0x3FFF80));
        assert!(!char_is_byte8(MAX_5_BYTE_CHAR));
        assert_eq!(char_to_byte8(0x3FFFC3), 0xC3);
        assert_eq!(raw_byte_char(b'A'), 0x41);
    }

    #[test]
    fn test_multibyte_forms() {
        let mut buf = [0u8; MAX_MULTIBYTE_LENGTH];
        assert_eq!(char_string(0xE9, &mut buf), 2);
        assert_eq!(&buf[..2], &[0xC3, 0xA9]);

        // Raw bytes use the C0/C1 overlong forms.
        assert_eq!(char_string(byte8_to_char(0x80), &mut buf), 2);
        assert_eq!(&buf[..2], &[0xC0, 0x80]);
        assert_eq!(char_string(byte8_to_char(0xFF), &mut buf), 2);
        assert_eq!(&buf[..2], &[0xC1, 0xBF]);

        assert_eq!(char_string(0x3FFF7F, &mut buf), 5);
        assert_eq!(buf[0], 0xF8);
    }

    #[test]
    fn test_string_char_reads_back_every_form() {
        for &c in &[0x41, 0xE9, 0x3042, 0x1F600, 0x110000, 0x3FFF7F, 0x3FFF80, MAX_CHAR] {
            let mut buf = [0u8; MAX_MULTIBYTE_LENGTH];
            let len = char_string(c, &mut buf);
            assert_eq!(string_char(&buf[..len]), Some((c, len)), "char {:#X}", c);
        }
    }

    #[test]
    fn test_malformed_multibyte_becomes_raw() {
        let chars = chars_from_multibyte(&[b'a', 0xFF, 0xE3, 0x81]);
        assert_eq!(chars, vec![0x61, byte8_to_char(0xFF), byte8_to_char(0xE3), byte8_to_char(0x81)]);
    }
}
