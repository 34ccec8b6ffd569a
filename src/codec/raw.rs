//! Raw text: bytes pass through untouched.
//!
//! Decoding maps bytes `0x80..=0xFF` to raw-byte characters, which is not an
//! error here. Encoding writes raw-byte characters back as their byte and any
//! other character in its multibyte form.

use crate::multibyte::{char_is_byte8, char_to_byte8, push_char_string, raw_byte_char};
use crate::session::Session;

pub(crate) fn decode(s: &mut Session<'_>) {
    let end = s.src.len();
    let mut pos = s.consumed;
    while pos < end && !s.charbuf.is_full() {
        let c = raw_byte_char(s.src[pos]);
        s.charbuf.push_plain_char(c);
        pos += 1;
    }
    s.consumed = pos;
}

pub(crate) fn encode(s: &mut Session<'_>) {
    super::encode_chars(s, |s, c| {
        if char_is_byte8(c) {
            s.dst.push(char_to_byte8(c));
        } else {
            let mut bytes = Vec::with_capacity(5);
            push_char_string(c, &mut bytes);
            s.dst.extend(&bytes);
        }
        true
    });
}
