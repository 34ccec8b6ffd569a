//! UTF-8, with an optional legacy extension for characters above U+10FFFF.

use crate::buffer::Destination;
use crate::coding::{BomPolicy, CodingCategory};
use crate::detection::DetectionInfo;
use crate::multibyte::{
    MAX_5_BYTE_CHAR, MAX_UNICODE_CHAR, char_is_byte8, char_to_byte8, push_char_string,
};
use crate::session::{CodingResult, Session};

/// The UTF-8 signature.
pub const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Result of reading one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Utf8Step {
    /// A character and the bytes it used.
    Char(u32, usize),
    /// The first byte does not start a valid sequence.
    Invalid,
    /// The bytes are a valid prefix of a longer sequence.
    Incomplete,
}

/// Reads one character from the head of `bytes` (which must not be empty).
///
/// Overlong forms and surrogates are invalid. With `extended`, 4-byte forms
/// up to `0x1FFFFF` and the 5-byte `F8` form up to `0x3FFF7F` are accepted.
pub(crate) fn read_char(bytes: &[u8], extended: bool) -> Utf8Step {
    let Some(&b0) = bytes.first() else {
        return Utf8Step::Incomplete;
    };
    if b0 < 0x80 {
        return Utf8Step::Char(u32::from(b0), 1);
    }
    let (need, min, init) = match b0 {
        0xC2..=0xDF => (2, 0x80, b0 & 0x1F),
        0xE0..=0xEF => (3, 0x800, b0 & 0x0F),
        0xF0..=0xF7 => (4, 0x10000, b0 & 0x07),
        0xF8 if extended => (5, 0x200000, 0),
        _ => return Utf8Step::Invalid,
    };
    let mut c = u32::from(init);
    for i in 1..need {
        let Some(&b) = bytes.get(i) else {
            return Utf8Step::Incomplete;
        };
        if b & 0xC0 != 0x80 {
            return Utf8Step::Invalid;
        }
        c = (c << 6) | u32::from(b & 0x3F);
    }
    let max = if extended {
        MAX_5_BYTE_CHAR
    } else {
        MAX_UNICODE_CHAR
    };
    if c < min || (0xD800..=0xDFFF).contains(&c) || c > max {
        return Utf8Step::Invalid;
    }
    Utf8Step::Char(c, need)
}

pub(crate) fn decode(s: &mut Session<'_>, bom: BomPolicy, extended: bool) {
    let end = s.src.len();
    let mut pos = s.consumed;

    if !s.state.utf.bom_done && bom != BomPolicy::NoBom {
        let head = &s.src[pos..];
        if head.len() < BOM.len() && BOM.starts_with(head) && !s.last_block {
            if !head.is_empty() {
                s.result = CodingResult::InsufficientSource;
            }
            return;
        }
        if head.starts_with(&BOM) {
            pos += BOM.len();
        }
    }
    s.state.utf.bom_done = true;

    while pos < end && !s.charbuf.is_full() {
        match read_char(&s.src[pos..], extended) {
            Utf8Step::Char(c, len) => {
                s.charbuf.push_plain_char(c);
                pos += len;
            }
            Utf8Step::Invalid => {
                let b = s.src[pos];
                s.emit_raw(b);
                pos += 1;
            }
            Utf8Step::Incomplete => {
                s.result = CodingResult::InsufficientSource;
                break;
            }
        }
    }
    s.consumed = pos;
}

fn put_char(dst: &mut Destination, c: u32, extended: bool) -> bool {
    if char_is_byte8(c) {
        dst.push(char_to_byte8(c));
    } else if c <= MAX_UNICODE_CHAR && !(0xD800..=0xDFFF).contains(&c) {
        let mut buf = [0u8; 4];
        let ch = char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER);
        dst.extend(ch.encode_utf8(&mut buf).as_bytes());
    } else if extended && c <= MAX_5_BYTE_CHAR {
        let mut out = Vec::with_capacity(5);
        push_char_string(c, &mut out);
        dst.extend(&out);
    } else {
        return false;
    }
    true
}

pub(crate) fn encode(s: &mut Session<'_>, bom: BomPolicy, extended: bool) {
    if !s.state.utf.bom_done {
        if bom != BomPolicy::NoBom {
            s.dst.extend(&BOM);
        }
        s.state.utf.bom_done = true;
    }
    super::encode_chars(s, |s, c| put_char(&mut s.dst, c, extended));
}

/// Classifier for the UTF-8 categories.
pub(crate) fn detect(src: &[u8], info: &mut DetectionInfo) {
    info.check(crate::coding::CategoryMask::UTF_8);
    let (body, has_bom) = match src.strip_prefix(&BOM) {
        Some(rest) => (rest, true),
        None => (src, false),
    };
    let mut pos = 0;
    let mut multibyte = false;
    while pos < body.len() {
        match read_char(&body[pos..], false) {
            Utf8Step::Char(_, len) => {
                multibyte |= len > 1;
                pos += len;
            }
            Utf8Step::Invalid => {
                info.reject(crate::coding::CategoryMask::UTF_8);
                return;
            }
            // A sample may cut a character short.
            Utf8Step::Incomplete => break,
        }
    }
    if has_bom {
        info.find(CodingCategory::Utf8Sig.mask() | CodingCategory::Utf8Auto.mask());
        info.reject(CodingCategory::Utf8Nosig.mask());
    } else {
        info.reject(CodingCategory::Utf8Sig.mask());
        if multibyte {
            info.find(CodingCategory::Utf8Nosig.mask());
        }
    }
}
