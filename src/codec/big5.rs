//! Big5.
//!
//! The charset list is read as `[roman, big5]`. Lead bytes `0xA1..=0xFE`
//! take one trail byte from `0x40..=0x7E` or `0xA1..=0xFE`.

use crate::charset::{CharsetId, CharsetRegistry};
use crate::coding::CodingCategory;
use crate::detection::DetectionInfo;
use crate::multibyte::{char_is_byte8, char_to_byte8};
use crate::session::{CodingResult, Session};

#[inline]
fn is_lead(b: u8) -> bool {
    matches!(b, 0xA1..=0xFE)
}

#[inline]
fn is_trail(b: u8) -> bool {
    matches!(b, 0x40..=0x7E | 0xA1..=0xFE)
}

/// Decodes a one- or two-byte Big5 code.
pub fn decode_char(charsets: &dyn CharsetRegistry, list: &[CharsetId], code: u32) -> Option<u32> {
    if code < 0x80 {
        return Some(code);
    }
    let (lead, trail) = ((code >> 8) as u8, (code & 0xFF) as u8);
    if code > 0xFFFF || !is_lead(lead) || !is_trail(trail) {
        return None;
    }
    charsets.decode(*list.get(1)?, code)
}

/// Big5 code of `c`.
pub fn encode_char(charsets: &dyn CharsetRegistry, list: &[CharsetId], c: u32) -> Option<u32> {
    if c < 0x80 {
        return Some(c);
    }
    let code = charsets.encode(*list.get(1)?, c)?;
    is_trail((code & 0xFF) as u8).then_some(code)
}

pub(crate) fn decode(s: &mut Session<'_>) {
    let charsets = s.charsets;
    let roman = s.coding.charsets.first().copied();
    let big5 = s.coding.charsets.get(1).copied();
    let annotate = s.options.annotate_charsets;
    let end = s.src.len();
    let mut pos = s.consumed;

    while pos < end && !s.charbuf.is_full() {
        let b = s.src[pos];
        if b < 0x80 {
            match roman {
                Some(id) => s.charbuf.push_charset_char(id, u32::from(b), annotate),
                None => s.charbuf.push_plain_char(u32::from(b)),
            }
            pos += 1;
            continue;
        }
        if !is_lead(b) {
            s.emit_raw(b);
            pos += 1;
            continue;
        }
        let Some(&b2) = s.src.get(pos + 1) else {
            s.result = CodingResult::InsufficientSource;
            break;
        };
        let code = (u32::from(b) << 8) | u32::from(b2);
        let decoded = big5
            .filter(|_| is_trail(b2))
            .and_then(|id| Some((id, charsets.decode(id, code)?)));
        match decoded {
            Some((id, c)) => {
                s.charbuf.push_charset_char(id, c, annotate);
                pos += 2;
            }
            None => {
                s.emit_raw(b);
                pos += 1;
            }
        }
    }
    s.consumed = pos;
}

pub(crate) fn encode(s: &mut Session<'_>) {
    let coding = std::sync::Arc::clone(&s.coding);
    super::encode_chars(s, |s, c| {
        if char_is_byte8(c) {
            s.dst.push(char_to_byte8(c));
            return true;
        }
        match encode_char(s.charsets, &coding.charsets, c) {
            Some(code) if code > 0xFF => {
                s.dst.extend(&[(code >> 8) as u8, code as u8]);
                true
            }
            Some(code) => {
                s.dst.push(code as u8);
                true
            }
            None => false,
        }
    });
}

/// Classifier for the Big5 category.
pub(crate) fn detect(src: &[u8], info: &mut DetectionInfo) {
    let mask = CodingCategory::Big5.mask();
    info.check(mask);
    let mut found = false;
    let mut pos = 0;
    while pos < src.len() {
        let b = src[pos];
        if b < 0x80 {
            pos += 1;
            continue;
        }
        if !is_lead(b) {
            info.reject(mask);
            return;
        }
        match src.get(pos + 1) {
            Some(&b2) if is_trail(b2) => {
                found = true;
                pos += 2;
            }
            Some(_) => {
                info.reject(mask);
                return;
            }
            None => break,
        }
    }
    if found {
        info.find(mask);
    }
}
