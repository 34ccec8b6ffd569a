//! Shift-JIS.
//!
//! The charset list is read as `[roman, kana, kanji]`: bytes below `0x80`
//! go through the roman set, `0xA1..=0xDF` through the one-byte kana set,
//! and lead bytes `0x81..=0x9F`/`0xE0..=0xEF` start a two-byte kanji code
//! that is folded onto the JIS X 0208 code space.

use crate::charset::{CharsetId, CharsetRegistry};
use crate::coding::CodingCategory;
use crate::detection::DetectionInfo;
use crate::multibyte::{char_is_byte8, char_to_byte8};
use crate::session::{CodingResult, Session};

#[inline]
fn is_lead(b: u8) -> bool {
    matches!(b, 0x81..=0x9F | 0xE0..=0xEF)
}

#[inline]
fn is_trail(b: u8) -> bool {
    matches!(b, 0x40..=0xFC) && b != 0x7F
}

#[inline]
fn is_kana(b: u8) -> bool {
    matches!(b, 0xA1..=0xDF)
}

/// Converts a Shift-JIS byte pair to a JIS X 0208 code.
pub fn sjis_to_jis(s1: u8, s2: u8) -> u32 {
    let (s1, s2) = (u32::from(s1), u32::from(s2));
    let (c1, c2) = if s2 >= 0x9F {
        (s1 * 2 - if s1 >= 0xE0 { 0x160 } else { 0xE0 }, s2 - 0x7E)
    } else {
        (
            s1 * 2 - if s1 >= 0xE0 { 0x161 } else { 0xE1 },
            s2 - if s2 >= 0x7F { 0x20 } else { 0x1F },
        )
    };
    (c1 << 8) | c2
}

/// Converts a JIS X 0208 code to a Shift-JIS byte pair.
pub fn jis_to_sjis(code: u32) -> Option<(u8, u8)> {
    let (j1, j2) = (code >> 8, code & 0xFF);
    if !(0x21..=0x7E).contains(&j1) || !(0x21..=0x7E).contains(&j2) {
        return None;
    }
    let (s1, s2) = if j1 & 1 == 1 {
        (
            j1 / 2 + if j1 < 0x5F { 0x71 } else { 0xB1 },
            j2 + if j2 >= 0x60 { 0x20 } else { 0x1F },
        )
    } else {
        (j1 / 2 + if j1 < 0x5F { 0x70 } else { 0xB0 }, j2 + 0x7E)
    };
    Some((s1 as u8, s2 as u8))
}

/// The `[roman, kana, kanji]` charsets of a coding system's list.
fn roles(list: &[CharsetId]) -> (Option<CharsetId>, Option<CharsetId>, Option<CharsetId>) {
    (list.first().copied(), list.get(1).copied(), list.get(2).copied())
}

fn decode_roman(charsets: &dyn CharsetRegistry, roman: Option<CharsetId>, b: u8) -> u32 {
    match roman {
        Some(id) if !charsets.ascii_compatible(id) => {
            charsets.decode(id, u32::from(b)).unwrap_or(u32::from(b))
        }
        _ => u32::from(b),
    }
}

/// Decodes a one- or two-byte Shift-JIS code (`0x82A0`, `0xB1`, ...).
pub fn decode_char(charsets: &dyn CharsetRegistry, list: &[CharsetId], code: u32) -> Option<u32> {
    let (roman, kana, kanji) = roles(list);
    if code < 0x80 {
        return Some(decode_roman(charsets, roman, code as u8));
    }
    if code < 0x100 {
        let b = code as u8;
        return is_kana(b).then(|| charsets.decode(kana?, u32::from(b & 0x7F)))?;
    }
    let (s1, s2) = ((code >> 8) as u8, (code & 0xFF) as u8);
    if code > 0xFFFF || !is_lead(s1) || !is_trail(s2) {
        return None;
    }
    charsets.decode(kanji?, sjis_to_jis(s1, s2))
}

/// Shift-JIS code of `c`, as a one- or two-byte value.
pub fn encode_char(charsets: &dyn CharsetRegistry, list: &[CharsetId], c: u32) -> Option<u32> {
    let (roman, kana, kanji) = roles(list);
    if let Some(id) = roman {
        if charsets.ascii_compatible(id) {
            if c < 0x80 {
                return Some(c);
            }
        } else if let Some(code) = charsets.encode(id, c) {
            return Some(code);
        } else if c < 0x80 && charsets.decode(id, c) == Some(c) {
            return Some(c);
        }
    } else if c < 0x80 {
        return Some(c);
    }
    if let Some(code) = kana.and_then(|id| charsets.encode(id, c)) {
        return Some(code | 0x80);
    }
    let code = kanji.and_then(|id| charsets.encode(id, c))?;
    let (s1, s2) = jis_to_sjis(code)?;
    Some((u32::from(s1) << 8) | u32::from(s2))
}

pub(crate) fn decode(s: &mut Session<'_>) {
    let charsets = s.charsets;
    let (roman, kana, kanji) = roles(&s.coding.charsets);
    let annotate = s.options.annotate_charsets;
    let end = s.src.len();
    let mut pos = s.consumed;

    while pos < end && !s.charbuf.is_full() {
        let b = s.src[pos];
        if b < 0x80 {
            let c = decode_roman(charsets, roman, b);
            match roman {
                Some(id) => s.charbuf.push_charset_char(id, c, annotate),
                None => s.charbuf.push_plain_char(c),
            }
            pos += 1;
        } else if is_kana(b) {
            match kana.and_then(|id| Some((id, charsets.decode(id, u32::from(b & 0x7F))?))) {
                Some((id, c)) => s.charbuf.push_charset_char(id, c, annotate),
                None => s.emit_raw(b),
            }
            pos += 1;
        } else if is_lead(b) {
            let Some(&b2) = s.src.get(pos + 1) else {
                s.result = CodingResult::InsufficientSource;
                break;
            };
            let decoded = if is_trail(b2) {
                kanji.and_then(|id| Some((id, charsets.decode(id, sjis_to_jis(b, b2))?)))
            } else {
                None
            };
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
        } else {
            s.emit_raw(b);
            pos += 1;
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

/// Classifier for the Shift-JIS category.
pub(crate) fn detect(src: &[u8], info: &mut DetectionInfo) {
    let mask = CodingCategory::Sjis.mask();
    info.check(mask);
    let mut found = false;
    let mut pos = 0;
    while pos < src.len() {
        let b = src[pos];
        if b < 0x80 {
            pos += 1;
        } else if is_kana(b) {
            found = true;
            pos += 1;
        } else if is_lead(b) {
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
        } else {
            info.reject(mask);
            return;
        }
    }
    if found {
        info.find(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::PRIVATE_CHARSET_BASE;
    use crate::{Registry, api};

    #[test]
    fn test_sjis_jis_conversion() {
        assert_eq!(sjis_to_jis(0x81, 0x40), 0x2121);
        assert_eq!(sjis_to_jis(0x82, 0xA0), 0x2422);
        assert_eq!(sjis_to_jis(0xEF, 0xFC), 0x7E7E);
        assert_eq!(jis_to_sjis(0x2121), Some((0x81, 0x40)));
        assert_eq!(jis_to_sjis(0x2422), Some((0x82, 0xA0)));
        assert_eq!(jis_to_sjis(0x7E7E), Some((0xEF, 0xFC)));
        assert_eq!(jis_to_sjis(0x2020), None);
        for j1 in 0x21..=0x7E {
            for j2 in 0x21..=0x7E {
                let code = (j1 << 8) | j2;
                let (s1, s2) = jis_to_sjis(code).unwrap();
                assert!(is_lead(s1) && is_trail(s2), "{code:#X}");
                assert_eq!(sjis_to_jis(s1, s2), code);
            }
        }
    }

    #[test]
    fn test_decode_mixed_text() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "shift_jis-unix", &[0x41, 0xB1, 0x82, 0xA0]).unwrap();
        let hiragana_a = PRIVATE_CHARSET_BASE + (0x24 - 0x21) * 94 + (0x22 - 0x21);
        assert_eq!(decoded.text.chars, vec![0x41, 0xFF71, hiragana_a]);
        let encoded = api::encode(&registry, "shift_jis-unix", &decoded.text.chars).unwrap();
        assert_eq!(encoded.bytes, vec![0x41, 0xB1, 0x82, 0xA0]);
    }

    #[test]
    fn test_bad_trail_resyncs() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "shift_jis-unix", &[0x82, 0x20, 0x41]).unwrap();
        assert_eq!(decoded.text.chars.len(), 3);
        assert_eq!(decoded.text.chars[1..], [0x20, 0x41]);
        assert_eq!(decoded.report.invalid, 1);
    }

    #[test]
    fn test_detect() {
        let mut info = DetectionInfo::default();
        detect(&[0x82, 0xA0, 0x41], &mut info);
        assert!(info.found.has(CodingCategory::Sjis));
        let mut info = DetectionInfo::default();
        detect(&[0x82, 0x20], &mut info);
        assert!(info.rejected.has(CodingCategory::Sjis));
    }
}
