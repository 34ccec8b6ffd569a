//! UTF-16 in either byte order, with optional signature.

use crate::buffer::Destination;
use crate::coding::{BomPolicy, CategoryMask, CodingCategory, Endian};
use crate::detection::DetectionInfo;
use crate::multibyte::MAX_UNICODE_CHAR;
use crate::session::{CodingResult, Session};

#[inline]
fn unit(bytes: [u8; 2], endian: Endian) -> u16 {
    match endian {
        Endian::Big => u16::from_be_bytes(bytes),
        Endian::Little => u16::from_le_bytes(bytes),
    }
}

#[inline]
fn is_high(u: u16) -> bool {
    (0xD800..0xDC00).contains(&u)
}

#[inline]
fn is_low(u: u16) -> bool {
    (0xDC00..0xE000).contains(&u)
}

fn bom_endian(bytes: &[u8]) -> Option<Endian> {
    match bytes.get(..2)? {
        [0xFE, 0xFF] => Some(Endian::Big),
        [0xFF, 0xFE] => Some(Endian::Little),
        _ => None,
    }
}

pub(crate) fn decode(s: &mut Session<'_>, bom: BomPolicy, default_endian: Endian) {
    let end = s.src.len();
    let mut pos = s.consumed;

    if !s.state.utf.bom_done {
        if bom != BomPolicy::NoBom {
            if end - pos < 2 && !s.last_block {
                if end > pos {
                    s.result = CodingResult::InsufficientSource;
                }
                return;
            }
            match (bom, bom_endian(&s.src[pos..])) {
                (BomPolicy::AutoDetectBom, Some(endian)) => {
                    s.state.utf.endian = Some(endian);
                    pos += 2;
                }
                (BomPolicy::WithBom, Some(endian)) if endian == default_endian => pos += 2,
                _ => {}
            }
        }
        s.state.utf.bom_done = true;
    }
    let endian = s.state.utf.endian.unwrap_or(default_endian);

    while pos < end && !s.charbuf.is_full() {
        if end - pos < 2 {
            s.result = CodingResult::InsufficientSource;
            break;
        }
        let u = unit([s.src[pos], s.src[pos + 1]], endian);
        if is_high(u) {
            if end - pos < 4 {
                s.result = CodingResult::InsufficientSource;
                break;
            }
            let u2 = unit([s.src[pos + 2], s.src[pos + 3]], endian);
            if is_low(u2) {
                let c = 0x10000 + ((u32::from(u) - 0xD800) << 10) + (u32::from(u2) - 0xDC00);
                s.charbuf.push_plain_char(c);
                pos += 4;
                continue;
            }
            // Unpaired high surrogate: keep both of its bytes.
            let (b0, b1) = (s.src[pos], s.src[pos + 1]);
            s.emit_raw(b0);
            s.emit_raw(b1);
        } else if is_low(u) {
            let (b0, b1) = (s.src[pos], s.src[pos + 1]);
            s.emit_raw(b0);
            s.emit_raw(b1);
        } else {
            s.charbuf.push_plain_char(u32::from(u));
        }
        pos += 2;
    }
    s.consumed = pos;
}

fn put_unit(dst: &mut Destination, u: u16, endian: Endian) {
    match endian {
        Endian::Big => dst.extend(&u.to_be_bytes()),
        Endian::Little => dst.extend(&u.to_le_bytes()),
    }
}

fn put_char(dst: &mut Destination, c: u32, endian: Endian) -> bool {
    if c > MAX_UNICODE_CHAR || (0xD800..0xE000).contains(&c) {
        return false;
    }
    if c < 0x10000 {
        put_unit(dst, c as u16, endian);
    } else {
        let v = c - 0x10000;
        put_unit(dst, 0xD800 + (v >> 10) as u16, endian);
        put_unit(dst, 0xDC00 + (v & 0x3FF) as u16, endian);
    }
    true
}

pub(crate) fn encode(s: &mut Session<'_>, bom: BomPolicy, endian: Endian) {
    if !s.state.utf.bom_done {
        if bom != BomPolicy::NoBom {
            put_unit(&mut s.dst, 0xFEFF, endian);
        }
        s.state.utf.bom_done = true;
    }
    super::encode_chars(s, |s, c| put_char(&mut s.dst, c, endian));
}

/// Classifier for the UTF-16 categories.
pub(crate) fn detect(src: &[u8], info: &mut DetectionInfo) {
    info.check(CategoryMask::UTF_16);
    let signed = CodingCategory::Utf16Be.mask()
        | CodingCategory::Utf16Le.mask()
        | CodingCategory::Utf16Auto.mask();
    match bom_endian(src) {
        Some(Endian::Little) => {
            info.find(CodingCategory::Utf16Le.mask() | CodingCategory::Utf16Auto.mask());
            info.reject(CodingCategory::Utf16Be.mask() | CodingCategory::Utf16BeNosig.mask());
            info.reject(CodingCategory::Utf16LeNosig.mask());
            return;
        }
        Some(Endian::Big) => {
            info.find(CodingCategory::Utf16Be.mask() | CodingCategory::Utf16Auto.mask());
            info.reject(CodingCategory::Utf16Le.mask() | CodingCategory::Utf16LeNosig.mask());
            info.reject(CodingCategory::Utf16BeNosig.mask());
            return;
        }
        None => info.reject(signed),
    }
    if src.len() < 2 || src.len() % 2 != 0 {
        info.reject(CategoryMask::UTF_16);
        return;
    }
    let (mut even_zero, mut odd_zero) = (0usize, 0usize);
    for pair in src.chunks_exact(2) {
        even_zero += usize::from(pair[0] == 0);
        odd_zero += usize::from(pair[1] == 0);
    }
    let be = CodingCategory::Utf16BeNosig.mask();
    let le = CodingCategory::Utf16LeNosig.mask();
    // Text in either byte order has a zero in most units of its high byte.
    let pairs = src.len() / 2;
    if odd_zero > even_zero && odd_zero * 2 > pairs {
        info.find(le);
        info.reject(be);
    } else if even_zero > odd_zero && even_zero * 2 > pairs {
        info.find(be);
        info.reject(le);
    } else {
        info.reject(be | le);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multibyte::byte8_to_char;
    use crate::{Registry, api};

    #[test]
    fn test_surrogate_pair() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "utf-16be-unix", &[0xD8, 0x3D, 0xDE, 0x00]).unwrap();
        assert_eq!(decoded.text.chars, vec![0x1F600]);
        let encoded = api::encode(&registry, "utf-16le-unix", &[0x1F600]).unwrap();
        assert_eq!(encoded.bytes, vec![0x3D, 0xD8, 0x00, 0xDE]);
    }

    #[test]
    fn test_unpaired_high_surrogate_kept_as_raw_bytes() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "utf-16be-unix", &[0xD8, 0x00, 0x00, 0x41]).unwrap();
        assert_eq!(decoded.text.chars, vec![byte8_to_char(0xD8), 0x00, 0x41]);
        assert_eq!(decoded.report.result, CodingResult::InvalidSource);
    }

    #[test]
    fn test_bom_selects_byte_order() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "utf-16-unix", &[0xFF, 0xFE, 0x41, 0x00]).unwrap();
        assert_eq!(decoded.text.chars, vec![0x41]);
        let decoded = api::decode(&registry, "utf-16-unix", &[0x00, 0x41]).unwrap();
        assert_eq!(decoded.text.chars, vec![0x41]);
        let encoded = api::encode(&registry, "utf-16-unix", &[0x41]).unwrap();
        assert_eq!(encoded.bytes, vec![0xFE, 0xFF, 0x00, 0x41]);
    }

    #[test]
    fn test_odd_trailing_byte_is_raw() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "utf-16le-unix", &[0x41, 0x00, 0xE9]).unwrap();
        assert_eq!(decoded.text.chars, vec![0x41, byte8_to_char(0xE9)]);
    }

    #[test]
    fn test_detect_without_signature() {
        let mut info = DetectionInfo::default();
        detect(&[0x41, 0x00, 0x42, 0x00], &mut info);
        assert!(info.found.has(CodingCategory::Utf16LeNosig));
        assert!(info.rejected.has(CodingCategory::Utf16BeNosig));
        assert!(info.rejected.has(CodingCategory::Utf16Auto));
    }
}
