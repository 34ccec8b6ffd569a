//! Codecs driven by a charset list.
//!
//! Each first byte maps to the charsets whose code space starts with it,
//! shortest dimension first. Decoding takes the first candidate whose code
//! space accepts the following bytes and that maps the code; encoding takes
//! the first charset of the list that contains the character.

use crate::charset::{CharsetId, CharsetRegistry, char_charset};
use crate::coding::CodingCategory;
use crate::detection::DetectionInfo;
use crate::multibyte::{char_is_byte8, char_to_byte8};
use crate::session::{CodingResult, Session};

/// First-byte lookup table of a charset-list codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharsetTable {
    charsets: Vec<CharsetId>,
    by_first_byte: Vec<Vec<CharsetId>>,
}

impl CharsetTable {
    /// Builds the table for `list`, in list order within each dimension.
    pub fn build(charsets: &dyn CharsetRegistry, list: &[CharsetId]) -> Self {
        let mut by_first_byte = vec![Vec::new(); 256];
        let mut sorted = list.to_vec();
        sorted.sort_by_key(|&id| charsets.dimension(id));
        for id in sorted {
            let (lo, hi) = charsets.code_space(id, 0);
            if lo > hi {
                continue;
            }
            for b in lo..=hi {
                by_first_byte[usize::from(b)].push(id);
            }
        }
        Self {
            charsets: list.to_vec(),
            by_first_byte,
        }
    }

    /// Charsets whose codes may start with `b`.
    #[inline]
    pub fn candidates(&self, b: u8) -> &[CharsetId] {
        &self.by_first_byte[usize::from(b)]
    }

    /// The charset list, in priority order.
    pub fn charsets(&self) -> &[CharsetId] {
        &self.charsets
    }
}

enum Step {
    Char(CharsetId, u32, usize),
    NeedMore,
    Invalid,
}

fn read_code(charsets: &dyn CharsetRegistry, table: &CharsetTable, bytes: &[u8]) -> Step {
    let mut need_more = false;
    for &id in table.candidates(bytes[0]) {
        let dim = usize::from(charsets.dimension(id));
        if bytes.len() < dim {
            let prefix_fits = (1..bytes.len()).all(|i| charsets.in_code_space(id, i, bytes[i]));
            need_more |= prefix_fits;
            continue;
        }
        if !(1..dim).all(|i| charsets.in_code_space(id, i, bytes[i])) {
            continue;
        }
        let code = bytes[..dim]
            .iter()
            .fold(0u32, |code, &b| (code << 8) | u32::from(b));
        if let Some(c) = charsets.decode(id, code) {
            return Step::Char(id, c, dim);
        }
    }
    if need_more {
        Step::NeedMore
    } else {
        Step::Invalid
    }
}

pub(crate) fn decode(s: &mut Session<'_>, table: &CharsetTable) {
    let charsets = s.charsets;
    let annotate = s.options.annotate_charsets;
    let end = s.src.len();
    let mut pos = s.consumed;

    while pos < end && !s.charbuf.is_full() {
        match read_code(charsets, table, &s.src[pos..]) {
            Step::Char(id, c, len) => {
                s.charbuf.push_charset_char(id, c, annotate);
                pos += len;
            }
            Step::NeedMore => {
                s.result = CodingResult::InsufficientSource;
                break;
            }
            Step::Invalid => {
                let b = s.src[pos];
                s.emit_raw(b);
                pos += 1;
            }
        }
    }
    s.consumed = pos;
}

pub(crate) fn encode(s: &mut Session<'_>, table: &CharsetTable) {
    super::encode_chars(s, |s, c| {
        if char_is_byte8(c) {
            s.dst.push(char_to_byte8(c));
            return true;
        }
        let Some((id, code)) = char_charset(s.charsets, table.charsets(), c) else {
            return false;
        };
        let dim = usize::from(s.charsets.dimension(id));
        let bytes = code.to_be_bytes();
        s.dst.extend(&bytes[4 - dim..]);
        true
    });
}

/// Classifier for the charset-table category.
pub(crate) fn detect(
    src: &[u8],
    info: &mut DetectionInfo,
    charsets: &dyn CharsetRegistry,
    table: &CharsetTable,
) {
    let mask = CodingCategory::Charset.mask();
    info.check(mask);
    let mut pos = 0;
    let mut eight_bit = false;
    while pos < src.len() {
        match read_code(charsets, table, &src[pos..]) {
            Step::Char(_, _, len) => {
                eight_bit |= src[pos..pos + len].iter().any(|&b| b >= 0x80);
                pos += len;
            }
            Step::NeedMore => break,
            Step::Invalid => {
                info.reject(mask);
                return;
            }
        }
    }
    if eight_bit {
        info.find(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::Charsets;
    use crate::coding::{CodecSpec, CodingSystemSpec, EolType};
    use crate::multibyte::byte8_to_char;
    use crate::{Registry, api};

    fn big5_table(registry: &mut Registry) {
        let spec = CodingSystemSpec::new("big5-table", CodecSpec::CharsetTable)
            .charsets(["ascii", "big5"])
            .eol(EolType::Unix);
        registry.define_coding_system(spec).unwrap();
    }

    #[test]
    fn test_candidates_are_sorted_by_dimension() {
        let cs = Charsets::standard();
        let list = [
            cs.lookup("japanese-jisx0208").unwrap(),
            cs.lookup("ascii").unwrap(),
        ];
        let table = CharsetTable::build(&cs, &list);
        assert_eq!(table.candidates(0x30), &[list[1], list[0]]);
        assert_eq!(table.candidates(0x10), &[list[1]]);
        assert!(table.candidates(0x80).is_empty());
    }

    #[test]
    fn test_iso_8859_1_round_trip() {
        let registry = Registry::new();
        let bytes: Vec<u8> = (0x20..=0xFF).collect();
        let decoded = api::decode(&registry, "iso-8859-1-unix", &bytes).unwrap();
        let expected: Vec<u32> = (0x20..=0xFF).collect();
        assert_eq!(decoded.text.chars, expected);
        let encoded = api::encode(&registry, "iso-8859-1-unix", &decoded.text.chars).unwrap();
        assert_eq!(encoded.bytes, bytes);
        let lossy = api::encode(&registry, "iso-8859-1-unix", &[0x3042]).unwrap();
        assert_eq!(lossy.bytes, b"?");
    }

    #[test]
    fn test_incomplete_code_is_held_back_then_flushed() {
        let mut registry = Registry::new();
        big5_table(&mut registry);
        let decoded = api::decode(&registry, "big5-table", &[0x41, 0xA4, 0x40, 0xA4]).unwrap();
        assert_eq!(decoded.text.chars.len(), 3);
        assert_eq!(decoded.text.chars[2], byte8_to_char(0xA4));
        assert_eq!(decoded.report.invalid, 1);
        let same = api::decode(&registry, "big5-unix", &[0xA4, 0x40]).unwrap();
        assert_eq!(decoded.text.chars[1], same.text.chars[0]);
    }

    #[test]
    fn test_detect_rejects_unmapped_bytes() {
        let cs = Charsets::standard();
        let table = CharsetTable::build(&cs, &[cs.lookup("ascii").unwrap()]);
        let mut info = DetectionInfo::default();
        detect(b"plain", &mut info, &cs, &table);
        assert!(!info.found.has(CodingCategory::Charset));
        detect(&[0x41, 0xE9], &mut info, &cs, &table);
        assert!(info.rejected.has(CodingCategory::Charset));
    }
}
