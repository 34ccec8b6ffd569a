//! One-call conversions over a [`Registry`].
//!
//! Each function resolves the coding system by name (aliases and
//! end-of-line suffixes included), runs a whole conversion and returns the
//! result with its [`Report`].

use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::buffer::DecodedText;
use crate::charset::{CharsetRegistry, char_charset};
use crate::codec::{big5, sjis};
use crate::coding::{CodecKind, CodingSystem};
use crate::detection::{DetectOptions, DetectionResult, EncodingDetector};
use crate::multibyte::{
    MAX_UNICODE_CHAR, char_is_byte8, chars_from_multibyte, chars_of, chars_to_string_lossy,
    is_valid_char,
};
use crate::registry::Registry;
use crate::session::{ConvertOptions, Report};
use crate::Result;

/// Output of a decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Decoded characters and annotations.
    pub text: DecodedText,
    /// Conversion summary.
    pub report: Report,
}

/// Output of an encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Encoded {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Conversion summary.
    pub report: Report,
}

/// Decodes `bytes` as a complete source.
pub fn decode(registry: &Registry, coding: &str, bytes: &[u8]) -> Result<Decoded> {
    decode_with(registry, coding, bytes, ConvertOptions::default())
}

/// Decodes `bytes` with explicit options.
///
/// Unless `options.last_block` is set, an incomplete trailing sequence is
/// left unconsumed and the report says `InsufficientSource`.
pub fn decode_with(
    registry: &Registry,
    coding: &str,
    bytes: &[u8],
    options: ConvertOptions,
) -> Result<Decoded> {
    let mut decoder = registry.decoder_with(coding, options)?;
    let text = decoder.feed(bytes, options.last_block);
    let report = decoder.report();
    debug!(
        coding = %report.coding,
        consumed = report.consumed,
        produced = report.produced,
        invalid = report.invalid,
        result = %report.result,
        "decoded"
    );
    Ok(Decoded { text, report })
}

/// Decodes `bytes` into a `String`; characters outside Unicode become U+FFFD.
pub fn decode_to_string(registry: &Registry, coding: &str, bytes: &[u8]) -> Result<String> {
    decode(registry, coding, bytes).map(|decoded| decoded.text.to_string_lossy())
}

/// Encodes `chars` as a complete text.
pub fn encode(registry: &Registry, coding: &str, chars: &[u32]) -> Result<Encoded> {
    encode_with(registry, coding, chars, ConvertOptions::default())
}

/// Encodes `chars` with explicit options.
pub fn encode_with(
    registry: &Registry,
    coding: &str,
    chars: &[u32],
    options: ConvertOptions,
) -> Result<Encoded> {
    let text = DecodedText {
        chars: chars.to_vec(),
        annotations: Vec::new(),
    };
    encode_text(registry, coding, &text, options)
}

/// Encodes annotated text; compositions are written with the coding
/// system's composition syntax when it has one.
pub fn encode_text(
    registry: &Registry,
    coding: &str,
    text: &DecodedText,
    options: ConvertOptions,
) -> Result<Encoded> {
    let mut encoder = registry.encoder_with(coding, options)?;
    let bytes = encoder.feed_text(text, options.last_block);
    let report = encoder.report();
    debug!(
        coding = %report.coding,
        consumed = report.consumed,
        produced = report.produced,
        invalid = report.invalid,
        result = %report.result,
        "encoded"
    );
    Ok(Encoded { bytes, report })
}

/// Encodes a Rust string.
pub fn encode_str(registry: &Registry, coding: &str, text: &str) -> Result<Encoded> {
    encode(registry, coding, &chars_of(text))
}

/// Detects the coding system of `bytes`.
pub fn detect(registry: &Registry, bytes: &[u8], options: DetectOptions) -> Result<DetectionResult> {
    EncodingDetector::with_options(registry, options).detect(bytes)
}

fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

/// Decodes the bytes in `range` of `buf`, replacing them with the internal
/// multibyte form of the result. Returns the new length of the region.
pub fn decode_region(
    registry: &Registry,
    coding: &str,
    buf: &mut Vec<u8>,
    range: Range<usize>,
) -> Result<usize> {
    let range = clamp(range, buf.len());
    let decoded = decode(registry, coding, &buf[range.clone()])?;
    let multibyte = decoded.text.to_multibyte();
    let len = multibyte.len();
    buf.splice(range, multibyte);
    Ok(len)
}

/// Encodes the multibyte text in `range` of `buf`, replacing it with the
/// encoded bytes. Returns the new length of the region.
pub fn encode_region(
    registry: &Registry,
    coding: &str,
    buf: &mut Vec<u8>,
    range: Range<usize>,
) -> Result<usize> {
    let range = clamp(range, buf.len());
    let chars = chars_from_multibyte(&buf[range.clone()]);
    let encoded = encode(registry, coding, &chars)?;
    let len = encoded.bytes.len();
    buf.splice(range, encoded.bytes);
    Ok(len)
}

/// Encodes a file name with the registry's file-name coding system.
pub fn encode_file_name(registry: &Registry, name: &str) -> Result<Vec<u8>> {
    encode_str(registry, registry.file_name_coding(), name).map(|encoded| encoded.bytes)
}

/// Decodes a file name with the registry's file-name coding system.
pub fn decode_file_name(registry: &Registry, bytes: &[u8]) -> Result<String> {
    decode(registry, registry.file_name_coding(), bytes)
        .map(|decoded| chars_to_string_lossy(&decoded.text.chars))
}

/// Shift-JIS code of `c` under the registry's `shift_jis` definition.
pub fn encode_sjis_char(registry: &Registry, c: u32) -> Result<Option<u32>> {
    let coding = registry.get("shift_jis")?;
    Ok(sjis::encode_char(registry.charsets(), &coding.charsets, c))
}

/// Character of a Shift-JIS code under the registry's `shift_jis` definition.
pub fn decode_sjis_char(registry: &Registry, code: u32) -> Result<Option<u32>> {
    let coding = registry.get("shift_jis")?;
    Ok(sjis::decode_char(registry.charsets(), &coding.charsets, code))
}

/// Big5 code of `c` under the registry's `big5` definition.
pub fn encode_big5_char(registry: &Registry, c: u32) -> Result<Option<u32>> {
    let coding = registry.get("big5")?;
    Ok(big5::encode_char(registry.charsets(), &coding.charsets, c))
}

/// Character of a Big5 code under the registry's `big5` definition.
pub fn decode_big5_char(registry: &Registry, code: u32) -> Result<Option<u32>> {
    let coding = registry.get("big5")?;
    Ok(big5::decode_char(registry.charsets(), &coding.charsets, code))
}

/// Whether `coding` can write `c` without substitution.
fn encodable(charsets: &dyn CharsetRegistry, coding: &CodingSystem, c: u32) -> bool {
    if char_is_byte8(c) {
        return true;
    }
    match &coding.kind {
        CodecKind::Utf8 { extended: true, .. } => is_valid_char(c),
        CodecKind::Utf8 { .. } | CodecKind::Utf16 { .. } => {
            c <= MAX_UNICODE_CHAR && !(0xD800..=0xDFFF).contains(&c)
        }
        CodecKind::Sjis => sjis::encode_char(charsets, &coding.charsets, c).is_some(),
        CodecKind::Big5 => big5::encode_char(charsets, &coding.charsets, c).is_some(),
        CodecKind::Iso2022(params) if !params.seven_bits() && (0x80..0xA0).contains(&c) => true,
        CodecKind::Iso2022(_) | CodecKind::EmacsMule => {
            c < 0x20 || c == 0x7F || char_charset(charsets, &coding.charsets, c).is_some()
        }
        CodecKind::CharsetTable(_) => char_charset(charsets, &coding.charsets, c).is_some(),
        CodecKind::Ccl(_) | CodecKind::RawText | CodecKind::Undecided { .. } => true,
    }
}

/// Positions in `chars` that `coding` cannot encode without substitution.
pub fn find_unencodable(registry: &Registry, coding: &str, chars: &[u32]) -> Result<Vec<usize>> {
    let coding = registry.get(coding)?;
    let charsets = registry.charsets();
    Ok(chars
        .iter()
        .enumerate()
        .filter(|&(_, &c)| !encodable(charsets, &coding, c))
        .map(|(i, _)| i)
        .collect())
}

/// Base coding systems able to encode every character of `chars`, in
/// definition order. The detection placeholder is never listed.
pub fn find_coding_systems(registry: &Registry, chars: &[u32]) -> Vec<Arc<CodingSystem>> {
    let charsets = registry.charsets();
    registry
        .coding_systems()
        .into_iter()
        .filter(|coding| !coding.is_undecided())
        .filter(|coding| chars.iter().all(|&c| encodable(charsets, coding, c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multibyte::multibyte_from_chars;
    use crate::session::CodingResult;

    #[test]
    fn test_decode_with_partial_block() {
        let registry = Registry::new();
        let options = ConvertOptions {
            last_block: false,
            ..ConvertOptions::default()
        };
        let decoded = decode_with(&registry, "utf-8-unix", b"ab\xE3\x81", options).unwrap();
        assert_eq!(decoded.text.chars, vec![0x61, 0x62]);
        assert_eq!(decoded.report.result, CodingResult::InsufficientSource);
        assert_eq!(decoded.report.consumed, 2);
    }

    #[test]
    fn test_unknown_coding_system() {
        let registry = Registry::new();
        assert!(decode(&registry, "ebcdic", b"x").is_err());
        assert!(encode_str(&registry, "ebcdic", "x").is_err());
    }

    #[test]
    fn test_regions() {
        let registry = Registry::new();
        let mut buf = b"<<caf\xE9>>".to_vec();
        let len = decode_region(&registry, "iso-latin-1-unix", &mut buf, 2..6).unwrap();
        assert_eq!(len, 5);
        assert_eq!(buf, "<<café>>".as_bytes());

        let len = encode_region(&registry, "iso-latin-1-unix", &mut buf, 2..7).unwrap();
        assert_eq!(len, 4);
        assert_eq!(buf, b"<<caf\xE9>>");
    }

    #[test]
    fn test_file_names() {
        let mut registry = Registry::new();
        assert_eq!(encode_file_name(&registry, "é.txt").unwrap(), "é.txt".as_bytes());
        registry.set_file_name_coding("latin-1").unwrap();
        assert_eq!(encode_file_name(&registry, "é.txt").unwrap(), b"\xE9.txt");
        assert_eq!(decode_file_name(&registry, b"\xE9.txt").unwrap(), "é.txt");
    }

    #[test]
    fn test_char_lookups() {
        let registry = Registry::new();
        let kana = decode_sjis_char(&registry, 0xB1).unwrap().unwrap();
        assert_eq!(kana, 0xFF71);
        assert_eq!(encode_sjis_char(&registry, kana).unwrap(), Some(0xB1));
        assert_eq!(encode_sjis_char(&registry, 0x41).unwrap(), Some(0x41));
        let hanzi = decode_big5_char(&registry, 0xA440).unwrap().unwrap();
        assert_eq!(encode_big5_char(&registry, hanzi).unwrap(), Some(0xA440));
        assert_eq!(encode_big5_char(&registry, 0xE9).unwrap(), None);
    }

    #[test]
    fn test_find_unencodable() {
        let registry = Registry::new();
        let chars = chars_of("aé\u{3042}");
        assert_eq!(find_unencodable(&registry, "iso-latin-1", &chars).unwrap(), vec![2]);
        assert!(find_unencodable(&registry, "utf-8", &chars).unwrap().is_empty());
        let names: Vec<String> = find_coding_systems(&registry, &chars)
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert!(names.contains(&"utf-8".to_string()));
        assert!(names.contains(&"emacs-mule".to_string()));
        assert!(!names.contains(&"iso-latin-1".to_string()));
        assert!(!names.contains(&"undecided".to_string()));
    }

    #[test]
    fn test_c1_controls_agree_with_encoder() {
        let registry = Registry::new();
        let chars = [0x41, 0x85, 0x42];
        assert!(find_unencodable(&registry, "iso-latin-1", &chars).unwrap().is_empty());
        let encoded = encode(&registry, "iso-latin-1", &chars).unwrap();
        assert_eq!(encoded.bytes, vec![0x41, 0x85, 0x42]);
        assert_eq!(encoded.report.invalid, 0);
        assert_eq!(find_unencodable(&registry, "iso-2022-jp", &chars).unwrap(), vec![1]);
        let names: Vec<String> = find_coding_systems(&registry, &chars)
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert!(names.contains(&"iso-latin-1".to_string()));
    }

    #[test]
    fn test_encode_str_round_trip_through_multibyte() {
        let registry = Registry::new();
        let encoded = encode_str(&registry, "utf-16le-unix", "hi\n").unwrap();
        assert_eq!(encoded.bytes, vec![0x68, 0, 0x69, 0, 0x0A, 0]);
        let decoded = decode(&registry, "utf-16le-unix", &encoded.bytes).unwrap();
        assert_eq!(decoded.text.to_multibyte(), multibyte_from_chars(&chars_of("hi\n")));
    }
}
