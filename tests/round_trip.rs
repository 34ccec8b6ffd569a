use fast_coding::multibyte::{byte8_to_char, chars_of};
use fast_coding::{CodingResult, Registry, api};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const UNICODE_CODINGS: [&str; 4] = ["utf-8-unix", "utf-16le-unix", "utf-16be-unix", "utf-8-emacs-unix"];

/// A Shift-JIS/EUC/ISO-2022-JP friendly alphabet: ASCII, half-width kana
/// and a few JIS X 0208 characters.
fn japanese_alphabet(registry: &Registry) -> Vec<u32> {
    let mut chars = chars_of("abcXYZ019 .,\n");
    for code in [0x82A0, 0x82A2, 0x88A0, 0x8140, 0x9FA0] {
        chars.push(api::decode_sjis_char(registry, code).unwrap().unwrap());
    }
    chars
}

fn round_trip(registry: &Registry, coding: &str, chars: &[u32]) -> Vec<u32> {
    let encoded = api::encode(registry, coding, chars).unwrap();
    assert_eq!(encoded.report.invalid, 0, "{coding} substituted characters");
    let decoded = api::decode(registry, coding, &encoded.bytes).unwrap();
    assert_eq!(decoded.report.result, CodingResult::Success);
    decoded.text.chars
}

proptest! {
    #[test]
    fn test_unicode_round_trip(text in any::<Vec<char>>()) {
        let registry = Registry::new();
        let chars: Vec<u32> = text.iter().map(|&c| u32::from(c)).collect();
        for coding in UNICODE_CODINGS {
            prop_assert_eq!(round_trip(&registry, coding, &chars), chars.clone());
        }
    }

    #[test]
    fn test_japanese_round_trip(picks in prop::collection::vec(0usize..1000, 0..48)) {
        let registry = Registry::new();
        let alphabet = japanese_alphabet(&registry);
        let chars: Vec<u32> = picks.iter().map(|&i| alphabet[i % alphabet.len()]).collect();
        for coding in ["shift_jis-unix", "euc-jp-unix", "emacs-mule-unix"] {
            prop_assert_eq!(round_trip(&registry, coding, &chars), chars.clone());
        }
        let no_kana: Vec<u32> = chars.iter().copied().filter(|&c| c != 0xFF71).collect();
        prop_assert_eq!(round_trip(&registry, "iso-2022-jp-unix", &no_kana), no_kana);
    }

    #[test]
    fn test_raw_bytes_are_stable(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let registry = Registry::new();
        let first = api::decode(&registry, "utf-8-unix", &bytes).unwrap();
        let encoded = api::encode(&registry, "utf-8-unix", &first.text.chars).unwrap();
        prop_assert_eq!(&encoded.bytes, &bytes);
        let second = api::decode(&registry, "utf-8-unix", &encoded.bytes).unwrap();
        prop_assert_eq!(second.text.chars, first.text.chars);
    }

    #[test]
    fn test_raw_text_is_identity(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "no-conversion", &bytes).unwrap();
        let encoded = api::encode(&registry, "no-conversion", &decoded.text.chars).unwrap();
        prop_assert_eq!(encoded.bytes, bytes);
    }
}

#[test]
fn test_overlong_nul_is_two_raw_bytes() {
    let registry = Registry::new();
    let decoded = api::decode(&registry, "utf-8-unix", &[0xC0, 0x80]).unwrap();
    assert_eq!(decoded.text.chars, vec![byte8_to_char(0xC0), byte8_to_char(0x80)]);
    assert_eq!(decoded.report.invalid, 2);
    assert_eq!(decoded.report.result, CodingResult::InvalidSource);
}

#[test]
fn test_high_surrogate_before_non_low_is_kept() {
    let registry = Registry::new();
    let decoded = api::decode(&registry, "utf-16le-unix", &[0x00, 0xD8, 0x41, 0x00]).unwrap();
    assert_eq!(decoded.text.chars, vec![0x00, byte8_to_char(0xD8), 0x41]);
    assert_eq!(decoded.report.result, CodingResult::InvalidSource);
}

#[test]
fn test_dos_scenario() {
    let registry = Registry::new();
    let encoded = api::encode_str(&registry, "utf-8-dos", "h\u{e9}llo\n").unwrap();
    assert_eq!(encoded.bytes, vec![0x68, 0xC3, 0xA9, 0x6C, 0x6C, 0x6F, 0x0D, 0x0A]);

    let decoded = api::decode(&registry, "utf-8-dos", &encoded.bytes).unwrap();
    assert_eq!(decoded.text.chars, chars_of("h\u{e9}llo\n"));
    assert_eq!(decoded.report.eol_seen.names(), vec!["crlf"]);
}

#[test]
fn test_bom_is_not_counted() {
    let registry = Registry::new();
    let decoded = api::decode(&registry, "undecided", b"\xEF\xBB\xBFabc").unwrap();
    assert_eq!(decoded.report.coding, "utf-8-with-signature");
    assert_eq!(decoded.text.chars, chars_of("abc"));
    assert_eq!(decoded.report.produced, 3);
}

#[test]
fn test_latin_1_substitution() {
    let registry = Registry::new();
    let encoded = api::encode(&registry, "iso-latin-1-unix", &[0x41, 0x3042, 0xE9]).unwrap();
    assert_eq!(encoded.bytes, b"A?\xE9");
    assert_eq!(encoded.report.invalid, 1);
    assert_eq!(encoded.report.result, CodingResult::Success);
}
