use fast_coding::multibyte::chars_of;
use fast_coding::{CodingResult, ConvertOptions, Registry, StreamingTranslator, api};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Splits `bytes` at the given cut points and decodes the pieces in order.
fn decode_pieces(registry: &Registry, coding: &str, bytes: &[u8], cuts: &[usize]) -> Vec<u32> {
    let mut cuts: Vec<usize> = cuts.iter().map(|&c| c % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut decoder = registry.decoder(coding).unwrap();
    let mut chars = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chars.extend(decoder.feed(&bytes[start..cut], false).chars);
        start = cut;
    }
    chars.extend(decoder.feed(&bytes[start..], true).chars);
    chars
}

fn encode_pieces(registry: &Registry, coding: &str, chars: &[u32], cuts: &[usize]) -> Vec<u8> {
    let mut cuts: Vec<usize> = cuts.iter().map(|&c| c % (chars.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut encoder = registry.encoder(coding).unwrap();
    let mut bytes = Vec::new();
    let mut start = 0;
    for cut in cuts {
        bytes.extend(encoder.feed(&chars[start..cut], false));
        start = cut;
    }
    bytes.extend(encoder.feed(&chars[start..], true));
    bytes
}

fn text_alphabet(registry: &Registry) -> Vec<u32> {
    let mut chars = chars_of("az AZ09\n");
    for code in [0x82A0, 0x8140, 0x889F] {
        chars.push(api::decode_sjis_char(registry, code).unwrap().unwrap());
    }
    chars
}

proptest! {
    #[test]
    fn test_utf8_chunking_never_changes_output(
        bytes in prop::collection::vec(any::<u8>(), 0..96),
        cuts in prop::collection::vec(any::<usize>(), 0..6),
    ) {
        let registry = Registry::new();
        let whole = api::decode(&registry, "utf-8-unix", &bytes).unwrap().text.chars;
        prop_assert_eq!(decode_pieces(&registry, "utf-8-unix", &bytes, &cuts), whole);
    }

    #[test]
    fn test_stateful_chunking_never_changes_output(
        picks in prop::collection::vec(0usize..100, 0..40),
        cuts in prop::collection::vec(any::<usize>(), 0..6),
    ) {
        let registry = Registry::new();
        let alphabet = text_alphabet(&registry);
        let chars: Vec<u32> = picks.iter().map(|&i| alphabet[i % alphabet.len()]).collect();
        for coding in [
            "iso-2022-jp-unix",
            "euc-jp-unix",
            "shift_jis-unix",
            "utf-16le-unix",
            "emacs-mule-unix",
            "utf-8-dos",
        ] {
            let bytes = api::encode(&registry, coding, &chars).unwrap().bytes;
            prop_assert_eq!(encode_pieces(&registry, coding, &chars, &cuts), bytes.clone());
            prop_assert_eq!(decode_pieces(&registry, coding, &bytes, &cuts), chars.clone());
        }
    }
}

#[test]
fn test_character_split_over_three_calls() {
    let registry = Registry::new();
    let mut decoder = registry.decoder("utf-8-unix").unwrap();

    assert!(decoder.feed(&[0xF0, 0x9F], false).is_empty());
    assert_eq!(decoder.report().result, CodingResult::InsufficientSource);
    assert!(decoder.feed(&[0x98], false).is_empty());
    let text = decoder.feed(&[0x80], true);

    assert_eq!(text.chars, vec![0x1F600]);
    let report = decoder.report();
    assert_eq!(report.result, CodingResult::Success);
    assert_eq!(report.consumed, 4);
    assert_eq!(report.produced, 1);
}

#[test]
fn test_undecided_detects_from_the_first_chunks() {
    let registry = Registry::new();
    let mut decoder = registry.decoder("undecided").unwrap();
    let mut chars = decoder.feed("h\u{e9}".as_bytes(), false).chars;
    chars.extend(decoder.feed(b"llo\r\n", true).chars);

    assert_eq!(chars, chars_of("h\u{e9}llo\n"));
    assert_eq!(decoder.report().coding, "utf-8-dos");
}

#[test]
fn test_streaming_translator_shift_jis_to_euc() {
    let registry = Registry::new();
    let mut stream = StreamingTranslator::new(&registry, "sjis", "euc-japan").unwrap();

    let mut output = Vec::new();
    for chunk in [&[0x41, 0x82][..], &[0xA0, 0xB1][..], &[][..]] {
        output.extend(stream.process_chunk(chunk, chunk.is_empty()));
    }

    assert_eq!(output, vec![0x41, 0xA4, 0xA2, 0x8E, 0xB1]);
}

#[test]
fn test_fixed_destination_stops_between_characters() {
    let registry = Registry::new();
    let options = ConvertOptions {
        destination_limit: Some(5),
        ..ConvertOptions::default()
    };
    let chars = chars_of("\u{3042}\u{3044}\u{3046}");

    let encoded = api::encode_with(&registry, "utf-8-unix", &chars, options).unwrap();

    assert_eq!(encoded.bytes, "\u{3042}".as_bytes());
    assert_eq!(encoded.report.result, CodingResult::InsufficientDestination);
    assert_eq!(encoded.report.consumed, 1);
}

#[test]
fn test_fixed_destination_below_safe_room_still_fills() {
    let registry = Registry::new();
    let options = ConvertOptions {
        destination_limit: Some(2),
        ..ConvertOptions::default()
    };

    let encoded = api::encode_with(&registry, "utf-8-unix", &chars_of("abc"), options).unwrap();

    assert_eq!(encoded.bytes, b"ab");
    assert_eq!(encoded.report.result, CodingResult::InsufficientDestination);
    assert_eq!(encoded.report.consumed, 2);
}

#[test]
fn test_stray_cr_before_crlf_lines_decodes_as_dos() {
    let registry = Registry::new();
    let bytes = b"a\rb\r\nc\r\n";
    let expected = chars_of("a\rb\nc\n");

    let whole = api::decode(&registry, "utf-8", bytes).unwrap();
    assert_eq!(whole.text.chars, expected);
    assert_eq!(whole.report.coding, "utf-8-dos");
    assert_eq!(api::decode(&registry, "undecided", bytes).unwrap().text.chars, expected);

    for cut in 0..=bytes.len() {
        assert_eq!(decode_pieces(&registry, "utf-8", bytes, &[cut]), expected, "cut at {cut}");
    }
    let every_byte: Vec<usize> = (1..bytes.len()).collect();
    assert_eq!(decode_pieces(&registry, "utf-8", bytes, &every_byte), expected);
}
