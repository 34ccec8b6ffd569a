use fast_coding::{CodingCategory, DetectOptions, EolType, Error, Registry, api};
use pretty_assertions::assert_eq;

fn detect(registry: &Registry, bytes: &[u8]) -> fast_coding::DetectionResult {
    api::detect(registry, bytes, DetectOptions::default()).unwrap()
}

#[test]
fn test_ascii_reports_highest_priority_ascii_safe_category() {
    let mut registry = Registry::new();
    let result = detect(&registry, b"plain text\n");
    assert_eq!(result.category, CodingCategory::Iso7);
    assert_eq!(result.coding.name, "undecided-unix");

    registry.set_category_priority(&[CodingCategory::Utf16BeNosig, CodingCategory::Sjis]);
    let result = detect(&registry, b"plain text\n");
    assert_eq!(result.category, CodingCategory::Sjis);
    assert_eq!(result.coding.name, "undecided-unix");
}

#[test]
fn test_single_nul_means_binary() {
    let registry = Registry::new();
    let bytes = "caf\u{e9} \u{3042}\0ok".as_bytes();
    let result = detect(&registry, bytes);
    assert!(result.null_byte);
    assert_eq!(result.coding.name, "no-conversion");

    let options = DetectOptions {
        null_byte_detection: false,
        ..DetectOptions::default()
    };
    let result = api::detect(&registry, bytes, options).unwrap();
    assert_eq!(result.coding.name, "utf-8");
}

#[test]
fn test_signature_selects_utf8_with_signature() {
    let registry = Registry::new();
    let result = detect(&registry, b"\xEF\xBB\xBFabc\r\n");
    assert!(result.bom_detected);
    assert_eq!(result.coding.name, "utf-8-with-signature-dos");
    assert_eq!(result.eol, EolType::Dos);
}

#[test]
fn test_coding_priority_reorders_candidates() {
    let mut registry = Registry::new();
    let bytes = [0x82, 0xA0, 0x82, 0xA2];
    let options = DetectOptions {
        highest: false,
        ..DetectOptions::default()
    };
    let before: Vec<String> = api::detect(&registry, &bytes, options)
        .unwrap()
        .candidates
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert!(before.contains(&"shift_jis".to_string()));

    registry.set_coding_priority(&["shift_jis"]).unwrap();
    let result = api::detect(&registry, &bytes, options).unwrap();
    assert_eq!(result.candidates[0].name, "shift_jis");
    assert_eq!(result.coding.name, "shift_jis");
}

#[test]
fn test_config_defined_coding_joins_detection() {
    let mut registry = Registry::new();
    registry
        .load_config(
            r#"{
                "coding_systems": [
                    {"name": "latin-table", "codec": {"type": "charset-table"},
                     "charsets": ["iso-8859-1"], "mnemonic": "L"}
                ],
                "category_priority": ["charset"]
            }"#,
        )
        .unwrap();

    let result = detect(&registry, b"caf\xE9");
    assert_eq!(result.category, CodingCategory::Charset);
    assert_eq!(result.coding.name, "latin-table");
    assert_eq!(
        api::decode_to_string(&registry, "latin-table", b"caf\xE9").unwrap(),
        "caf\u{e9}"
    );
}

#[test]
fn test_unknown_names_are_errors() {
    let mut registry = Registry::new();
    assert!(matches!(
        api::decode(&registry, "utf-9", b""),
        Err(Error::UnknownCodingSystem(_))
    ));
    assert!(matches!(
        registry.set_coding_priority(&["utf-9"]),
        Err(Error::UnknownCodingSystem(_))
    ));
}
