//! Encoding detection by category classifiers and end-of-line sniffing.
//!
//! Each codec family has a cheap one-pass classifier that marks categories
//! as checked, rejected (the bytes are impossible for it) or found (the bytes
//! carry positive evidence for it). [`EncodingDetector`] runs them under the
//! registry's category priority and maps the winning category to the coding
//! system assigned to it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::codec::{big5, ccl, charset_table, emacs_mule, iso2022, sjis, utf16, utf8};
use crate::coding::{CategoryMask, CodecKind, CodingCategory, CodingSystem, Endian, EolType};
use crate::registry::Registry;
use crate::session::EolSeen;

/// Line terminators examined before the end-of-line convention is decided.
pub const MAX_EOL_SAMPLES: usize = 3;

/// Accumulator filled by the classifiers.
///
/// A category in `found` is never also in `rejected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionInfo {
    /// Categories whose classifier ran.
    pub checked: CategoryMask,
    /// Categories the bytes rule out.
    pub rejected: CategoryMask,
    /// Categories with positive evidence.
    pub found: CategoryMask,
}

impl DetectionInfo {
    /// Marks `mask` as examined.
    #[inline]
    pub fn check(&mut self, mask: CategoryMask) {
        self.checked.insert(mask);
    }

    /// Rules out `mask`, withdrawing any earlier positive verdict.
    #[inline]
    pub fn reject(&mut self, mask: CategoryMask) {
        self.rejected.insert(mask);
        self.found.remove(mask);
    }

    /// Records evidence for the categories of `mask` that are not ruled out.
    #[inline]
    pub fn find(&mut self, mask: CategoryMask) {
        let mut mask = mask;
        mask.remove(self.rejected);
        self.found.insert(mask);
    }
}

/// Detection switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    /// A NUL byte makes the data binary unless it looks like UTF-16.
    pub null_byte_detection: bool,
    /// Escape and shift controls trigger ISO-2022 detection up front.
    pub iso_escape_detection: bool,
    /// Stop at the first category with positive evidence.
    pub highest: bool,
    /// Bytes examined at most.
    pub sample_limit: usize,
    /// Valid multibyte UTF-8 wins over higher-priority categories.
    pub prefer_utf8: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            null_byte_detection: true,
            iso_escape_detection: true,
            highest: true,
            sample_limit: 8192,
            prefer_utf8: true,
        }
    }
}

impl DetectOptions {
    /// Options taken from an undecided coding system's parameters.
    pub fn for_coding(coding: &CodingSystem) -> Self {
        let mut options = Self::default();
        if let CodecKind::Undecided {
            prefer_utf8,
            inhibit_null_byte_detection,
            inhibit_iso_escape_detection,
        } = coding.kind
        {
            options.prefer_utf8 = prefer_utf8;
            options.null_byte_detection = !inhibit_null_byte_detection;
            options.iso_escape_detection = !inhibit_iso_escape_detection;
        }
        options
    }
}

/// Outcome of a detection.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Best coding system, refined to its end-of-line variant when the
    /// convention could be decided.
    pub coding: Arc<CodingSystem>,
    /// Category that won. For pure ASCII this is the highest-priority
    /// ASCII-safe category while `coding` stays undecided.
    pub category: CodingCategory,
    /// End-of-line convention seen in the sample.
    pub eol: EolType,
    /// Every plausible coding system, best first.
    pub candidates: Vec<Arc<CodingSystem>>,
    /// The data starts with a byte-order mark.
    pub bom_detected: bool,
    /// The sample contains a NUL byte.
    pub null_byte: bool,
    /// Final classifier verdicts.
    pub info: DetectionInfo,
}

/// What the fast pre-scan saw.
#[derive(Debug, Default)]
struct Scan {
    null: bool,
    eight_bit: bool,
    iso_control: bool,
    /// A `CR LF` pair starting at an odd offset.
    odd_crlf: bool,
}

impl Scan {
    fn of(sample: &[u8]) -> Self {
        let mut scan = Self::default();
        for (i, &b) in sample.iter().enumerate() {
            match b {
                0x00 => scan.null = true,
                0x1B | 0x0E | 0x0F => scan.iso_control = true,
                b'\r' if i % 2 == 1 && sample.get(i + 1) == Some(&b'\n') => scan.odd_crlf = true,
                0x80..=0xFF => scan.eight_bit = true,
                _ => {}
            }
        }
        scan
    }
}

fn detect_bom(data: &[u8]) -> Option<CodingCategory> {
    if data.starts_with(&utf8::BOM) {
        Some(CodingCategory::Utf8Sig)
    } else if data.starts_with(&[0xFF, 0xFE]) {
        Some(CodingCategory::Utf16Le)
    } else if data.starts_with(&[0xFE, 0xFF]) {
        Some(CodingCategory::Utf16Be)
    } else {
        None
    }
}

/// Byte order a UTF-16 category implies, for end-of-line sniffing.
fn utf16_endian(category: CodingCategory, coding: &CodingSystem) -> Option<Endian> {
    if !CategoryMask::UTF_16.has(category) {
        return None;
    }
    match category {
        CodingCategory::Utf16Le | CodingCategory::Utf16LeNosig => Some(Endian::Little),
        CodingCategory::Utf16Be | CodingCategory::Utf16BeNosig => Some(Endian::Big),
        _ => match coding.kind {
            CodecKind::Utf16 { endian, .. } => Some(endian),
            _ => Some(Endian::Big),
        },
    }
}

/// End-of-line convention from the kinds of terminators seen.
///
/// A single kind decides; `CR` mixed with `CR LF` counts as DOS text with
/// stray carriage returns; any other mix falls back to Unix.
pub fn eol_from_seen(seen: EolSeen) -> EolType {
    let lf = seen.has(EolSeen::LF);
    let crlf = seen.has(EolSeen::CRLF);
    let cr = seen.has(EolSeen::CR);
    match (lf, crlf, cr) {
        (false, false, false) => EolType::AutoDetect,
        (true, false, false) => EolType::Unix,
        (false, true, _) => EolType::Dos,
        (false, false, true) => EolType::Mac,
        _ => EolType::Unix,
    }
}

/// Terminators among the first [`MAX_EOL_SAMPLES`] line ends of `units`.
pub(crate) fn eol_seen_in(units: impl IntoIterator<Item = u32>) -> EolSeen {
    let mut seen = EolSeen::default();
    let mut count = 0;
    let mut units = units.into_iter().peekable();
    while let Some(u) = units.next() {
        match u {
            0x0A => seen.insert(EolSeen::LF),
            0x0D => {
                if units.peek() == Some(&0x0A) {
                    units.next();
                    seen.insert(EolSeen::CRLF);
                } else {
                    seen.insert(EolSeen::CR);
                }
            }
            _ => continue,
        }
        count += 1;
        if count == MAX_EOL_SAMPLES {
            break;
        }
    }
    seen
}

/// Code units of `bytes`, read as UTF-16 in the given byte order if any.
fn eol_units(bytes: &[u8], utf16: Option<Endian>) -> impl Iterator<Item = u32> + '_ {
    let width = if utf16.is_some() { 2 } else { 1 };
    bytes.chunks_exact(width).map(move |unit| match (utf16, unit) {
        (Some(Endian::Big), &[hi, lo]) => u32::from(u16::from_be_bytes([hi, lo])),
        (Some(Endian::Little), &[lo, hi]) => u32::from(u16::from_le_bytes([lo, hi])),
        _ => u32::from(unit[0]),
    })
}

/// Sniffs the end-of-line convention of `bytes`; `utf16` gives the byte
/// order when the bytes are UTF-16.
pub fn detect_eol(bytes: &[u8], utf16: Option<Endian>) -> EolType {
    eol_from_seen(eol_seen_in(eol_units(bytes, utf16)))
}

/// Whether `bytes` already hold [`MAX_EOL_SAMPLES`] line ends, so that more
/// input cannot change what [`detect_eol`] decides. A trailing `CR` does not
/// count until the next unit shows whether it starts a `CR LF`.
pub fn eol_sample_complete(bytes: &[u8], utf16: Option<Endian>) -> bool {
    let mut count = 0;
    let mut units = eol_units(bytes, utf16).peekable();
    while let Some(u) = units.next() {
        match u {
            0x0A => count += 1,
            0x0D => match units.peek() {
                None => return false,
                Some(&0x0A) => {
                    units.next();
                    count += 1;
                }
                Some(_) => count += 1,
            },
            _ => continue,
        }
        if count == MAX_EOL_SAMPLES {
            return true;
        }
    }
    false
}

/// Detector running the registry's classifiers under its category priority.
#[derive(Debug, Clone, Copy)]
pub struct EncodingDetector<'r> {
    registry: &'r Registry,
    options: DetectOptions,
}

impl<'r> EncodingDetector<'r> {
    /// A detector with default options.
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_options(registry, DetectOptions::default())
    }

    /// A detector with explicit options.
    pub fn with_options(registry: &'r Registry, options: DetectOptions) -> Self {
        Self { registry, options }
    }

    /// Limits the number of bytes examined.
    pub fn with_sample_size(mut self, sample_limit: usize) -> Self {
        self.options.sample_limit = sample_limit;
        self
    }

    /// The options in force.
    pub fn options(&self) -> &DetectOptions {
        &self.options
    }

    /// Detects the coding system of `data`.
    pub fn detect(&self, data: &[u8]) -> Result<DetectionResult> {
        let sample = &data[..data.len().min(self.options.sample_limit)];
        let codings = self.registry.category_codings();
        let coding_of = |category: CodingCategory| {
            codings
                .iter()
                .find(|(c, _)| *c == category)
                .map(|(_, coding)| Arc::clone(coding))
        };
        let mut info = DetectionInfo::default();
        let scan = Scan::of(sample);
        if scan.odd_crlf {
            info.reject(CategoryMask::UTF_16);
        }

        let mut bom_detected = false;
        let mut winner: Option<CodingCategory> = None;
        let mut null_result = false;

        if let Some(category) = detect_bom(sample) {
            if coding_of(category).is_some() {
                info.check(category.mask());
                info.find(category.mask());
                bom_detected = true;
                winner = Some(category);
            }
        }

        if winner.is_none() && scan.null && self.options.null_byte_detection {
            utf16::detect(sample, &mut info);
            winner = self.first_found(&codings, &info, CategoryMask::UTF_16);
            null_result = winner.is_none();
        }

        if winner.is_none() && !null_result && scan.iso_control && self.options.iso_escape_detection {
            iso2022::detect(sample, &mut info, self.registry.charsets(), &codings);
            winner = self.first_found(&codings, &info, CategoryMask::ISO);
        }

        let mut ascii = false;
        if winner.is_none() && !null_result && !scan.eight_bit {
            ascii = true;
            for (category, _) in &codings {
                if category.ascii_safe() {
                    info.find(category.mask());
                }
            }
            winner = codings
                .iter()
                .map(|(category, _)| *category)
                .find(|&category| category.ascii_safe() && info.found.has(category));
        }

        if winner.is_none() && !null_result {
            winner = self.run_classifiers(sample, &codings, &mut info);
        }

        let (category, coding) = match winner.and_then(|w| coding_of(w).map(|c| (w, c))) {
            Some((category, _)) if ascii => (category, self.registry.get("undecided")?),
            Some(found) => found,
            None if null_result => (CodingCategory::RawText, self.registry.get("no-conversion")?),
            None => (CodingCategory::RawText, self.registry.get("raw-text")?),
        };

        let eol = if null_result {
            EolType::Unix
        } else {
            detect_eol(sample, utf16_endian(category, &coding))
        };
        let coding = self.registry.eol_variant(&coding, eol);

        let mut candidates = vec![Arc::clone(&coding)];
        let mut push = |coding: Arc<CodingSystem>| {
            let coding = self.registry.eol_variant(&coding, eol);
            if !candidates.iter().any(|c| c.name == coding.name) {
                candidates.push(coding);
            }
        };
        if !null_result {
            for (category, c) in &codings {
                if info.found.has(*category) {
                    push(Arc::clone(c));
                }
            }
            for (category, c) in &codings {
                if info.checked.has(*category) && !info.rejected.has(*category) {
                    push(Arc::clone(c));
                }
            }
        }
        if let Ok(raw) = self.registry.get("raw-text") {
            push(raw);
        }

        debug!(
            coding = %coding.name,
            category = %category,
            eol = %eol,
            bom = bom_detected,
            sample = sample.len(),
            "detected coding system"
        );
        Ok(DetectionResult {
            coding,
            category,
            eol,
            candidates,
            bom_detected,
            null_byte: scan.null,
            info,
        })
    }

    /// First category of `mask`, in priority order, that was found.
    fn first_found(
        &self,
        codings: &[(CodingCategory, Arc<CodingSystem>)],
        info: &DetectionInfo,
        mask: CategoryMask,
    ) -> Option<CodingCategory> {
        codings
            .iter()
            .map(|(category, _)| *category)
            .find(|&category| mask.has(category) && info.found.has(category))
    }

    fn run_classifiers(
        &self,
        sample: &[u8],
        codings: &[(CodingCategory, Arc<CodingSystem>)],
        info: &mut DetectionInfo,
    ) -> Option<CodingCategory> {
        if self.options.prefer_utf8 {
            utf8::detect(sample, info);
            if let Some(category) = self.first_found(codings, info, CategoryMask::UTF_8) {
                return Some(category);
            }
        }
        for (category, coding) in codings {
            if !info.checked.has(*category) {
                self.classify(*category, coding, sample, info, codings);
            }
            if self.options.highest && info.found.has(*category) {
                return Some(*category);
            }
        }
        codings
            .iter()
            .map(|(category, _)| *category)
            .find(|&category| info.found.has(category))
    }

    fn classify(
        &self,
        category: CodingCategory,
        coding: &CodingSystem,
        sample: &[u8],
        info: &mut DetectionInfo,
        codings: &[(CodingCategory, Arc<CodingSystem>)],
    ) {
        let charsets = self.registry.charsets();
        match category {
            c if CategoryMask::ISO.has(c) => iso2022::detect(sample, info, charsets, codings),
            c if CategoryMask::UTF_8.has(c) => utf8::detect(sample, info),
            c if CategoryMask::UTF_16.has(c) => utf16::detect(sample, info),
            CodingCategory::Charset => {
                if let CodecKind::CharsetTable(table) = &coding.kind {
                    charset_table::detect(sample, info, charsets, table);
                }
            }
            CodingCategory::Sjis => sjis::detect(sample, info),
            CodingCategory::Big5 => big5::detect(sample, info),
            CodingCategory::EmacsMule => emacs_mule::detect(sample, info),
            CodingCategory::Ccl => {
                if let CodecKind::Ccl(params) = &coding.kind {
                    ccl::detect(sample, info, &params.valid_codes);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(registry: &Registry, data: &[u8]) -> DetectionResult {
        EncodingDetector::new(registry).detect(data).unwrap()
    }

    #[test]
    fn test_eol_classification() {
        assert_eq!(detect_eol(b"a\nb\nc\n", None), EolType::Unix);
        assert_eq!(detect_eol(b"a\r\nb\r\n", None), EolType::Dos);
        assert_eq!(detect_eol(b"a\rb\r", None), EolType::Mac);
        assert_eq!(detect_eol(b"a\rb\r\n", None), EolType::Dos);
        assert_eq!(detect_eol(b"a\nb\r\n", None), EolType::Unix);
        assert_eq!(detect_eol(b"plain", None), EolType::AutoDetect);
        assert_eq!(detect_eol(&[0x41, 0x00, 0x0D, 0x00, 0x0A, 0x00], Some(Endian::Little)), EolType::Dos);
    }

    #[test]
    fn test_eol_sample_complete_after_three_line_ends() {
        assert!(!eol_sample_complete(b"a\rb\r\n", None));
        assert!(!eol_sample_complete(b"a\rb\r\nc\r", None));
        assert!(eol_sample_complete(b"a\rb\r\nc\r\n", None));
        assert!(eol_sample_complete(b"\n\n\n", None));
        let utf16 = [0x0D, 0x00, 0x0A, 0x00, 0x0A, 0x00, 0x0D, 0x00];
        assert!(!eol_sample_complete(&utf16, Some(Endian::Little)));
        assert!(!eol_sample_complete(&utf16, Some(Endian::Big)));
        assert!(eol_sample_complete(&[0x0D, 0x00, 0x0A, 0x00, 0x0A, 0x00, 0x0D, 0x00, 0x41, 0x00], Some(Endian::Little)));
    }

    #[test]
    fn test_eol_sniffing_stops_after_three_terminators() {
        let seen = eol_seen_in(b"a\nb\nc\nd\r\n".iter().map(|&b| u32::from(b)));
        assert_eq!(seen, EolSeen::LF);
    }

    #[test]
    fn test_info_found_never_rejected() {
        let mut info = DetectionInfo::default();
        info.find(CodingCategory::Sjis.mask());
        info.reject(CodingCategory::Sjis.mask());
        info.find(CodingCategory::Sjis.mask());
        assert!(!info.found.has(CodingCategory::Sjis));
        assert!(info.rejected.has(CodingCategory::Sjis));
    }

    #[test]
    fn test_bom_wins() {
        let registry = Registry::new();
        let result = detect(&registry, b"\xEF\xBB\xBFhello");
        assert!(result.bom_detected);
        assert_eq!(result.category, CodingCategory::Utf8Sig);
        assert_eq!(result.coding.name, "utf-8-with-signature");

        let result = detect(&registry, &[0xFF, 0xFE, 0x41, 0x00, 0x0A, 0x00]);
        assert_eq!(result.category, CodingCategory::Utf16Le);
        assert_eq!(result.coding.name, "utf-16le-with-signature-unix");
    }

    #[test]
    fn test_pure_ascii_is_undecided() {
        let registry = Registry::new();
        let result = detect(&registry, b"hello\r\nworld\r\n");
        assert_eq!(result.category, CodingCategory::Iso7);
        assert_eq!(result.coding.name, "undecided-dos");
        assert_eq!(result.eol, EolType::Dos);
    }

    #[test]
    fn test_null_byte_means_binary() {
        let registry = Registry::new();
        let result = detect(&registry, b"h\xC3\xA9\x00llo!");
        assert!(result.null_byte);
        assert_eq!(result.coding.name, "no-conversion");

        let options = DetectOptions {
            null_byte_detection: false,
            ..DetectOptions::default()
        };
        let result = EncodingDetector::with_options(&registry, options)
            .detect(b"h\xC3\xA9\x00llo!")
            .unwrap();
        assert_eq!(result.coding.name, "utf-8");
    }

    #[test]
    fn test_utf16_without_signature() {
        let registry = Registry::new();
        let result = detect(&registry, &[0x68, 0x00, 0x69, 0x00]);
        assert_eq!(result.category, CodingCategory::Utf16LeNosig);
        assert_eq!(result.coding.name, "utf-16le");
    }

    #[test]
    fn test_prefer_utf8_over_latin_1() {
        let registry = Registry::new();
        let text = "h\u{e9}llo\n".as_bytes();
        assert_eq!(detect(&registry, text).coding.name, "utf-8-unix");

        let options = DetectOptions {
            prefer_utf8: false,
            ..DetectOptions::default()
        };
        let result = EncodingDetector::with_options(&registry, options)
            .detect(text)
            .unwrap();
        assert_eq!(result.category, CodingCategory::Iso8_1);
        assert_eq!(result.coding.name, "iso-latin-1-unix");
    }

    #[test]
    fn test_latin_1_and_escapes() {
        let registry = Registry::new();
        assert_eq!(detect(&registry, b"caf\xE9!").coding.name, "iso-latin-1");
        let result = detect(&registry, b"\x1b$B$\"\x1b(B");
        assert_eq!(result.category, CodingCategory::Iso7);
        assert_eq!(result.coding.name, "iso-2022-7bit");
    }

    #[test]
    fn test_shift_jis_after_iso_rejection() {
        let registry = Registry::new();
        let result = detect(&registry, &[0x82, 0xA0, 0x41]);
        assert_eq!(result.category, CodingCategory::Sjis);
        assert_eq!(result.coding.name, "shift_jis");
        assert!(result.info.rejected.has(CodingCategory::Iso8_1));
    }

    #[test]
    fn test_undetectable_bytes_fall_back_to_raw_text() {
        let registry = Registry::new();
        let result = detect(&registry, &[0x9A, 0x20]);
        assert_eq!(result.category, CodingCategory::RawText);
        assert_eq!(result.coding.name, "raw-text");
    }

    #[test]
    fn test_all_candidates_best_first() {
        let registry = Registry::new();
        let options = DetectOptions {
            highest: false,
            prefer_utf8: false,
            ..DetectOptions::default()
        };
        let result = EncodingDetector::with_options(&registry, options)
            .detect("h\u{e9}".as_bytes())
            .unwrap();
        let names: Vec<&str> = result.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "iso-latin-1");
        assert!(names.contains(&"utf-8"));
        assert_eq!(names.last(), Some(&"raw-text"));
    }
}
