//! Coding-system definitions.
//!
//! A [`CodingSystemSpec`] is the serializable description handed to
//! [`Registry::define_coding_system`](crate::Registry::define_coding_system);
//! the registry validates it and resolves charset, translation-table and
//! program names into a [`CodingSystem`], which is immutable afterwards
//! except through explicit property updates.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::charset::CharsetId;
use crate::codec::ccl::ByteCodeProgram;
use crate::codec::charset_table::CharsetTable;
use crate::translate::TranslationTable;

/// Byte-order-mark policy of UTF codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BomPolicy {
    /// Never read or write a BOM.
    #[default]
    NoBom,
    /// Expect a BOM on decode and always write one on encode.
    WithBom,
    /// Honor a BOM if present on decode; write one on encode.
    AutoDetectBom,
}

/// Byte order of UTF-16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endian {
    /// Most significant byte first.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// End-of-line convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EolType {
    /// `LF`.
    Unix,
    /// `CR LF`.
    Dos,
    /// `CR`.
    Mac,
    /// Decided from the data on decode, `Unix` on encode.
    #[default]
    AutoDetect,
}

impl EolType {
    /// Suffix of the subsidiary coding system with this convention.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            EolType::Unix => Some("-unix"),
            EolType::Dos => Some("-dos"),
            EolType::Mac => Some("-mac"),
            EolType::AutoDetect => None,
        }
    }

    /// The three concrete conventions.
    pub const CONCRETE: [EolType; 3] = [EolType::Unix, EolType::Dos, EolType::Mac];
}

impl fmt::Display for EolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EolType::Unix => "unix",
            EolType::Dos => "dos",
            EolType::Mac => "mac",
            EolType::AutoDetect => "undecided",
        };
        f.write_str(name)
    }
}

/// Flag bits of an ISO-2022 coding system.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iso2022Flags(pub u32);

impl Iso2022Flags {
    /// Always use the long designation form `ESC $ ( F`.
    pub const LONG_FORM: Self = Self(0x0001);
    /// Return to the initial designations before a newline.
    pub const RESET_AT_EOL: Self = Self(0x0002);
    /// Return to the initial designations before control characters.
    pub const RESET_AT_CNTL: Self = Self(0x0004);
    /// 7-bit environment; GR is never used.
    pub const SEVEN_BITS: Self = Self(0x0008);
    /// Locking shifts (SO/SI, LS2, LS3) may be used.
    pub const LOCKING_SHIFT: Self = Self(0x0010);
    /// Single shifts (SS2, SS3) may be used.
    pub const SINGLE_SHIFT: Self = Self(0x0020);
    /// Charsets may be designated with escape sequences.
    pub const DESIGNATION: Self = Self(0x0040);
    /// Revision sequences `ESC & F` are written when registered.
    pub const REVISION: Self = Self(0x0080);
    /// Direction escapes are honored.
    pub const DIRECTION: Self = Self(0x0100);
    /// Reset designations at the beginning of each line.
    pub const INIT_AT_BOL: Self = Self(0x0200);
    /// Designate every charset of a line before its first character.
    pub const DESIGNATE_AT_BOL: Self = Self(0x0400);
    /// Substitute `?` for characters outside the charset list.
    pub const SAFE: Self = Self(0x0800);
    /// Composition escapes `ESC 0` .. `ESC 4` are used.
    pub const COMPOSITION: Self = Self(0x1000);
    /// Accept every registered charset when decoding.
    pub const FULL_SUPPORT: Self = Self(0x2000);

    const NAMES: [(Self, &'static str); 14] = [
        (Self::LONG_FORM, "long-form"),
        (Self::RESET_AT_EOL, "reset-at-eol"),
        (Self::RESET_AT_CNTL, "reset-at-cntl"),
        (Self::SEVEN_BITS, "7-bit"),
        (Self::LOCKING_SHIFT, "locking-shift"),
        (Self::SINGLE_SHIFT, "single-shift"),
        (Self::DESIGNATION, "designation"),
        (Self::REVISION, "revision"),
        (Self::DIRECTION, "direction"),
        (Self::INIT_AT_BOL, "init-at-bol"),
        (Self::DESIGNATE_AT_BOL, "designate-at-bol"),
        (Self::SAFE, "safe"),
        (Self::COMPOSITION, "composition"),
        (Self::FULL_SUPPORT, "full-support"),
    ];

    /// Whether every bit of `other` is set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the set flags.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|&(_, name)| name)
            .collect()
    }
}

impl std::ops::BitOr for Iso2022Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Iso2022Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iso2022Flags({})", self.names().join("|"))
    }
}

/// Detection categories, one per distinguishable family of byte patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodingCategory {
    /// 7-bit ISO-2022 with designations to G0 only.
    Iso7,
    /// 7-bit ISO-2022 restricted to a small charset list (ISO-2022-JP).
    Iso7Tight,
    /// 8-bit ISO-2022 with a one-byte set in GR.
    Iso8_1,
    /// 8-bit ISO-2022 with a two-byte set in GR.
    Iso8_2,
    /// 7-bit ISO-2022 with locking or single shifts.
    Iso7Else,
    /// 8-bit ISO-2022 with locking or single shifts.
    Iso8Else,
    /// UTF-8, signature honored when present.
    Utf8Auto,
    /// UTF-8 without signature.
    Utf8Nosig,
    /// UTF-8 with signature.
    Utf8Sig,
    /// UTF-16, byte order from the signature.
    Utf16Auto,
    /// UTF-16BE with signature.
    Utf16Be,
    /// UTF-16LE with signature.
    Utf16Le,
    /// UTF-16BE without signature.
    Utf16BeNosig,
    /// UTF-16LE without signature.
    Utf16LeNosig,
    /// Charset-table codecs.
    Charset,
    /// Shift-JIS.
    Sjis,
    /// Big5.
    Big5,
    /// Program-driven codecs.
    Ccl,
    /// The emacs-mule internal format.
    EmacsMule,
    /// Uninterpreted bytes.
    RawText,
    /// Not yet decided.
    Undecided,
}

impl CodingCategory {
    /// Every category, in the default priority order.
    pub const ALL: [CodingCategory; 21] = [
        CodingCategory::Iso7,
        CodingCategory::Iso7Tight,
        CodingCategory::Iso8_1,
        CodingCategory::Iso8_2,
        CodingCategory::Iso7Else,
        CodingCategory::Iso8Else,
        CodingCategory::Utf8Auto,
        CodingCategory::Utf8Nosig,
        CodingCategory::Utf8Sig,
        CodingCategory::Utf16Auto,
        CodingCategory::Utf16Be,
        CodingCategory::Utf16Le,
        CodingCategory::Utf16BeNosig,
        CodingCategory::Utf16LeNosig,
        CodingCategory::Charset,
        CodingCategory::Sjis,
        CodingCategory::Big5,
        CodingCategory::Ccl,
        CodingCategory::EmacsMule,
        CodingCategory::RawText,
        CodingCategory::Undecided,
    ];

    /// Single-bit mask of this category.
    #[inline]
    pub fn mask(self) -> CategoryMask {
        CategoryMask(1 << self as u32)
    }

    /// Kebab-case name, as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            CodingCategory::Iso7 => "iso-7",
            CodingCategory::Iso7Tight => "iso-7-tight",
            CodingCategory::Iso8_1 => "iso-8-1",
            CodingCategory::Iso8_2 => "iso-8-2",
            CodingCategory::Iso7Else => "iso-7-else",
            CodingCategory::Iso8Else => "iso-8-else",
            CodingCategory::Utf8Auto => "utf-8-auto",
            CodingCategory::Utf8Nosig => "utf-8-nosig",
            CodingCategory::Utf8Sig => "utf-8-sig",
            CodingCategory::Utf16Auto => "utf-16-auto",
            CodingCategory::Utf16Be => "utf-16-be",
            CodingCategory::Utf16Le => "utf-16-le",
            CodingCategory::Utf16BeNosig => "utf-16-be-nosig",
            CodingCategory::Utf16LeNosig => "utf-16-le-nosig",
            CodingCategory::Charset => "charset",
            CodingCategory::Sjis => "sjis",
            CodingCategory::Big5 => "big5",
            CodingCategory::Ccl => "ccl",
            CodingCategory::EmacsMule => "emacs-mule",
            CodingCategory::RawText => "raw-text",
            CodingCategory::Undecided => "undecided",
        }
    }

    /// Category with the given [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Whether text of this category may be plain ASCII throughout.
    pub fn ascii_safe(self) -> bool {
        !matches!(
            self,
            CodingCategory::Utf16Auto
                | CodingCategory::Utf16Be
                | CodingCategory::Utf16Le
                | CodingCategory::Utf16BeNosig
                | CodingCategory::Utf16LeNosig
                | CodingCategory::Ccl
        )
    }
}

impl fmt::Display for CodingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CodingCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CodingCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown coding category `{name}`")))
    }
}

/// Set of [`CodingCategory`] values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CategoryMask(pub u32);

impl CategoryMask {
    /// No category.
    pub const NONE: Self = Self(0);
    /// Every category.
    pub const ALL: Self = Self((1 << 21) - 1);
    /// All ISO-2022 categories.
    pub const ISO: Self = Self(0b11_1111);
    /// 7-bit ISO-2022 categories.
    pub const ISO_7BIT: Self = Self(0b01_0011);
    /// 8-bit ISO-2022 categories.
    pub const ISO_8BIT: Self = Self(0b10_1100);
    /// UTF-8 categories.
    pub const UTF_8: Self = Self(0b111 << 6);
    /// UTF-16 categories.
    pub const UTF_16: Self = Self(0b1_1111 << 9);

    /// Whether `category` is in the set.
    #[inline]
    pub fn has(self, category: CodingCategory) -> bool {
        self.0 & category.mask().0 != 0
    }

    /// Adds every category of `other`.
    #[inline]
    pub fn insert(&mut self, other: CategoryMask) {
        self.0 |= other.0;
    }

    /// Removes every category of `other`.
    #[inline]
    pub fn remove(&mut self, other: CategoryMask) {
        self.0 &= !other.0;
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every category of `other` is in the set.
    #[inline]
    pub fn contains(self, other: CategoryMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Categories of the set in default order.
    pub fn categories(self) -> Vec<CodingCategory> {
        CodingCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.has(*c))
            .collect()
    }
}

impl std::ops::BitOr for CategoryMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<CodingCategory> for CategoryMask {
    fn from(category: CodingCategory) -> Self {
        category.mask()
    }
}

impl fmt::Debug for CategoryMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.categories().iter().map(|c| c.name()))
            .finish()
    }
}

/// Codec-specific part of a coding-system definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CodecSpec {
    /// UTF-8.
    Utf8 {
        /// BOM handling.
        #[serde(default)]
        bom: BomPolicy,
        /// Accept and produce the 4/5-byte forms above U+10FFFF.
        #[serde(default)]
        extended: bool,
    },
    /// UTF-16.
    Utf16 {
        /// BOM handling.
        #[serde(default)]
        bom: BomPolicy,
        /// Byte order used when no BOM decides it.
        #[serde(default)]
        endian: Endian,
    },
    /// ISO-2022 family.
    Iso2022 {
        /// Behavior flags.
        flags: Iso2022Flags,
        /// Charset names initially designated to G0..G3.
        #[serde(default)]
        initial: Vec<Option<String>>,
        /// Register each charset is designated to, overriding the default
        /// (94-sets to G0, 96-sets to G1).
        #[serde(default)]
        request: Vec<(String, u8)>,
    },
    /// The emacs-mule internal format.
    EmacsMule,
    /// Shift-JIS; charsets are ASCII, kana and the two-byte set, in that order.
    Sjis,
    /// Big5; charsets are ASCII and the two-byte set.
    Big5,
    /// Charset-table driven codec over the charset list.
    CharsetTable,
    /// Program-driven codec.
    Ccl {
        /// Name of the decoding program.
        decoder: String,
        /// Name of the encoding program.
        encoder: String,
        /// Byte ranges considered valid during detection.
        #[serde(default)]
        valid_codes: Vec<(u8, u8)>,
    },
    /// Bytes pass through unchanged.
    RawText,
    /// Decided by detection before decoding.
    Undecided {
        /// Pick UTF-8 whenever the data is valid UTF-8.
        #[serde(default = "default_true")]
        prefer_utf8: bool,
        /// Do not treat NUL bytes as a sign of binary data.
        #[serde(default)]
        inhibit_null_byte_detection: bool,
        /// Do not let escape sequences trigger ISO-2022 detection.
        #[serde(default)]
        inhibit_iso_escape_detection: bool,
    },
}

fn default_true() -> bool {
    true
}

impl CodecSpec {
    /// Short name of the codec type.
    pub fn type_name(&self) -> &'static str {
        match self {
            CodecSpec::Utf8 { .. } => "utf-8",
            CodecSpec::Utf16 { .. } => "utf-16",
            CodecSpec::Iso2022 { .. } => "iso-2022",
            CodecSpec::EmacsMule => "emacs-mule",
            CodecSpec::Sjis => "shift-jis",
            CodecSpec::Big5 => "big5",
            CodecSpec::CharsetTable => "charset",
            CodecSpec::Ccl { .. } => "ccl",
            CodecSpec::RawText => "raw-text",
            CodecSpec::Undecided { .. } => "undecided",
        }
    }
}

/// Serializable definition of a coding system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingSystemSpec {
    /// Identifier.
    pub name: String,
    /// Codec and its parameters.
    pub codec: CodecSpec,
    /// Charset names, in priority order.
    #[serde(default)]
    pub charsets: Vec<String>,
    /// Override of the ASCII-compatibility flag.
    #[serde(default)]
    pub ascii_compatible: Option<bool>,
    /// Character substituted for unencodable characters.
    #[serde(default)]
    pub default_char: Option<u32>,
    /// Translation table applied after decoding.
    #[serde(default)]
    pub decode_translation: Option<String>,
    /// Translation table applied before encoding.
    #[serde(default)]
    pub encode_translation: Option<String>,
    /// End-of-line convention.
    #[serde(default)]
    pub eol: EolType,
    /// One-character indicator.
    #[serde(default)]
    pub mnemonic: Option<char>,
    /// Hook run by the host after reading.
    #[serde(default)]
    pub post_read_hook: Option<String>,
    /// Hook run by the host before writing.
    #[serde(default)]
    pub pre_write_hook: Option<String>,
    /// Aliases registered with the definition.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CodingSystemSpec {
    /// A definition with defaults for everything but the codec.
    pub fn new(name: impl Into<String>, codec: CodecSpec) -> Self {
        Self {
            name: name.into(),
            codec,
            charsets: Vec::new(),
            ascii_compatible: None,
            default_char: None,
            decode_translation: None,
            encode_translation: None,
            eol: EolType::AutoDetect,
            mnemonic: None,
            post_read_hook: None,
            pre_write_hook: None,
            aliases: Vec::new(),
        }
    }

    /// Sets the charset list.
    pub fn charsets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.charsets = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the end-of-line convention.
    pub fn eol(mut self, eol: EolType) -> Self {
        self.eol = eol;
        self
    }

    /// Sets the mnemonic.
    pub fn mnemonic(mut self, mnemonic: char) -> Self {
        self.mnemonic = Some(mnemonic);
        self
    }

    /// Adds aliases.
    pub fn aliases<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Resolved ISO-2022 parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso2022Params {
    /// Behavior flags.
    pub flags: Iso2022Flags,
    /// Initial designations of G0..G3.
    pub initial: [Option<CharsetId>; 4],
    /// Register each usable charset is designated to.
    pub request: Vec<(CharsetId, u8)>,
}

impl Iso2022Params {
    /// Register `charset` is designated to, if the coding system uses it.
    pub fn register_of(&self, charset: CharsetId) -> Option<u8> {
        self.request
            .iter()
            .find(|(id, _)| *id == charset)
            .map(|&(_, reg)| reg)
    }

    /// Whether the 7-bit environment is in force.
    pub fn seven_bits(&self) -> bool {
        self.flags.contains(Iso2022Flags::SEVEN_BITS)
    }
}

/// Resolved program-driven codec parameters.
#[derive(Debug, Clone)]
pub struct CclParams {
    /// Program run on decode.
    pub decoder: Arc<dyn ByteCodeProgram>,
    /// Program run on encode.
    pub encoder: Arc<dyn ByteCodeProgram>,
    /// Bytes the decoder accepts, used by detection.
    pub valid_codes: Box<[bool; 256]>,
}

/// Resolved codec with its parameters.
#[derive(Debug, Clone)]
pub enum CodecKind {
    /// UTF-8.
    Utf8 {
        /// BOM handling.
        bom: BomPolicy,
        /// Legacy 4/5-byte forms above U+10FFFF.
        extended: bool,
    },
    /// UTF-16.
    Utf16 {
        /// BOM handling.
        bom: BomPolicy,
        /// Default byte order.
        endian: Endian,
    },
    /// ISO-2022 family.
    Iso2022(Iso2022Params),
    /// emacs-mule.
    EmacsMule,
    /// Shift-JIS.
    Sjis,
    /// Big5.
    Big5,
    /// Charset-table codec with its first-byte table.
    CharsetTable(Arc<CharsetTable>),
    /// Program-driven codec.
    Ccl(CclParams),
    /// Raw bytes.
    RawText,
    /// Placeholder resolved by detection.
    Undecided {
        /// Pick UTF-8 whenever the data is valid UTF-8.
        prefer_utf8: bool,
        /// Keep NUL bytes from forcing binary detection.
        inhibit_null_byte_detection: bool,
        /// Keep escapes from forcing ISO-2022 detection.
        inhibit_iso_escape_detection: bool,
    },
}

/// A registered coding system.
#[derive(Debug, Clone)]
pub struct CodingSystem {
    /// Identifier.
    pub name: String,
    /// Coding system this one is an end-of-line subsidiary of.
    pub base: Option<String>,
    /// Codec and resolved parameters.
    pub kind: CodecKind,
    /// Charsets, in priority order.
    pub charsets: Vec<CharsetId>,
    /// Whether ASCII bytes decode to ASCII characters.
    pub ascii_compatible: bool,
    /// Substitute for unencodable characters.
    pub default_char: u32,
    /// Translation table applied after decoding.
    pub decode_table: Option<Arc<TranslationTable>>,
    /// Translation table applied before encoding.
    pub encode_table: Option<Arc<TranslationTable>>,
    /// End-of-line convention.
    pub eol: EolType,
    /// Detection category.
    pub category: CodingCategory,
    /// One-character indicator.
    pub mnemonic: char,
    /// Host hook run after reading.
    pub post_read_hook: Option<String>,
    /// Host hook run before writing.
    pub pre_write_hook: Option<String>,
    /// The definition this was built from.
    pub spec: CodingSystemSpec,
}

impl CodingSystem {
    /// Short name of the codec type.
    pub fn type_name(&self) -> &'static str {
        self.spec.codec.type_name()
    }

    /// Whether this is the detection placeholder.
    pub fn is_undecided(&self) -> bool {
        matches!(self.kind, CodecKind::Undecided { .. })
    }

    /// Whether the codec never alters bytes.
    pub fn is_raw(&self) -> bool {
        matches!(self.kind, CodecKind::RawText)
    }

    /// Maximum bytes a single encode step may write.
    pub fn safe_room(&self) -> usize {
        match &self.kind {
            CodecKind::Utf8 { .. } => 8,
            CodecKind::Utf16 { .. } => 6,
            CodecKind::Iso2022(_) => 64,
            CodecKind::EmacsMule => 16,
            CodecKind::Ccl(_) => 256,
            _ => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_masks_partition() {
        let mut all = CategoryMask::NONE;
        for category in CodingCategory::ALL {
            assert!(!all.has(category));
            all.insert(category.mask());
        }
        assert_eq!(all, CategoryMask::ALL);
        assert_eq!(CategoryMask::ISO_7BIT | CategoryMask::ISO_8BIT, CategoryMask::ISO);
        assert!(CategoryMask::UTF_16.has(CodingCategory::Utf16LeNosig));
        assert!(!CategoryMask::UTF_16.has(CodingCategory::Charset));
        assert!(CategoryMask::UTF_8.has(CodingCategory::Utf8Sig));
    }

    #[test]
    fn test_iso_flags() {
        let flags = Iso2022Flags::SEVEN_BITS | Iso2022Flags::DESIGNATION;
        assert!(flags.contains(Iso2022Flags::SEVEN_BITS));
        assert!(!flags.contains(Iso2022Flags::LOCKING_SHIFT));
        assert_eq!(flags.names(), vec!["7-bit", "designation"]);
    }

    #[test]
    fn test_category_names_round_trip() {
        for category in CodingCategory::ALL {
            assert_eq!(CodingCategory::from_name(category.name()), Some(category));
        }
        let parsed: Vec<CodingCategory> = serde_json::from_str(r#"["sjis", "iso-8-1"]"#).unwrap();
        assert_eq!(parsed, vec![CodingCategory::Sjis, CodingCategory::Iso8_1]);
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: CodingSystemSpec = serde_json::from_str(
            r#"{"name": "my-utf16", "codec": {"type": "utf16", "endian": "little"}}"#,
        )
        .unwrap();
        assert_eq!(spec.eol, EolType::AutoDetect);
        assert_eq!(
            spec.codec,
            CodecSpec::Utf16 {
                bom: BomPolicy::NoBom,
                endian: Endian::Little
            }
        );
    }
}
