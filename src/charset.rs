//! Character sets: the capability codecs use to map bytes to characters.
//!
//! A charset is a coded character set with a dimension (1-4 bytes per code),
//! a per-byte code space and a mapping between codes and characters. Codecs
//! only ever talk to charsets through the [`CharsetRegistry`] trait, so hosts
//! with their own charset tables can plug them in. [`Charsets`] is the
//! built-in implementation.
//!
//! Charsets without an explicit map use the code-offset method: the code's
//! linear index inside the code space is added to a base character. The
//! built-in CJK charsets are laid out this way in private blocks above
//! U+10FFFF so that they round-trip exactly without external tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::multibyte::{MAX_5_BYTE_CHAR, MAX_UNICODE_CHAR};
use crate::{Error, Result};

/// Identifier of a charset inside a [`CharsetRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharsetId(pub u16);

/// ISO-2022 registration of a graphic charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsoRegistration {
    /// 94 or 96.
    pub chars: u8,
    /// Final byte of the designation sequence (`0x30..=0x7E`).
    pub final_char: u8,
    /// Registration revision (`ESC & F` prefix), if any.
    #[serde(default)]
    pub revision: Option<u8>,
}

/// Operations codecs need from a charset table.
///
/// Implementations may load data lazily. Codecs hold only offsets into their
/// buffers across calls into this trait, so storage growth behind it cannot
/// invalidate a conversion in progress.
pub trait CharsetRegistry {
    /// Finds a charset by name.
    fn lookup(&self, name: &str) -> Option<CharsetId>;

    /// Name of a charset.
    fn name(&self, id: CharsetId) -> &str;

    /// Number of bytes per code (1-4).
    fn dimension(&self, id: CharsetId) -> u8;

    /// Inclusive range of byte `byte_index` of a code, most significant byte first.
    fn code_space(&self, id: CharsetId, byte_index: usize) -> (u8, u8);

    /// Character for `code`, if the code is mapped.
    fn decode(&self, id: CharsetId, code: u32) -> Option<u32>;

    /// Code for character `c`, if the charset contains it.
    fn encode(&self, id: CharsetId, c: u32) -> Option<u32>;

    /// Whether codes `0..0x80` map to ASCII.
    fn ascii_compatible(&self, id: CharsetId) -> bool;

    /// ISO-2022 registration, if the charset can be designated.
    fn iso_registration(&self, id: CharsetId) -> Option<IsoRegistration>;

    /// Leading byte used by the emacs-mule format, if any.
    fn emacs_mule_id(&self, id: CharsetId) -> Option<u8>;

    /// Charset registered for an ISO-2022 designation.
    fn find_iso(&self, dimension: u8, chars: u8, final_char: u8) -> Option<CharsetId>;

    /// Charset with the given emacs-mule leading byte.
    fn find_emacs_mule(&self, mule_id: u8) -> Option<CharsetId>;

    /// Whether `b` is inside the code space of byte `byte_index`.
    fn in_code_space(&self, id: CharsetId, byte_index: usize, b: u8) -> bool {
        let (lo, hi) = self.code_space(id, byte_index);
        lo <= b && b <= hi
    }

    /// Whether the charset can represent `c`.
    fn contains(&self, id: CharsetId, c: u32) -> bool {
        self.encode(id, c).is_some()
    }
}

/// Finds the first charset in `list` that can encode `c`.
pub fn char_charset(
    charsets: &dyn CharsetRegistry,
    list: &[CharsetId],
    c: u32,
) -> Option<(CharsetId, u32)> {
    list.iter()
        .find_map(|&id| charsets.encode(id, c).map(|code| (id, code)))
}

/// How codes map to characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CharsetMethod {
    /// `char = code_offset + linear index of the code in the code space`.
    Offset {
        /// Character of the first code.
        code_offset: u32,
    },
    /// Explicit `(code, char)` pairs.
    Map {
        /// Mapping entries.
        entries: Vec<(u32, u32)>,
    },
}

/// Definition of a charset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharsetSpec {
    /// Unique name.
    pub name: String,
    /// Bytes per code.
    pub dimension: u8,
    /// Inclusive byte ranges, most significant byte first.
    pub code_space: Vec<(u8, u8)>,
    /// Code to character mapping.
    pub method: CharsetMethod,
    /// ISO-2022 registration.
    #[serde(default)]
    pub iso: Option<IsoRegistration>,
    /// Leading byte in the emacs-mule format.
    #[serde(default)]
    pub emacs_mule_id: Option<u8>,
    /// Whether codes below 0x80 are ASCII.
    #[serde(default)]
    pub ascii_compatible: bool,
    /// Highest character the charset may produce.
    #[serde(default)]
    pub max_char: Option<u32>,
}

#[derive(Debug, Clone)]
struct Charset {
    spec: CharsetSpec,
    size: u32,
    decode_map: HashMap<u32, u32>,
    encode_map: HashMap<u32, u32>,
}

impl Charset {
    fn new(spec: CharsetSpec) -> Self {
        let size = spec
            .code_space
            .iter()
            .map(|&(lo, hi)| u32::from(hi - lo) + 1)
            .product();
        let (decode_map, encode_map) = match &spec.method {
            CharsetMethod::Map { entries } => {
                let decode: HashMap<u32, u32> = entries.iter().copied().collect();
                let mut encode = HashMap::with_capacity(entries.len());
                for &(code, c) in entries {
                    encode.entry(c).or_insert(code);
                }
                (decode, encode)
            }
            CharsetMethod::Offset { .. } => (HashMap::new(), HashMap::new()),
        };
        Self {
            spec,
            size,
            decode_map,
            encode_map,
        }
    }

    fn dimension(&self) -> usize {
        usize::from(self.spec.dimension)
    }

    fn code_index(&self, code: u32) -> Option<u32> {
        let dim = self.dimension();
        if dim < 4 && code >> (8 * dim) != 0 {
            return None;
        }
        let mut index = 0u32;
        for i in 0..dim {
            let b = ((code >> (8 * (dim - 1 - i))) & 0xFF) as u8;
            let (lo, hi) = self.spec.code_space[i];
            if b < lo || b > hi {
                return None;
            }
            index = index * (u32::from(hi - lo) + 1) + u32::from(b - lo);
        }
        Some(index)
    }

    fn index_code(&self, mut index: u32) -> Option<u32> {
        if index >= self.size {
            return None;
        }
        let dim = self.dimension();
        let mut code = 0u32;
        for i in (0..dim).rev() {
            let (lo, hi) = self.spec.code_space[i];
            let width = u32::from(hi - lo) + 1;
            let b = u32::from(lo) + index % width;
            index /= width;
            code |= b << (8 * (dim - 1 - i));
        }
        Some(code)
    }

    fn max_char(&self) -> u32 {
        self.spec.max_char.unwrap_or(crate::multibyte::MAX_CHAR)
    }

    fn decode(&self, code: u32) -> Option<u32> {
        let c = match self.spec.method {
            CharsetMethod::Offset { code_offset } => {
                code_offset.checked_add(self.code_index(code)?)?
            }
            CharsetMethod::Map { .. } => {
                self.code_index(code)?;
                *self.decode_map.get(&code)?
            }
        };
        (c <= self.max_char()).then_some(c)
    }

    fn encode(&self, c: u32) -> Option<u32> {
        if c > self.max_char() {
            return None;
        }
        match self.spec.method {
            CharsetMethod::Offset { code_offset } => {
                self.index_code(c.checked_sub(code_offset)?)
            }
            CharsetMethod::Map { .. } => self.encode_map.get(&c).copied(),
        }
    }
}

/// Built-in charset table.
#[derive(Debug, Clone)]
pub struct Charsets {
    charsets: Vec<Charset>,
    by_name: HashMap<String, CharsetId>,
    by_iso: HashMap<(u8, u8, u8), CharsetId>,
    by_mule: HashMap<u8, CharsetId>,
}

/// Start of the private character blocks used by built-in CJK charsets.
pub const PRIVATE_CHARSET_BASE: u32 = 0x110000;

const BLOCK_94X94: u32 = 0x2300;

impl Charsets {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            charsets: Vec::new(),
            by_name: HashMap::new(),
            by_iso: HashMap::new(),
            by_mule: HashMap::new(),
        }
    }

    /// The standard charsets every registry starts with.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for spec in standard_specs() {
            table.insert(spec);
        }
        table
    }

    /// Validates and adds a charset definition.
    pub fn define(&mut self, spec: CharsetSpec) -> Result<CharsetId> {
        let invalid = |reason: String| Error::InvalidCharset {
            name: spec.name.clone(),
            reason,
        };
        if spec.name.is_empty() {
            return Err(invalid("empty name".into()));
        }
        if self.by_name.contains_key(&spec.name) {
            return Err(invalid("already defined".into()));
        }
        if !(1..=4).contains(&spec.dimension) {
            return Err(invalid(format!("dimension {} not in 1..=4", spec.dimension)));
        }
        if spec.code_space.len() != usize::from(spec.dimension) {
            return Err(invalid(format!(
                "code space has {} ranges for dimension {}",
                spec.code_space.len(),
                spec.dimension
            )));
        }
        if spec.code_space.iter().any(|&(lo, hi)| lo > hi) {
            return Err(invalid("code space range with min > max".into()));
        }
        if let Some(iso) = spec.iso {
            if iso.chars != 94 && iso.chars != 96 {
                return Err(invalid(format!("ISO chars {} must be 94 or 96", iso.chars)));
            }
            if !(0x30..=0x7E).contains(&iso.final_char) {
                return Err(invalid(format!("invalid ISO final char {:#04X}", iso.final_char)));
            }
            if self
                .by_iso
                .contains_key(&(spec.dimension, iso.chars, iso.final_char))
            {
                return Err(invalid(format!(
                    "ISO registration {}/{}/{} already taken",
                    spec.dimension, iso.chars, iso.final_char as char
                )));
            }
        }
        if let Some(id) = spec.emacs_mule_id {
            if !(0x81..=0xFE).contains(&id) || (0x9A..=0x9F).contains(&id) {
                return Err(invalid(format!("invalid emacs-mule id {:#04X}", id)));
            }
            if self.by_mule.contains_key(&id) {
                return Err(invalid(format!("emacs-mule id {:#04X} already taken", id)));
            }
        }
        if let CharsetMethod::Offset { code_offset } = spec.method {
            let size: u64 = spec
                .code_space
                .iter()
                .map(|&(lo, hi)| u64::from(hi - lo) + 1)
                .product();
            if u64::from(code_offset) + size - 1 > u64::from(crate::multibyte::MAX_CHAR) {
                return Err(invalid("code offset pushes characters past MAX_CHAR".into()));
            }
        }
        Ok(self.insert(spec))
    }

    fn insert(&mut self, spec: CharsetSpec) -> CharsetId {
        let id = CharsetId(self.charsets.len() as u16);
        self.by_name.insert(spec.name.clone(), id);
        if let Some(iso) = spec.iso {
            self.by_iso
                .insert((spec.dimension, iso.chars, iso.final_char), id);
        }
        if let Some(mule) = spec.emacs_mule_id {
            self.by_mule.insert(mule, id);
        }
        self.charsets.push(Charset::new(spec));
        id
    }

    /// Number of charsets.
    pub fn len(&self) -> usize {
        self.charsets.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.charsets.is_empty()
    }

    /// Names of all charsets in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.charsets.iter().map(|c| c.spec.name.as_str())
    }

    /// Identifiers of all charsets in definition order.
    pub fn ids(&self) -> impl Iterator<Item = CharsetId> {
        (0..self.charsets.len()).map(|i| CharsetId(i as u16))
    }

    /// Identifier of a charset that must exist.
    pub fn id(&self, name: &str) -> Result<CharsetId> {
        self.lookup(name)
            .ok_or_else(|| Error::UnknownCharset(name.to_string()))
    }

    /// Definition of a charset.
    pub fn spec(&self, id: CharsetId) -> Option<&CharsetSpec> {
        self.get(id).map(|c| &c.spec)
    }

    fn get(&self, id: CharsetId) -> Option<&Charset> {
        self.charsets.get(usize::from(id.0))
    }
}

impl Default for Charsets {
    fn default() -> Self {
        Self::standard()
    }
}

impl CharsetRegistry for Charsets {
    fn lookup(&self, name: &str) -> Option<CharsetId> {
        self.by_name.get(name).copied()
    }

    fn name(&self, id: CharsetId) -> &str {
        self.get(id).map_or("", |c| c.spec.name.as_str())
    }

    fn dimension(&self, id: CharsetId) -> u8 {
        self.get(id).map_or(1, |c| c.spec.dimension)
    }

    fn code_space(&self, id: CharsetId, byte_index: usize) -> (u8, u8) {
        self.get(id)
            .and_then(|c| c.spec.code_space.get(byte_index).copied())
            .unwrap_or((0xFF, 0))
    }

    fn decode(&self, id: CharsetId, code: u32) -> Option<u32> {
        self.get(id)?.decode(code)
    }

    fn encode(&self, id: CharsetId, c: u32) -> Option<u32> {
        self.get(id)?.encode(c)
    }

    fn ascii_compatible(&self, id: CharsetId) -> bool {
        self.get(id).is_some_and(|c| c.spec.ascii_compatible)
    }

    fn iso_registration(&self, id: CharsetId) -> Option<IsoRegistration> {
        self.get(id)?.spec.iso
    }

    fn emacs_mule_id(&self, id: CharsetId) -> Option<u8> {
        self.get(id)?.spec.emacs_mule_id
    }

    fn find_iso(&self, dimension: u8, chars: u8, final_char: u8) -> Option<CharsetId> {
        self.by_iso.get(&(dimension, chars, final_char)).copied()
    }

    fn find_emacs_mule(&self, mule_id: u8) -> Option<CharsetId> {
        self.by_mule.get(&mule_id).copied()
    }
}

fn offset_spec(name: &str, code_space: Vec<(u8, u8)>, code_offset: u32) -> CharsetSpec {
    CharsetSpec {
        name: name.to_string(),
        dimension: code_space.len() as u8,
        code_space,
        method: CharsetMethod::Offset { code_offset },
        iso: None,
        emacs_mule_id: None,
        ascii_compatible: false,
        max_char: None,
    }
}

fn iso94(final_char: u8) -> Option<IsoRegistration> {
    Some(IsoRegistration {
        chars: 94,
        final_char,
        revision: None,
    })
}

fn standard_specs() -> Vec<CharsetSpec> {
    const GL94: (u8, u8) = (0x21, 0x7E);

    let mut ascii = offset_spec("ascii", vec![(0x00, 0x7F)], 0);
    ascii.ascii_compatible = true;
    ascii.iso = iso94(b'B');

    let mut iso8859_1 = offset_spec("iso-8859-1", vec![(0x00, 0xFF)], 0);
    iso8859_1.ascii_compatible = true;

    let mut latin1 = offset_spec("latin-iso8859-1", vec![(0x20, 0x7F)], 0xA0);
    latin1.iso = Some(IsoRegistration {
        chars: 96,
        final_char: b'A',
        revision: None,
    });
    latin1.emacs_mule_id = Some(0x81);

    let mut unicode = offset_spec("unicode", vec![(0x00, 0x10), (0x00, 0xFF), (0x00, 0xFF)], 0);
    unicode.ascii_compatible = true;
    unicode.max_char = Some(MAX_UNICODE_CHAR);

    let mut bmp = offset_spec("unicode-bmp", vec![(0x00, 0xFF), (0x00, 0xFF)], 0);
    bmp.ascii_compatible = true;

    let mut emacs = offset_spec("emacs", vec![(0x00, 0x3F), (0x00, 0xFF), (0x00, 0xFF)], 0);
    emacs.ascii_compatible = true;
    emacs.max_char = Some(MAX_5_BYTE_CHAR);

    let eight_bit = offset_spec("eight-bit", vec![(0x80, 0xFF)], 0x3FFF80);

    let mut roman_entries: Vec<(u32, u32)> = (0x21..=0x7E).map(|c| (c, c)).collect();
    for entry in &mut roman_entries {
        match entry.0 {
            0x5C => entry.1 = 0xA5,
            0x7E => entry.1 = 0x203E,
            _ => {}
        }
    }
    let latin_jisx0201 = CharsetSpec {
        name: "latin-jisx0201".into(),
        dimension: 1,
        code_space: vec![GL94],
        method: CharsetMethod::Map {
            entries: roman_entries,
        },
        iso: iso94(b'J'),
        emacs_mule_id: Some(0x8A),
        ascii_compatible: false,
        max_char: None,
    };

    let mut kana = offset_spec("katakana-jisx0201", vec![(0x21, 0x5F)], 0xFF61);
    kana.iso = iso94(b'I');
    kana.emacs_mule_id = Some(0x89);

    let cjk = |name: &str, block: u32, final_char: u8, mule: u8| {
        let mut spec = offset_spec(
            name,
            vec![GL94, GL94],
            PRIVATE_CHARSET_BASE + block * BLOCK_94X94,
        );
        spec.iso = iso94(final_char);
        spec.emacs_mule_id = Some(mule);
        spec
    };

    let big5 = offset_spec(
        "big5",
        vec![(0xA1, 0xFE), (0x40, 0xFE)],
        PRIVATE_CHARSET_BASE + 5 * BLOCK_94X94,
    );

    let mule_unicode = |name: &str, final_char: u8, mule: u8, code_offset: u32, max_char: u32| {
        let mut spec = offset_spec(name, vec![(0x20, 0x7F), (0x20, 0x7F)], code_offset);
        spec.iso = Some(IsoRegistration {
            chars: 96,
            final_char,
            revision: None,
        });
        spec.emacs_mule_id = Some(mule);
        spec.max_char = Some(max_char);
        spec
    };

    vec![
        ascii,
        iso8859_1,
        latin1,
        unicode,
        bmp,
        emacs,
        eight_bit,
        latin_jisx0201,
        kana,
        cjk("japanese-jisx0208", 0, b'B', 0x92),
        cjk("japanese-jisx0208-1978", 1, b'@', 0x90),
        cjk("chinese-gb2312", 2, b'A', 0x91),
        cjk("korean-ksc5601", 3, b'C', 0x93),
        cjk("japanese-jisx0212", 4, b'D', 0x94),
        big5,
        mule_unicode("mule-unicode-0100-24ff", b'1', 0xF2, 0x100, 0x24FF),
        mule_unicode("mule-unicode-2500-33ff", b'2', 0xF3, 0x2500, 0x33FF),
        mule_unicode("mule-unicode-e000-ffff", b'3', 0xF4, 0xE000, 0xFFFF),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lookup() {
        let cs = Charsets::standard();
        let ascii = cs.lookup("ascii").unwrap();
        assert_eq!(cs.dimension(ascii), 1);
        assert!(cs.ascii_compatible(ascii));
        assert_eq!(cs.find_iso(1, 94, b'B'), Some(ascii));
        let jis = cs.lookup("japanese-jisx0208").unwrap();
        assert_eq!(cs.find_iso(2, 94, b'B'), Some(jis));
        assert_eq!(cs.find_emacs_mule(0x92), Some(jis));
        assert_eq!(cs.name(jis), "japanese-jisx0208");
        assert_eq!(cs.id("japanese-jisx0208").unwrap(), jis);
        assert!(matches!(cs.id("klingon"), Err(Error::UnknownCharset(name)) if name == "klingon"));
    }

    #[test]
    fn test_offset_method_is_linear() {
        let cs = Charsets::standard();
        let latin1 = cs.lookup("latin-iso8859-1").unwrap();
        assert_eq!(cs.decode(latin1, 0x69), Some(0xE9));
        assert_eq!(cs.encode(latin1, 0xE9), Some(0x69));
        assert_eq!(cs.encode(latin1, 0x41), None);

        let jis = cs.lookup("japanese-jisx0208").unwrap();
        assert_eq!(cs.decode(jis, 0x2121), Some(PRIVATE_CHARSET_BASE));
        assert_eq!(cs.decode(jis, 0x2221), Some(PRIVATE_CHARSET_BASE + 94));
        assert_eq!(cs.encode(jis, PRIVATE_CHARSET_BASE + 95), Some(0x2222));
        assert_eq!(cs.decode(jis, 0x2020), None);
    }

    #[test]
    fn test_map_method() {
        let cs = Charsets::standard();
        let roman = cs.lookup("latin-jisx0201").unwrap();
        assert_eq!(cs.decode(roman, 0x5C), Some(0xA5));
        assert_eq!(cs.encode(roman, 0x203E), Some(0x7E));
        assert_eq!(cs.encode(roman, 0x5C), None);
        assert_eq!(cs.encode(roman, u32::from(b'A')), Some(0x41));
    }

    #[test]
    fn test_unicode_charset_bounds() {
        let cs = Charsets::standard();
        let unicode = cs.lookup("unicode").unwrap();
        assert_eq!(cs.encode(unicode, 0x10FFFF), Some(0x10FFFF));
        assert_eq!(cs.encode(unicode, 0x110000), None);
        let eight_bit = cs.lookup("eight-bit").unwrap();
        assert_eq!(cs.decode(eight_bit, 0x80), Some(0x3FFF80));
        let mule = cs.lookup("mule-unicode-2500-33ff").unwrap();
        assert_eq!(cs.encode(mule, 0x3042), Some(0x2020 + (((0x3042 - 0x2500) / 96) << 8) + (0x3042 - 0x2500) % 96));
        assert_eq!(cs.encode(mule, 0x3400), None);
        assert_eq!(cs.find_iso(2, 96, b'2'), Some(mule));
    }

    #[test]
    fn test_define_rejects_bad_specs() {
        let mut cs = Charsets::standard();
        let mut spec = offset_spec("bad", vec![(0x21, 0x7E)], 0x200000);
        spec.dimension = 2;
        assert!(cs.define(spec).is_err());

        let mut taken = offset_spec("dup-final", vec![(0x21, 0x7E)], 0x200000);
        taken.iso = iso94(b'B');
        assert!(cs.define(taken).is_err());

        let fresh = offset_spec("private-1", vec![(0x21, 0x7E)], 0x200000);
        let id = cs.define(fresh).unwrap();
        assert_eq!(cs.decode(id, 0x21), Some(0x200000));
    }
}
