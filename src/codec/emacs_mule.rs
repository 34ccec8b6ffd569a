//! The emacs-mule internal format.
//!
//! Each non-ASCII character is its charset's leading byte followed by the
//! code bytes with the high bit set. Official leading bytes are
//! `0x81..=0x8F` (one code byte) and `0x90..=0x99` (two); private charsets
//! go through the `0x9A..=0x9D` prefixes. A `0x80` byte starts a
//! composition, in either the old or the new layout.

use std::sync::Arc;

use crate::charbuf::{CompositionMethod, CompositionRule, MAX_COMPOSITION_COMPONENTS, WorkItem};
use crate::charset::{CharsetId, CharsetRegistry, char_charset};
use crate::coding::CodingCategory;
use crate::detection::DetectionInfo;
use crate::multibyte::{char_is_byte8, char_to_byte8};
use crate::session::{CodingResult, Session};

const COMPOSITION_START: u8 = 0x80;
const RULE_BASED_OLD: u8 = 0xFF;

enum Step {
    Char(Option<CharsetId>, u32, usize),
    Incomplete,
    Invalid,
}

/// Total length of the sequence started by leading byte `b`, if it is one.
fn sequence_len(b: u8) -> Option<usize> {
    match b {
        0x81..=0x8F => Some(2),
        0x90..=0x99 => Some(3),
        0x9A | 0x9B => Some(3),
        0x9C | 0x9D => Some(4),
        _ => None,
    }
}

/// Reads one character (not a composition) from the head of `bytes`.
fn read_char(charsets: &dyn CharsetRegistry, bytes: &[u8]) -> Step {
    let b = bytes[0];
    if b < 0x80 {
        return Step::Char(None, u32::from(b), 1);
    }
    let Some(len) = sequence_len(b) else {
        return Step::Invalid;
    };
    for i in 1..len {
        match bytes.get(i) {
            Some(&t) if t >= 0xA0 => {}
            Some(_) => return Step::Invalid,
            None => return Step::Incomplete,
        }
    }
    let (mule_id, code_bytes) = match b {
        0x81..=0x99 => (b, &bytes[1..len]),
        _ => (bytes[1], &bytes[2..len]),
    };
    let code = code_bytes
        .iter()
        .fold(0u32, |code, &t| (code << 8) | u32::from(t & 0x7F));
    let decoded = charsets.find_emacs_mule(mule_id).and_then(|id| {
        (usize::from(charsets.dimension(id)) == code_bytes.len())
            .then(|| charsets.decode(id, code))?
            .map(|c| (id, c))
    });
    match decoded {
        Some((id, c)) => Step::Char(Some(id), c, len),
        None => Step::Invalid,
    }
}

/// Reads a component of an old-layout composition, whose leading byte is
/// shifted up by `0x20` (`0xA0` introduces an ASCII byte).
fn read_old_component(charsets: &dyn CharsetRegistry, bytes: &[u8]) -> Step {
    match bytes[0] {
        0xA0 => match bytes.get(1) {
            Some(&t) if t >= 0xA0 => Step::Char(None, u32::from(t & 0x7F), 2),
            Some(_) => Step::Invalid,
            None => Step::Incomplete,
        },
        b @ 0xA1..=0xBD => {
            let mut shifted = [0u8; 4];
            let n = bytes.len().min(4);
            shifted[..n].copy_from_slice(&bytes[..n]);
            shifted[0] = b - 0x20;
            read_char(charsets, &shifted[..n])
        }
        _ => Step::Invalid,
    }
}

enum Composition {
    Done {
        method: CompositionMethod,
        components: Vec<WorkItem>,
        len: usize,
    },
    Incomplete,
    Invalid,
}

fn read_composition(charsets: &dyn CharsetRegistry, bytes: &[u8], last: bool) -> Composition {
    match bytes.get(1) {
        None => Composition::Incomplete,
        Some(0xF0..=0xF3) => read_new_composition(charsets, bytes),
        Some(&RULE_BASED_OLD) => read_old_composition(charsets, bytes, 2, true, last),
        Some(_) => read_old_composition(charsets, bytes, 1, false, last),
    }
}

fn read_new_composition(charsets: &dyn CharsetRegistry, bytes: &[u8]) -> Composition {
    if bytes.len() < 4 {
        return Composition::Incomplete;
    }
    let Some(method) = CompositionMethod::from_code(bytes[1] - 0xF0) else {
        return Composition::Invalid;
    };
    if bytes[2] < 0xA0 || bytes[3] < 0xA0 {
        return Composition::Invalid;
    }
    let nbytes = usize::from(bytes[2] - 0xA0);
    let nchars = usize::from(bytes[3] - 0xA0);
    if nbytes < 4 || nchars == 0 || nchars > MAX_COMPOSITION_COMPONENTS {
        return Composition::Invalid;
    }
    if bytes.len() < nbytes {
        return Composition::Incomplete;
    }
    let body = &bytes[..nbytes];
    let mut components = Vec::with_capacity(nchars * 2);
    let mut pos = 4;
    let mut expect_rule = false;
    while pos < nbytes {
        if expect_rule {
            let Some(rule) = body[pos]
                .checked_sub(0xA0)
                .and_then(CompositionRule::unpack)
            else {
                return Composition::Invalid;
            };
            components.push(WorkItem::Rule(rule));
            pos += 1;
            expect_rule = false;
            continue;
        }
        match read_char(charsets, &body[pos..]) {
            Step::Char(_, c, len) => {
                components.push(WorkItem::Char(c));
                pos += len;
                expect_rule = method.has_rules();
            }
            _ => return Composition::Invalid,
        }
    }
    let count = components
        .iter()
        .filter(|item| matches!(item, WorkItem::Char(_)))
        .count();
    if count != nchars {
        return Composition::Invalid;
    }
    Composition::Done {
        method,
        components,
        len: nbytes,
    }
}

fn read_old_composition(
    charsets: &dyn CharsetRegistry,
    bytes: &[u8],
    start: usize,
    with_rules: bool,
    last: bool,
) -> Composition {
    let mut components = Vec::new();
    let mut chars = 0;
    let mut pos = start;
    let mut expect_rule = false;
    loop {
        if chars == MAX_COMPOSITION_COMPONENTS {
            break;
        }
        let Some(&b) = bytes.get(pos) else {
            if !last {
                return Composition::Incomplete;
            }
            break;
        };
        if expect_rule {
            match b.checked_sub(0xA0).and_then(CompositionRule::unpack) {
                Some(rule) => {
                    components.push(WorkItem::Rule(rule));
                    pos += 1;
                    expect_rule = false;
                    continue;
                }
                None => break,
            }
        }
        match read_old_component(charsets, &bytes[pos..]) {
            Step::Char(_, c, len) => {
                components.push(WorkItem::Char(c));
                chars += 1;
                pos += len;
                expect_rule = with_rules;
            }
            Step::Incomplete if !last => return Composition::Incomplete,
            _ => break,
        }
    }
    if matches!(components.last(), Some(WorkItem::Rule(_))) {
        components.pop();
        pos -= 1;
    }
    if chars < 2 {
        return Composition::Invalid;
    }
    let method = if with_rules {
        CompositionMethod::WithRule
    } else {
        CompositionMethod::Relative
    };
    Composition::Done {
        method,
        components,
        len: pos,
    }
}

pub(crate) fn decode(s: &mut Session<'_>) {
    let charsets = s.charsets;
    let ascii = charsets.lookup("ascii");
    let annotate = s.options.annotate_charsets;
    let end = s.src.len();
    let mut pos = s.consumed;

    while pos < end && !s.charbuf.is_full() {
        let b = s.src[pos];
        if b == COMPOSITION_START {
            match read_composition(charsets, &s.src[pos..], s.last_block) {
                Composition::Done {
                    method,
                    components,
                    len,
                } => {
                    s.charbuf.push_composition(method, len, &components);
                    pos += len;
                }
                Composition::Incomplete => {
                    s.result = CodingResult::InsufficientSource;
                    break;
                }
                Composition::Invalid => {
                    s.emit_raw(b);
                    pos += 1;
                }
            }
            continue;
        }
        match read_char(charsets, &s.src[pos..]) {
            Step::Char(id, c, len) => {
                match id.or(ascii) {
                    Some(id) => s.charbuf.push_charset_char(id, c, annotate),
                    None => s.charbuf.push_plain_char(c),
                }
                pos += len;
            }
            Step::Incomplete => {
                s.result = CodingResult::InsufficientSource;
                break;
            }
            Step::Invalid => {
                s.emit_raw(b);
                pos += 1;
            }
        }
    }
    s.consumed = pos;
}

/// Bytes of `c` in emacs-mule, appended to `out`.
fn put_char(charsets: &dyn CharsetRegistry, list: &[CharsetId], c: u32, out: &mut Vec<u8>) -> bool {
    if c < 0x80 {
        out.push(c as u8);
        return true;
    }
    if char_is_byte8(c) {
        out.push(char_to_byte8(c));
        return true;
    }
    let Some((id, code)) = char_charset(charsets, list, c) else {
        return false;
    };
    let Some(mule_id) = charsets.emacs_mule_id(id) else {
        return false;
    };
    match (charsets.dimension(id), mule_id) {
        (1, 0x81..=0x8F) => out.extend([mule_id, code as u8 | 0x80]),
        (1, _) => {
            let prefix = if mule_id < 0xE0 { 0x9A } else { 0x9B };
            out.extend([prefix, mule_id, code as u8 | 0x80]);
        }
        (2, 0x90..=0x99) => out.extend([mule_id, (code >> 8) as u8 | 0x80, code as u8 | 0x80]),
        (2, _) => {
            let prefix = if mule_id < 0xF0 { 0x9C } else { 0x9D };
            out.extend([prefix, mule_id, (code >> 8) as u8 | 0x80, code as u8 | 0x80]);
        }
        _ => return false,
    }
    true
}

/// New-layout composition bytes, or `None` if a component is unencodable
/// or the result is too long for the length byte.
fn composition_bytes(
    charsets: &dyn CharsetRegistry,
    list: &[CharsetId],
    method: CompositionMethod,
    nchars: usize,
    components: &[WorkItem],
) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    for item in components {
        match *item {
            WorkItem::Char(c) if !char_is_byte8(c) => {
                if !put_char(charsets, list, c, &mut body) {
                    return None;
                }
            }
            WorkItem::Rule(rule) => body.push(0xA0 + rule.pack()),
            _ => return None,
        }
    }
    let total = body.len() + 4;
    if total > 0x5F || nchars > MAX_COMPOSITION_COMPONENTS {
        return None;
    }
    let mut out = vec![
        COMPOSITION_START,
        0xF0 + method.code(),
        0xA0 + total as u8,
        0xA0 + nchars as u8,
    ];
    out.extend(body);
    Some(out)
}

pub(crate) fn encode(s: &mut Session<'_>) {
    let coding = Arc::clone(&s.coding);
    let list = &coding.charsets;
    let mut i = s.charbuf.read_pos;
    let mut bytes = Vec::with_capacity(8);
    while i < s.charbuf.len() {
        let cp = s.checkpoint();
        let item = s.charbuf.items()[i];
        match item {
            WorkItem::Char(c) => {
                s.encode_or_substitute(c, |s, c| {
                    bytes.clear();
                    let ok = put_char(s.charsets, list, c, &mut bytes);
                    if ok {
                        s.dst.extend(&bytes);
                    }
                    ok
                });
                i += 1;
            }
            WorkItem::Composition { method, nchars, .. } => {
                let body_end = composition_end(s.charbuf.items(), i + 1, nchars);
                let encoded = composition_bytes(
                    s.charsets,
                    list,
                    method,
                    nchars,
                    &s.charbuf.items()[i + 1..body_end],
                );
                match encoded {
                    Some(out) => {
                        s.dst.extend(&out);
                        i = body_end;
                    }
                    // Fall back to the bare components.
                    None => i += 1,
                }
            }
            WorkItem::Rule(_) | WorkItem::CharsetSpan { .. } => i += 1,
        }
        if s.rollback_if_overflowed(cp) {
            break;
        }
    }
    s.charbuf.read_pos = i;
}

/// Index just past the `nchars` characters (and their rules) starting at `from`.
pub(crate) fn composition_end(items: &[WorkItem], from: usize, nchars: usize) -> usize {
    let mut seen = 0;
    let mut i = from;
    while i < items.len() && seen < nchars {
        match items[i] {
            WorkItem::Char(_) => seen += 1,
            WorkItem::Rule(_) => {}
            _ => break,
        }
        i += 1;
    }
    i
}

/// Classifier for the emacs-mule category.
pub(crate) fn detect(src: &[u8], info: &mut DetectionInfo) {
    let mask = CodingCategory::EmacsMule.mask();
    info.check(mask);
    let mut found = false;
    let mut pos = 0;
    while pos < src.len() {
        let b = src[pos];
        if b < 0x80 {
            pos += 1;
            continue;
        }
        if b == COMPOSITION_START {
            pos += 1;
            while pos < src.len() && src[pos] >= 0xA0 {
                pos += 1;
            }
            found = true;
            continue;
        }
        let Some(len) = sequence_len(b) else {
            info.reject(mask);
            return;
        };
        let tail = &src[pos + 1..src.len().min(pos + len)];
        if tail.iter().any(|&t| t < 0xA0) {
            info.reject(mask);
            return;
        }
        found = true;
        pos += len;
    }
    if found {
        info.find(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AnnotationKind;
    use crate::charset::PRIVATE_CHARSET_BASE;
    use crate::{Registry, api};

    #[test]
    fn test_official_charsets() {
        let registry = Registry::new();
        let bytes = [0x41, 0x81, 0xE9, 0x92, 0xA4, 0xA2];
        let decoded = api::decode(&registry, "emacs-mule-unix", &bytes).unwrap();
        let hiragana_a = PRIVATE_CHARSET_BASE + (0x24 - 0x21) * 94 + 1;
        assert_eq!(decoded.text.chars, vec![0x41, 0xE9, hiragana_a]);
        let encoded = api::encode(&registry, "emacs-mule-unix", &decoded.text.chars).unwrap();
        assert_eq!(encoded.bytes, bytes);
    }

    #[test]
    fn test_private_two_byte_charset() {
        let registry = Registry::new();
        let encoded = api::encode(&registry, "emacs-mule-unix", &[0x3042]).unwrap();
        let idx = 0x3042 - 0x2500;
        let (c1, c2) = (0x20 + idx / 96, 0x20 + idx % 96);
        assert_eq!(encoded.bytes, vec![0x9D, 0xF3, c1 as u8 | 0x80, c2 as u8 | 0x80]);
        let decoded = api::decode(&registry, "emacs-mule-unix", &encoded.bytes).unwrap();
        assert_eq!(decoded.text.chars, vec![0x3042]);
    }

    #[test]
    fn test_new_composition_round_trip() {
        let registry = Registry::new();
        let bytes = [0x80, 0xF0, 0xA6, 0xA2, 0x61, 0x62];
        let decoded = api::decode(&registry, "emacs-mule-unix", &bytes).unwrap();
        assert_eq!(decoded.text.chars, vec![0x61, 0x62]);
        assert_eq!(decoded.text.annotations.len(), 1);
        let annotation = &decoded.text.annotations[0];
        assert_eq!((annotation.start, annotation.end), (0, 2));
        assert!(matches!(
            annotation.kind,
            AnnotationKind::Composition {
                method: CompositionMethod::Relative,
                ..
            }
        ));
        let encoded = api::encode_text(&registry, "emacs-mule-unix", &decoded.text, Default::default())
            .unwrap();
        assert_eq!(encoded.bytes, bytes);
    }

    #[test]
    fn test_old_relative_composition() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "emacs-mule-unix", &[0x80, 0xA0, 0xE1, 0xA0, 0xE2, 0x20])
            .unwrap();
        assert_eq!(decoded.text.chars, vec![0x61, 0x62, 0x20]);
        assert_eq!(decoded.text.annotations.len(), 1);
    }

    #[test]
    fn test_truncated_sequence_is_raw_at_end() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "emacs-mule-unix", &[0x92, 0xA4]).unwrap();
        assert_eq!(decoded.text.chars.len(), 2);
        assert!(decoded.text.chars.iter().all(|&c| char_is_byte8(c)));
    }

    #[test]
    fn test_detect() {
        let mut info = DetectionInfo::default();
        detect(&[0x41, 0x92, 0xA4, 0xA2], &mut info);
        assert!(info.found.has(CodingCategory::EmacsMule));
        let mut info = DetectionInfo::default();
        detect(&[0x92, 0x41], &mut info);
        assert!(info.rejected.has(CodingCategory::EmacsMule));
    }
}
