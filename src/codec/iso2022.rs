//! The ISO-2022 family: ISO-2022-JP, EUC, compound text and friends.
//!
//! Four graphic registers G0..G3 hold designated charsets; GL and GR are
//! invoked from them by locking shifts, and single shifts borrow G2/G3 for
//! one character. Which of these mechanisms a coding system may use is set
//! by its [`Iso2022Flags`].

use std::sync::Arc;

use crate::buffer::Destination;
use crate::charbuf::{
    CHARBUF_SLACK, CompositionMethod, CompositionRule, MAX_COMPOSITION_COMPONENTS, WorkItem,
};
use crate::charset::{CharsetId, CharsetRegistry, char_charset};
use crate::coding::{CategoryMask, CodecKind, CodingCategory, CodingSystem, Iso2022Flags, Iso2022Params};
use crate::detection::DetectionInfo;
use crate::multibyte::{char_is_byte8, char_to_byte8};
use crate::session::{CodingResult, Iso2022State, Session};

const ESC: u8 = 0x1B;
const SO: u8 = 0x0E;
const SI: u8 = 0x0F;
const SS2: u8 = 0x8E;
const SS3: u8 = 0x8F;
const CSI: u8 = 0x9B;

/// Longest composition the decoder scans ahead for.
const MAX_COMPOSITION_BYTES: usize = 48;

/// A recognized escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    Designate {
        reg: u8,
        dimension: u8,
        chars: u8,
        final_char: u8,
    },
    Revision,
    LockingShift {
        reg: u8,
        right: bool,
    },
    SingleShift(u8),
    CompositionStart(CompositionMethod),
    CompositionEnd,
    Direction(u8),
    ExtendedSegment {
        length: usize,
    },
    Utf8Start,
    Utf8End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parsed {
    Escape(Escape, usize),
    Incomplete,
    Invalid,
}

#[inline]
fn is_final(b: u8) -> bool {
    (0x30..=0x7E).contains(&b)
}

/// Parses the escape sequence at the head of `bytes` (`bytes[0]` is ESC).
fn parse_escape(bytes: &[u8]) -> Parsed {
    let at = |i: usize| bytes.get(i).copied();
    let Some(b1) = at(1) else {
        return Parsed::Incomplete;
    };
    let designate = |reg: u8, dimension: u8, chars: u8, i: usize| match at(i) {
        None => Parsed::Incomplete,
        Some(f) if is_final(f) => Parsed::Escape(
            Escape::Designate {
                reg,
                dimension,
                chars,
                final_char: f,
            },
            i + 1,
        ),
        Some(_) => Parsed::Invalid,
    };
    match b1 {
        b'(' | b')' | b'*' | b'+' => designate(b1 - b'(', 1, 94, 2),
        b',' | b'-' | b'.' | b'/' => designate(b1 - b',', 1, 96, 2),
        b'$' => match at(2) {
            None => Parsed::Incomplete,
            Some(f @ (b'@' | b'A' | b'B')) => Parsed::Escape(
                Escape::Designate {
                    reg: 0,
                    dimension: 2,
                    chars: 94,
                    final_char: f,
                },
                3,
            ),
            Some(b2 @ b'('..=b'+') => designate(b2 - b'(', 2, 94, 3),
            Some(b2 @ b','..=b'/') => designate(b2 - b',', 2, 96, 3),
            Some(_) => Parsed::Invalid,
        },
        b'&' => match at(2) {
            None => Parsed::Incomplete,
            Some(0x40..=0x7E) => Parsed::Escape(Escape::Revision, 3),
            Some(_) => Parsed::Invalid,
        },
        b'n' => Parsed::Escape(Escape::LockingShift { reg: 2, right: false }, 2),
        b'o' => Parsed::Escape(Escape::LockingShift { reg: 3, right: false }, 2),
        b'~' => Parsed::Escape(Escape::LockingShift { reg: 1, right: true }, 2),
        b'}' => Parsed::Escape(Escape::LockingShift { reg: 2, right: true }, 2),
        b'|' => Parsed::Escape(Escape::LockingShift { reg: 3, right: true }, 2),
        b'N' => Parsed::Escape(Escape::SingleShift(2), 2),
        b'O' => Parsed::Escape(Escape::SingleShift(3), 2),
        b'0' => Parsed::Escape(Escape::CompositionStart(CompositionMethod::Relative), 2),
        b'2' => Parsed::Escape(Escape::CompositionStart(CompositionMethod::WithAltChars), 2),
        b'3' => Parsed::Escape(Escape::CompositionStart(CompositionMethod::WithRule), 2),
        b'4' => Parsed::Escape(
            Escape::CompositionStart(CompositionMethod::WithRuleAltChars),
            2,
        ),
        b'1' => Parsed::Escape(Escape::CompositionEnd, 2),
        b'[' => match (at(2), at(3)) {
            (None, _) => Parsed::Incomplete,
            (Some(b']'), _) => Parsed::Escape(Escape::Direction(0), 3),
            (Some(b'0'..=b'2'), None) => Parsed::Incomplete,
            (Some(d @ b'0'..=b'2'), Some(b']')) => Parsed::Escape(Escape::Direction(d - b'0'), 4),
            _ => Parsed::Invalid,
        },
        b'%' => match at(2) {
            None => Parsed::Incomplete,
            Some(b'G') => Parsed::Escape(Escape::Utf8Start, 3),
            Some(b'@') => Parsed::Escape(Escape::Utf8End, 3),
            Some(b'/') => match (at(3), at(4), at(5)) {
                (Some(b'0'..=b'4'), Some(m), Some(l)) if m >= 0x80 && l >= 0x80 => {
                    let length = usize::from(m & 0x7F) * 128 + usize::from(l & 0x7F);
                    Parsed::Escape(Escape::ExtendedSegment { length }, 6)
                }
                (None, _, _) | (Some(b'0'..=b'4'), None, _) | (Some(b'0'..=b'4'), Some(_), None) => {
                    Parsed::Incomplete
                }
                _ => Parsed::Invalid,
            },
            Some(_) => Parsed::Invalid,
        },
        _ => Parsed::Invalid,
    }
}

/// Register the right half (GR) starts out invoked from.
fn initial_gr(params: &Iso2022Params) -> Option<u8> {
    (!params.seven_bits()).then_some(1)
}

fn initialize(st: &mut Iso2022State, params: &Iso2022Params) {
    if st.initialized {
        return;
    }
    st.designation = params.initial;
    st.gl = 0;
    st.gr = initial_gr(params);
    st.bol = true;
    st.initialized = true;
}

/// Whether the coding system may use `charset` at all.
fn allowed(list: &[CharsetId], charset: CharsetId) -> bool {
    list.is_empty() || list.contains(&charset)
}

enum Graphic {
    Char(CharsetId, u32, usize),
    Incomplete,
    Invalid,
}

/// Reads a `charset` code from `bytes`, all of which must be in GL
/// (`high == false`) or in GR.
fn read_graphic(charsets: &dyn CharsetRegistry, charset: CharsetId, bytes: &[u8], high: bool) -> Graphic {
    let dim = usize::from(charsets.dimension(charset));
    let mut code = 0u32;
    for i in 0..dim {
        let Some(&b) = bytes.get(i) else {
            return Graphic::Incomplete;
        };
        if (b >= 0x80) != high || (b & 0x7F) < 0x20 {
            return Graphic::Invalid;
        }
        code = (code << 8) | u32::from(b & 0x7F);
    }
    match charsets.decode(charset, code) {
        Some(c) => Graphic::Char(charset, c, dim),
        None => Graphic::Invalid,
    }
}

/// Decodes the graphic character at the head of `bytes` through register
/// `reg`. Space and DEL in a 94-set register read as themselves.
fn read_through(
    charsets: &dyn CharsetRegistry,
    st: &Iso2022State,
    reg: u8,
    bytes: &[u8],
) -> Graphic {
    let Some(&b) = bytes.first() else {
        return Graphic::Incomplete;
    };
    let Some(charset) = st.designation[usize::from(reg)] else {
        return Graphic::Invalid;
    };
    let is_94 = charsets
        .iso_registration(charset)
        .is_none_or(|iso| iso.chars == 94);
    if is_94 && matches!(b & 0x7F, 0x20 | 0x7F) {
        return if b < 0x80 {
            Graphic::Char(charset, u32::from(b), 1)
        } else {
            Graphic::Invalid
        };
    }
    read_graphic(charsets, charset, bytes, b >= 0x80)
}

/// Applies a designation, returning `false` if the charset is unknown or not
/// usable by the coding system.
fn designate(
    charsets: &dyn CharsetRegistry,
    list: &[CharsetId],
    st: &mut Iso2022State,
    esc: Escape,
) -> bool {
    let Escape::Designate {
        reg,
        dimension,
        chars,
        final_char,
    } = esc
    else {
        return false;
    };
    match charsets.find_iso(dimension, chars, final_char) {
        Some(id) if allowed(list, id) => {
            st.designation[usize::from(reg)] = Some(id);
            true
        }
        _ => false,
    }
}

fn locking_shift(params: &Iso2022Params, st: &mut Iso2022State, reg: u8, right: bool) -> bool {
    if !params.flags.contains(Iso2022Flags::LOCKING_SHIFT) {
        return false;
    }
    if right {
        if params.seven_bits() {
            return false;
        }
        st.gr = Some(reg);
    } else {
        st.gl = reg;
    }
    true
}

enum Composition {
    Done(Vec<WorkItem>, usize),
    Incomplete,
    Invalid,
}

/// Reads a composition body up to and including `ESC 1`. `bytes` starts
/// just past the opening escape.
fn read_composition(
    charsets: &dyn CharsetRegistry,
    params: &Iso2022Params,
    list: &[CharsetId],
    st: &mut Iso2022State,
    method: CompositionMethod,
    bytes: &[u8],
    last: bool,
) -> Composition {
    let mut components = Vec::new();
    let mut nchars = 0;
    let mut expect_rule = false;
    let mut pos = 0;
    loop {
        if pos >= MAX_COMPOSITION_BYTES {
            return Composition::Invalid;
        }
        let Some(&b) = bytes.get(pos) else {
            return if last {
                Composition::Invalid
            } else {
                Composition::Incomplete
            };
        };
        if b == ESC {
            match parse_escape(&bytes[pos..]) {
                Parsed::Escape(Escape::CompositionEnd, len) => {
                    if nchars == 0 {
                        return Composition::Invalid;
                    }
                    return Composition::Done(components, pos + len);
                }
                Parsed::Escape(esc @ Escape::Designate { .. }, len) => {
                    if !designate(charsets, list, st, esc) {
                        return Composition::Invalid;
                    }
                    pos += len;
                }
                Parsed::Escape(Escape::LockingShift { reg, right }, len) => {
                    if !locking_shift(params, st, reg, right) {
                        return Composition::Invalid;
                    }
                    pos += len;
                }
                Parsed::Incomplete if !last => return Composition::Incomplete,
                _ => return Composition::Invalid,
            }
            continue;
        }
        if expect_rule && (0x20..0x7F).contains(&b) {
            let Some(rule) = CompositionRule::unpack(b - 0x20) else {
                return Composition::Invalid;
            };
            components.push(WorkItem::Rule(rule));
            expect_rule = false;
            pos += 1;
            continue;
        }
        let reg = if b >= 0x80 {
            match st.gr {
                Some(reg) => reg,
                None => return Composition::Invalid,
            }
        } else {
            st.gl
        };
        if (b & 0x7F) < 0x20 {
            return Composition::Invalid;
        }
        match read_through(charsets, st, reg, &bytes[pos..]) {
            Graphic::Char(_, c, len) => {
                if nchars == MAX_COMPOSITION_COMPONENTS {
                    return Composition::Invalid;
                }
                components.push(WorkItem::Char(c));
                nchars += 1;
                pos += len;
                expect_rule = method.has_rules();
            }
            Graphic::Incomplete if !last => return Composition::Incomplete,
            _ => return Composition::Invalid,
        }
    }
}

/// Emits a byte the decoder could not interpret and falls back to ASCII
/// in GL.
fn invalid(s: &mut Session<'_>, st: &mut Iso2022State, b: u8, ascii: Option<CharsetId>) {
    s.emit_raw(b);
    st.designation[0] = ascii;
    st.gl = 0;
}

pub(crate) fn decode(s: &mut Session<'_>, params: &Iso2022Params) {
    let charsets = s.charsets;
    let coding = Arc::clone(&s.coding);
    let list = &coding.charsets;
    let ascii = charsets.lookup("ascii");
    let annotate = s.options.annotate_charsets;
    let seven_bits = params.seven_bits();
    let single_shift = params.flags.contains(Iso2022Flags::SINGLE_SHIFT);
    let reset_at_eol = params.flags.contains(Iso2022Flags::RESET_AT_EOL)
        || params.flags.contains(Iso2022Flags::INIT_AT_BOL);
    let mut st = s.state.iso;
    initialize(&mut st, params);
    let end = s.src.len();
    let mut pos = s.consumed;

    while pos < end && !s.charbuf.is_full() {
        if st.ext_segment > 0 {
            let n = st.ext_segment.min(end - pos).min(CHARBUF_SLACK);
            let segment = s.src[pos..pos + n].to_vec();
            s.emit_verbatim(&segment);
            st.ext_segment -= n;
            pos += n;
            continue;
        }
        let b = s.src[pos];

        if st.utf8_embedded {
            if b == ESC {
                match parse_escape(&s.src[pos..]) {
                    Parsed::Escape(Escape::Utf8End, len) => {
                        st.utf8_embedded = false;
                        pos += len;
                        continue;
                    }
                    Parsed::Incomplete if !s.last_block => {
                        s.result = CodingResult::InsufficientSource;
                        break;
                    }
                    _ => {}
                }
            }
            match super::utf8::read_char(&s.src[pos..], false) {
                super::utf8::Utf8Step::Char(c, len) => {
                    s.charbuf.push_plain_char(c);
                    pos += len;
                }
                super::utf8::Utf8Step::Invalid => {
                    s.emit_raw(b);
                    pos += 1;
                }
                super::utf8::Utf8Step::Incomplete => {
                    s.result = CodingResult::InsufficientSource;
                    break;
                }
            }
            continue;
        }

        match b {
            ESC => match parse_escape(&s.src[pos..]) {
                Parsed::Incomplete => {
                    s.result = CodingResult::InsufficientSource;
                    break;
                }
                Parsed::Invalid => {
                    invalid(s, &mut st, b, ascii);
                    pos += 1;
                }
                Parsed::Escape(esc, len) => {
                    let ok = match esc {
                        Escape::Designate { .. } => designate(charsets, list, &mut st, esc),
                        Escape::Revision => true,
                        Escape::LockingShift { reg, right } => {
                            locking_shift(params, &mut st, reg, right)
                        }
                        Escape::SingleShift(reg) => {
                            if !single_shift {
                                false
                            } else {
                                match read_through(charsets, &st, reg, &s.src[pos + len..]) {
                                    Graphic::Char(id, c, n) => {
                                        s.charbuf.push_charset_char(id, c, annotate);
                                        pos += n;
                                        true
                                    }
                                    Graphic::Incomplete => {
                                        s.result = CodingResult::InsufficientSource;
                                        break;
                                    }
                                    Graphic::Invalid => false,
                                }
                            }
                        }
                        Escape::CompositionStart(method) => {
                            let mut inner = st;
                            match read_composition(
                                charsets,
                                params,
                                list,
                                &mut inner,
                                method,
                                &s.src[pos + len..],
                                s.last_block,
                            ) {
                                Composition::Done(components, body) => {
                                    s.charbuf.push_composition(method, len + body, &components);
                                    st = inner;
                                    pos += body;
                                    true
                                }
                                Composition::Incomplete => {
                                    s.result = CodingResult::InsufficientSource;
                                    break;
                                }
                                Composition::Invalid => false,
                            }
                        }
                        // A stray end marker is dropped.
                        Escape::CompositionEnd => true,
                        Escape::Direction(direction) => {
                            st.direction = direction;
                            true
                        }
                        Escape::ExtendedSegment { length } => {
                            let header = s.src[pos..pos + len].to_vec();
                            s.emit_verbatim(&header);
                            st.ext_segment = length;
                            true
                        }
                        Escape::Utf8Start => {
                            st.utf8_embedded = true;
                            true
                        }
                        Escape::Utf8End => true,
                    };
                    if ok {
                        pos += len;
                    } else {
                        invalid(s, &mut st, b, ascii);
                        pos += 1;
                    }
                }
            },
            SO | SI if params.flags.contains(Iso2022Flags::LOCKING_SHIFT) => {
                st.gl = if b == SO { 1 } else { 0 };
                pos += 1;
            }
            0x00..=0x1F => {
                s.charbuf.push_plain_char(u32::from(b));
                if reset_at_eol && (b == b'\n' || b == b'\r') {
                    st.designation = params.initial;
                    st.gl = 0;
                    st.gr = initial_gr(params);
                }
                pos += 1;
            }
            0x80..=0x9F if seven_bits => {
                s.emit_raw(b);
                pos += 1;
            }
            SS2 | SS3 if single_shift => {
                let reg = if b == SS2 { 2 } else { 3 };
                match read_through(charsets, &st, reg, &s.src[pos + 1..]) {
                    Graphic::Char(id, c, n) => {
                        s.charbuf.push_charset_char(id, c, annotate);
                        pos += 1 + n;
                    }
                    Graphic::Incomplete => {
                        s.result = CodingResult::InsufficientSource;
                        break;
                    }
                    Graphic::Invalid => {
                        s.emit_raw(b);
                        pos += 1;
                    }
                }
            }
            CSI => match (s.src.get(pos + 1), s.src.get(pos + 2)) {
                (Some(b']'), _) => {
                    st.direction = 0;
                    pos += 2;
                }
                (Some(&d @ b'0'..=b'2'), Some(b']')) => {
                    st.direction = d - b'0';
                    pos += 3;
                }
                (None, _) | (Some(b'0'..=b'2'), None) => {
                    s.result = CodingResult::InsufficientSource;
                    break;
                }
                _ => {
                    s.charbuf.push_plain_char(u32::from(b));
                    pos += 1;
                }
            },
            0x80..=0x9F => {
                s.charbuf.push_plain_char(u32::from(b));
                pos += 1;
            }
            _ => {
                let reg = if b >= 0x80 { st.gr } else { Some(st.gl) };
                if b >= 0x80 && seven_bits {
                    s.emit_raw(b);
                    pos += 1;
                    continue;
                }
                let graphic = match reg {
                    Some(reg) => read_through(charsets, &st, reg, &s.src[pos..]),
                    None => Graphic::Invalid,
                };
                match graphic {
                    Graphic::Char(id, c, n) => {
                        s.charbuf.push_charset_char(id, c, annotate);
                        pos += n;
                    }
                    Graphic::Incomplete => {
                        s.result = CodingResult::InsufficientSource;
                        break;
                    }
                    Graphic::Invalid if b < 0x80 => {
                        // Nothing usable in GL: emit the byte raw and reset G0 to ASCII in GL.
                        invalid(s, &mut st, b, ascii);
                        pos += 1;
                    }
                    Graphic::Invalid => {
                        s.emit_raw(b);
                        pos += 1;
                    }
                }
            }
        }
    }
    s.state.iso = st;
    s.consumed = pos;
}

/// Appends the designation of `charset` to `reg`.
fn put_designation(
    charsets: &dyn CharsetRegistry,
    flags: Iso2022Flags,
    charset: CharsetId,
    reg: u8,
    out: &mut Destination,
) {
    let Some(iso) = charsets.iso_registration(charset) else {
        return;
    };
    if let Some(revision) = iso.revision {
        out.extend(&[ESC, b'&', revision]);
    }
    let is_96 = iso.chars == 96;
    let base = if is_96 { b',' } else { b'(' };
    if charsets.dimension(charset) == 1 {
        out.extend(&[ESC, base + reg, iso.final_char]);
    } else if reg == 0
        && !is_96
        && !flags.contains(Iso2022Flags::LONG_FORM)
        && matches!(iso.final_char, b'@' | b'A' | b'B')
    {
        out.extend(&[ESC, b'$', iso.final_char]);
    } else {
        out.extend(&[ESC, b'$', base + reg, iso.final_char]);
    }
}

/// Restores the initial designations and invocations.
fn put_reset(s: &mut Session<'_>, params: &Iso2022Params) {
    let mut st = s.state.iso;
    if st.gl != 0 {
        s.dst.push(SI);
        st.gl = 0;
    }
    for reg in 0..4u8 {
        let initial = params.initial[usize::from(reg)];
        if st.designation[usize::from(reg)] != initial {
            if let Some(id) = initial {
                put_designation(s.charsets, params.flags, id, reg, &mut s.dst);
            }
            st.designation[usize::from(reg)] = initial;
        }
    }
    st.gr = initial_gr(params);
    s.state.iso = st;
}

/// Register `charset` goes to when the coding system does not say.
fn default_register(charsets: &dyn CharsetRegistry, params: &Iso2022Params, charset: CharsetId) -> u8 {
    let small = charsets.dimension(charset) == 1
        && charsets
            .iso_registration(charset)
            .is_none_or(|iso| iso.chars == 94);
    if params.seven_bits() && !params.flags.contains(Iso2022Flags::LOCKING_SHIFT) {
        0
    } else if small {
        0
    } else {
        1
    }
}

fn register_for(
    charsets: &dyn CharsetRegistry,
    params: &Iso2022Params,
    st: &Iso2022State,
    charset: CharsetId,
) -> u8 {
    if let Some(reg) = st.designation.iter().position(|&d| d == Some(charset)) {
        return reg as u8;
    }
    if let Some(reg) = params.register_of(charset) {
        return reg;
    }
    if let Some(reg) = params.initial.iter().position(|&d| d == Some(charset)) {
        return reg as u8;
    }
    default_register(charsets, params, charset)
}

/// How a register's characters reach the byte stream.
enum Invocation {
    /// Already in GL.
    Gl,
    /// Already in GR.
    Gr,
    /// Locking shift into GL first.
    Shift(&'static [u8], u8),
    /// Single shift prefix; the flag tells whether the code goes in GR.
    Single(&'static [u8], bool),
}

fn invocation(params: &Iso2022Params, st: &Iso2022State, reg: u8) -> Option<Invocation> {
    let flags = params.flags;
    let locking = flags.contains(Iso2022Flags::LOCKING_SHIFT);
    let seven = params.seven_bits();
    if st.gl == reg {
        return Some(Invocation::Gl);
    }
    if !seven && st.gr == Some(reg) {
        return Some(Invocation::Gr);
    }
    match reg {
        0 => Some(Invocation::Shift(&[SI], 0)),
        1 if locking => Some(Invocation::Shift(&[SO], 1)),
        2 | 3 if flags.contains(Iso2022Flags::SINGLE_SHIFT) => Some(match (reg, seven) {
            (2, true) => Invocation::Single(&[ESC, b'N'], false),
            (2, false) => Invocation::Single(&[SS2], true),
            (_, true) => Invocation::Single(&[ESC, b'O'], false),
            (_, false) => Invocation::Single(&[SS3], true),
        }),
        2 if locking => Some(Invocation::Shift(&[ESC, b'n'], 2)),
        3 if locking => Some(Invocation::Shift(&[ESC, b'o'], 3)),
        _ => None,
    }
}

/// Encodes a graphic character, designating and invoking as needed.
fn put_graphic(
    s: &mut Session<'_>,
    params: &Iso2022Params,
    list: &[CharsetId],
    c: u32,
    preferred: Option<CharsetId>,
) -> bool {
    let charsets = s.charsets;
    let found = preferred
        .filter(|&id| allowed(list, id))
        .and_then(|id| charsets.encode(id, c).map(|code| (id, code)))
        .or_else(|| char_charset(charsets, list, c));
    let Some((charset, code)) = found else {
        return false;
    };
    if charsets.iso_registration(charset).is_none() {
        return false;
    }
    let mut st = s.state.iso;
    let reg = register_for(charsets, params, &st, charset);
    let designated = st.designation[usize::from(reg)] == Some(charset);
    if !designated && !params.flags.contains(Iso2022Flags::DESIGNATION) {
        return false;
    }
    let Some(invoke) = invocation(params, &st, reg) else {
        return false;
    };
    if !designated {
        put_designation(charsets, params.flags, charset, reg, &mut s.dst);
        st.designation[usize::from(reg)] = Some(charset);
    }
    let high = match invoke {
        Invocation::Gl => false,
        Invocation::Gr => true,
        Invocation::Shift(bytes, reg) => {
            s.dst.extend(bytes);
            st.gl = reg;
            false
        }
        Invocation::Single(bytes, high) => {
            s.dst.extend(bytes);
            high
        }
    };
    let dim = usize::from(charsets.dimension(charset));
    let code_bytes = code.to_be_bytes();
    for &b in &code_bytes[4 - dim..] {
        s.dst.push(if high { b | 0x80 } else { b & 0x7F });
    }
    st.bol = false;
    s.state.iso = st;
    true
}

fn put_char(
    s: &mut Session<'_>,
    params: &Iso2022Params,
    list: &[CharsetId],
    c: u32,
    preferred: Option<CharsetId>,
) -> bool {
    if c < 0x20 || c == 0x7F {
        let eol = c == u32::from(b'\n') || c == u32::from(b'\r');
        let reset = if eol {
            params.flags.contains(Iso2022Flags::RESET_AT_EOL)
        } else {
            params.flags.contains(Iso2022Flags::RESET_AT_CNTL)
        };
        if reset {
            put_reset(s, params);
        }
        s.dst.push(c as u8);
        s.state.iso.bol = c == u32::from(b'\n');
        return true;
    }
    if (0x80..0xA0).contains(&c) {
        if params.seven_bits() {
            return false;
        }
        s.dst.push(c as u8);
        return true;
    }
    if char_is_byte8(c) {
        s.dst.push(char_to_byte8(c));
        return true;
    }
    put_graphic(s, params, list, c, preferred)
}

/// Designates up front every charset the line starting at `from` needs.
fn designate_line(s: &mut Session<'_>, params: &Iso2022Params, list: &[CharsetId], from: usize) {
    let charsets = s.charsets;
    let mut st = s.state.iso;
    let mut done = [false; 4];
    for item in &s.charbuf.items()[from..] {
        let WorkItem::Char(c) = *item else {
            continue;
        };
        if c == u32::from(b'\n') {
            break;
        }
        let Some((charset, _)) = char_charset(charsets, list, c) else {
            continue;
        };
        let reg = register_for(charsets, params, &st, charset);
        if done[usize::from(reg)] {
            continue;
        }
        done[usize::from(reg)] = true;
        if st.designation[usize::from(reg)] != Some(charset) {
            put_designation(charsets, params.flags, charset, reg, &mut s.dst);
            st.designation[usize::from(reg)] = Some(charset);
        }
    }
    s.state.iso = st;
}

pub(crate) fn encode(s: &mut Session<'_>, params: &Iso2022Params) {
    let coding = Arc::clone(&s.coding);
    let list = &coding.charsets;
    initialize(&mut s.state.iso, params);
    let compose = params.flags.contains(Iso2022Flags::COMPOSITION);
    let designate_at_bol = params.flags.contains(Iso2022Flags::DESIGNATE_AT_BOL);
    let mut preferred: Option<(CharsetId, usize)> = None;
    let mut composing: Option<usize> = None;
    let mut i = s.charbuf.read_pos;

    while i < s.charbuf.len() {
        let cp = s.checkpoint();
        let item = s.charbuf.items()[i];
        match item {
            WorkItem::Char(c) => {
                if designate_at_bol && s.state.iso.bol && c != u32::from(b'\n') {
                    designate_line(s, params, list, i);
                }
                let prefer = preferred.map(|(id, _)| id);
                s.encode_or_substitute(c, |s, c| put_char(s, params, list, c, prefer));
                if let Some((id, left)) = preferred {
                    preferred = (left > 1).then_some((id, left - 1));
                }
                if let Some(left) = composing {
                    if left <= 1 {
                        s.dst.extend(&[ESC, b'1']);
                        composing = None;
                    } else {
                        composing = Some(left - 1);
                    }
                }
            }
            WorkItem::Rule(rule) => {
                if composing.is_some() {
                    s.dst.push(0x20 + rule.pack());
                }
            }
            WorkItem::Composition { method, nchars, .. } => {
                if compose && nchars > 0 {
                    let opener = match method {
                        CompositionMethod::Relative => b'0',
                        CompositionMethod::WithAltChars => b'2',
                        CompositionMethod::WithRule => b'3',
                        CompositionMethod::WithRuleAltChars => b'4',
                    };
                    s.dst.extend(&[ESC, opener]);
                    composing = Some(nchars);
                }
            }
            WorkItem::CharsetSpan { charset, nchars } => {
                preferred = (nchars > 0).then_some((charset, nchars));
            }
        }
        if s.rollback_if_overflowed(cp) {
            break;
        }
        i += 1;
    }
    s.charbuf.read_pos = i;
}

/// Returns to the initial state at the end of the text.
pub(crate) fn finish(s: &mut Session<'_>, params: &Iso2022Params) {
    if !s.state.iso.initialized {
        return;
    }
    let cp = s.checkpoint();
    put_reset(s, params);
    s.rollback_if_overflowed(cp);
}

/// What a piece of evidence means for one candidate coding system.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Find,
    Reject,
    Neutral,
}

/// An ISO-2022 coding system competing for a detection category.
struct Candidate<'c> {
    mask: CategoryMask,
    params: &'c Iso2022Params,
    list: &'c [CharsetId],
}

fn judge(info: &mut DetectionInfo, candidates: &[Candidate<'_>], f: impl Fn(&Candidate<'_>) -> Verdict) {
    for candidate in candidates {
        match f(candidate) {
            Verdict::Find => info.find(candidate.mask),
            Verdict::Reject => info.reject(candidate.mask),
            Verdict::Neutral => {}
        }
    }
}

/// Classifier for the ISO-2022 categories.
///
/// `codings` are the coding systems currently assigned to categories; each
/// ISO category is judged against its own coding system's flags, charsets
/// and initial designations. Categories without one are rejected.
pub(crate) fn detect(
    src: &[u8],
    info: &mut DetectionInfo,
    charsets: &dyn CharsetRegistry,
    codings: &[(CodingCategory, Arc<CodingSystem>)],
) {
    info.check(CategoryMask::ISO);
    let candidates: Vec<Candidate<'_>> = codings
        .iter()
        .filter(|(category, _)| CategoryMask::ISO.has(*category))
        .filter_map(|(category, coding)| match &coding.kind {
            CodecKind::Iso2022(params) => Some(Candidate {
                mask: category.mask(),
                params,
                list: &coding.charsets,
            }),
            _ => None,
        })
        .collect();
    let mut unassigned = CategoryMask::ISO;
    for candidate in &candidates {
        unassigned.remove(candidate.mask);
    }
    info.reject(unassigned);

    let flag = |c: &Candidate<'_>, f: Iso2022Flags| c.params.flags.contains(f);
    let mut pos = 0;
    while pos < src.len() {
        let b = src[pos];
        match b {
            ESC => match parse_escape(&src[pos..]) {
                Parsed::Incomplete => break,
                Parsed::Invalid => {
                    info.reject(CategoryMask::ISO);
                    return;
                }
                Parsed::Escape(esc, len) => {
                    match esc {
                        Escape::Designate {
                            reg,
                            dimension,
                            chars,
                            final_char,
                        } => {
                            let Some(id) = charsets.find_iso(dimension, chars, final_char) else {
                                info.reject(CategoryMask::ISO);
                                return;
                            };
                            judge(info, &candidates, |c| {
                                let initial = c.params.initial[usize::from(reg)] == Some(id);
                                if !flag(c, Iso2022Flags::DESIGNATION) && !initial {
                                    Verdict::Reject
                                } else if !allowed(c.list, id) {
                                    Verdict::Reject
                                } else if reg != 0
                                    && c.params.seven_bits()
                                    && !flag(c, Iso2022Flags::LOCKING_SHIFT)
                                {
                                    Verdict::Reject
                                } else {
                                    Verdict::Find
                                }
                            });
                        }
                        Escape::LockingShift { right, .. } => judge(info, &candidates, |c| {
                            if !flag(c, Iso2022Flags::LOCKING_SHIFT) || (right && c.params.seven_bits()) {
                                Verdict::Reject
                            } else {
                                Verdict::Find
                            }
                        }),
                        Escape::SingleShift(_) => judge(info, &candidates, |c| {
                            if flag(c, Iso2022Flags::SINGLE_SHIFT) && c.params.seven_bits() {
                                Verdict::Find
                            } else {
                                Verdict::Reject
                            }
                        }),
                        Escape::CompositionStart(_) | Escape::CompositionEnd => {
                            judge(info, &candidates, |c| {
                                if flag(c, Iso2022Flags::COMPOSITION) {
                                    Verdict::Neutral
                                } else {
                                    Verdict::Reject
                                }
                            })
                        }
                        Escape::ExtendedSegment { length } => pos += length,
                        Escape::Revision
                        | Escape::Direction(_)
                        | Escape::Utf8Start
                        | Escape::Utf8End => {}
                    }
                    pos += len;
                }
            },
            SO | SI => {
                judge(info, &candidates, |c| {
                    if flag(c, Iso2022Flags::LOCKING_SHIFT) {
                        if b == SO {
                            Verdict::Find
                        } else {
                            Verdict::Neutral
                        }
                    } else {
                        Verdict::Reject
                    }
                });
                pos += 1;
            }
            SS2 | SS3 => {
                let reg = if b == SS2 { 2 } else { 3 };
                judge(info, &candidates, |c| {
                    if flag(c, Iso2022Flags::SINGLE_SHIFT) && !c.params.seven_bits() {
                        Verdict::Find
                    } else {
                        Verdict::Reject
                    }
                });
                let skip = candidates
                    .iter()
                    .find_map(|c| {
                        flag(c, Iso2022Flags::SINGLE_SHIFT)
                            .then_some(c.params.initial[reg])
                            .flatten()
                    })
                    .map_or(1, |id| usize::from(charsets.dimension(id)));
                pos += 1;
                let mut skipped = 0;
                while skipped < skip && pos < src.len() && src[pos] >= 0xA0 {
                    pos += 1;
                    skipped += 1;
                }
            }
            0x80..=0x9F => {
                info.reject(CategoryMask::ISO);
                return;
            }
            0xA0..=0xFF => {
                let run = src[pos..].iter().take_while(|&&b| b >= 0xA0).count();
                let at_end = pos + run == src.len();
                judge(info, &candidates, |c| {
                    if c.params.seven_bits() {
                        return Verdict::Reject;
                    }
                    let gr = c.params.initial[1];
                    match gr {
                        None => Verdict::Reject,
                        Some(id) => {
                            let dim = usize::from(charsets.dimension(id)).max(1);
                            if run % dim != 0 && !at_end {
                                Verdict::Reject
                            } else {
                                Verdict::Find
                            }
                        }
                    }
                });
                pos += run;
            }
            _ => pos += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::PRIVATE_CHARSET_BASE;
    use crate::{Registry, api};

    const HIRAGANA_A: u32 = PRIVATE_CHARSET_BASE + (0x24 - 0x21) * 94 + (0x22 - 0x21);

    #[test]
    fn test_parse_escape() {
        assert_eq!(
            parse_escape(b"\x1b$B"),
            Parsed::Escape(
                Escape::Designate {
                    reg: 0,
                    dimension: 2,
                    chars: 94,
                    final_char: b'B'
                },
                3
            )
        );
        assert_eq!(
            parse_escape(b"\x1b$)C"),
            Parsed::Escape(
                Escape::Designate {
                    reg: 1,
                    dimension: 2,
                    chars: 94,
                    final_char: b'C'
                },
                4
            )
        );
        assert_eq!(
            parse_escape(b"\x1b-A"),
            Parsed::Escape(
                Escape::Designate {
                    reg: 1,
                    dimension: 1,
                    chars: 96,
                    final_char: b'A'
                },
                3
            )
        );
        assert_eq!(parse_escape(b"\x1b$"), Parsed::Incomplete);
        assert_eq!(parse_escape(b"\x1bx"), Parsed::Invalid);
        assert_eq!(
            parse_escape(b"\x1b%/1\x80\x83"),
            Parsed::Escape(Escape::ExtendedSegment { length: 3 }, 6)
        );
    }

    #[test]
    fn test_iso_2022_jp_round_trip() {
        let registry = Registry::new();
        let bytes = b"\x1b$B$\"\x1b(BA";
        let decoded = api::decode(&registry, "iso-2022-jp-unix", bytes).unwrap();
        assert_eq!(decoded.text.chars, vec![HIRAGANA_A, 0x41]);
        let encoded = api::encode(&registry, "iso-2022-jp-unix", &decoded.text.chars).unwrap();
        assert_eq!(encoded.bytes, bytes);
    }

    #[test]
    fn test_reset_before_newline_and_at_end() {
        let registry = Registry::new();
        let encoded = api::encode(&registry, "iso-2022-jp-unix", &[HIRAGANA_A, 0x0A, HIRAGANA_A])
            .unwrap();
        assert_eq!(encoded.bytes, b"\x1b$B$\"\x1b(B\n\x1b$B$\"\x1b(B");
    }

    #[test]
    fn test_seven_bit_latin() {
        let registry = Registry::new();
        let encoded = api::encode(&registry, "iso-2022-7bit-unix", &[0x41, 0xE9]).unwrap();
        assert_eq!(encoded.bytes, b"A\x1b,Ai\x1b(B");
        let decoded = api::decode(&registry, "iso-2022-7bit-unix", &encoded.bytes).unwrap();
        assert_eq!(decoded.text.chars, vec![0x41, 0xE9]);
    }

    #[test]
    fn test_euc_jp() {
        let registry = Registry::new();
        let bytes = [0x41, 0xA4, 0xA2, SS2, 0xB1];
        let decoded = api::decode(&registry, "euc-jp-unix", &bytes).unwrap();
        assert_eq!(decoded.text.chars, vec![0x41, HIRAGANA_A, 0xFF71]);
        let encoded = api::encode(&registry, "euc-jp-unix", &decoded.text.chars).unwrap();
        assert_eq!(encoded.bytes, bytes);
    }

    #[test]
    fn test_latin_1_uses_gr() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "iso-latin-1-unix", &[0x63, 0x61, 0x66, 0xE9]).unwrap();
        assert_eq!(decoded.text.chars, vec![0x63, 0x61, 0x66, 0xE9]);
        let encoded = api::encode(&registry, "iso-latin-1-unix", &[0xE9, HIRAGANA_A]).unwrap();
        assert_eq!(encoded.bytes, vec![0xE9, b'?']);
    }

    #[test]
    fn test_invalid_escape_recovers() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "iso-2022-7bit-unix", b"\x1bxA").unwrap();
        assert_eq!(decoded.text.chars, vec![0x1B, 0x78, 0x41]);
        assert_eq!(decoded.report.invalid, 1);
        assert_eq!(decoded.report.result, CodingResult::InvalidSource);
    }

    #[test]
    fn test_invalid_gl_byte_resets_to_ascii() {
        let registry = Registry::new();
        let decoded = api::decode(&registry, "iso-2022-jp-unix", b"\x1b$B$\xA2$\"").unwrap();
        assert_eq!(
            decoded.text.chars,
            vec![0x24, crate::multibyte::byte8_to_char(0xA2), 0x24, 0x22]
        );
        assert_eq!(decoded.report.invalid, 2);
    }

    #[test]
    fn test_split_escape_waits_for_more_input() {
        let registry = Registry::new();
        let mut decoder = registry.decoder("iso-2022-jp-unix").unwrap();
        let first = decoder.feed(b"\x1b$", false);
        assert!(first.chars.is_empty());
        let second = decoder.feed(b"B$\"\x1b(B", true);
        assert_eq!(second.chars, vec![HIRAGANA_A]);
    }

    #[test]
    fn test_composition_round_trip() {
        let registry = Registry::new();
        let bytes = b"\x1b0ab\x1b1c";
        let decoded = api::decode(&registry, "iso-2022-7bit-unix", bytes).unwrap();
        assert_eq!(decoded.text.chars, vec![0x61, 0x62, 0x63]);
        assert_eq!(decoded.text.annotations.len(), 1);
        let encoded =
            api::encode_text(&registry, "iso-2022-7bit-unix", &decoded.text, Default::default())
                .unwrap();
        assert_eq!(encoded.bytes, bytes);
    }

    #[test]
    fn test_compound_text_segments() {
        let registry = Registry::new();
        let bytes = b"\x1b%/1\x80\x83a\xffb\x1b%G\xc3\xa9\x1b%@";
        let decoded = api::decode(&registry, "compound-text-unix", bytes).unwrap();
        assert_eq!(decoded.report.invalid, 0);
        assert_eq!(decoded.text.chars.last(), Some(&0xE9));
        assert_eq!(decoded.text.chars.len(), 10);
    }

    #[test]
    fn test_detect_judges_each_category() {
        let registry = Registry::new();
        let codings = registry.category_codings();
        let mut info = DetectionInfo::default();
        detect(b"\x1b$B$\"\x1b(B", &mut info, registry.charsets(), &codings);
        assert!(info.found.has(CodingCategory::Iso7Tight));
        assert!(info.found.has(CodingCategory::Iso7));
        assert!(info.rejected.has(CodingCategory::Iso8_1));

        let mut info = DetectionInfo::default();
        detect(&[0xA4, 0xA2, 0xA4], &mut info, registry.charsets(), &codings);
        assert!(info.rejected.has(CodingCategory::Iso7));
        assert!(info.found.has(CodingCategory::Iso8_1));

        let mut info = DetectionInfo::default();
        detect(&[0xA4, 0xA2, 0xA4, 0x41], &mut info, registry.charsets(), &codings);
        assert!(info.rejected.has(CodingCategory::Iso8_2));
    }
}
