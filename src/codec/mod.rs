//! Per-codec decoders, encoders and detection classifiers.
//!
//! Every decoder reads `session.src` from `session.consumed`, appends to the
//! work buffer until it is full or the source runs out, and leaves
//! `session.consumed` at the first byte it did not use. An incomplete
//! trailing sequence sets [`CodingResult::InsufficientSource`]; malformed
//! bytes are emitted as raw-byte characters and decoding carries on.
//!
//! Every encoder reads work items from `charbuf.read_pos`, writes bytes to
//! `session.dst` and advances `read_pos` past what it encoded.
//!
//! [`CodingResult::InsufficientSource`]: crate::CodingResult::InsufficientSource

use std::sync::Arc;

use crate::coding::CodecKind;
use crate::session::Session;

pub mod big5;
pub mod ccl;
pub mod charset_table;
pub mod emacs_mule;
pub mod iso2022;
pub mod raw;
pub mod sjis;
pub mod utf16;
pub mod utf8;

/// Runs the session's decoder once.
pub(crate) fn decode(s: &mut Session<'_>) {
    let coding = Arc::clone(&s.coding);
    match &coding.kind {
        CodecKind::Utf8 { bom, extended } => utf8::decode(s, *bom, *extended),
        CodecKind::Utf16 { bom, endian } => utf16::decode(s, *bom, *endian),
        CodecKind::Iso2022(params) => iso2022::decode(s, params),
        CodecKind::EmacsMule => emacs_mule::decode(s),
        CodecKind::Sjis => sjis::decode(s),
        CodecKind::Big5 => big5::decode(s),
        CodecKind::CharsetTable(table) => charset_table::decode(s, table),
        CodecKind::Ccl(params) => ccl::decode(s, params),
        CodecKind::RawText | CodecKind::Undecided { .. } => raw::decode(s),
    }
}

/// Runs the session's encoder once.
pub(crate) fn encode(s: &mut Session<'_>) {
    let coding = Arc::clone(&s.coding);
    match &coding.kind {
        CodecKind::Utf8 { bom, extended } => utf8::encode(s, *bom, *extended),
        CodecKind::Utf16 { bom, endian } => utf16::encode(s, *bom, *endian),
        CodecKind::Iso2022(params) => iso2022::encode(s, params),
        CodecKind::EmacsMule => emacs_mule::encode(s),
        CodecKind::Sjis => sjis::encode(s),
        CodecKind::Big5 => big5::encode(s),
        CodecKind::CharsetTable(table) => charset_table::encode(s, table),
        CodecKind::Ccl(params) => ccl::encode(s, params),
        CodecKind::RawText | CodecKind::Undecided { .. } => raw::encode(s),
    }
}

/// Ends an encode: codecs with shift state return to their initial state.
pub(crate) fn finish(s: &mut Session<'_>) {
    let coding = Arc::clone(&s.coding);
    if let CodecKind::Iso2022(params) = &coding.kind {
        iso2022::finish(s, params);
    }
}

/// Runs `put` on every character item from `read_pos`, stopping early when
/// a fixed destination overflows. Shared by the encoders that have no use
/// for annotations.
pub(crate) fn encode_chars(s: &mut Session<'_>, put: impl Fn(&mut Session<'_>, u32) -> bool) {
    let mut i = s.charbuf.read_pos;
    while i < s.charbuf.len() {
        if let crate::charbuf::WorkItem::Char(c) = s.charbuf.items()[i] {
            let cp = s.checkpoint();
            s.encode_or_substitute(c, &put);
            if s.rollback_if_overflowed(cp) {
                break;
            }
        }
        i += 1;
    }
    s.charbuf.read_pos = i;
}
