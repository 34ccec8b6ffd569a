//! Per-conversion working state.
//!
//! A [`Session`] is the coding context one decode or encode call runs in:
//! the source bytes and cursor, the work buffer, the destination, the
//! codec's persistent sub-state and the result of the last step. Sessions
//! are used sequentially and never shared; nested conversions get their own.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::{Destination, Scratch};
use crate::charset::{CharsetId, CharsetRegistry};
use crate::coding::{CodecKind, CodingSystem, Endian, Iso2022Flags};
use crate::multibyte::raw_byte_char;

/// Outcome of a codec step or of a whole conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodingResult {
    /// Everything was converted.
    #[default]
    Success,
    /// The source ends inside a sequence; more input is needed.
    InsufficientSource,
    /// Malformed bytes were replaced by raw-byte characters.
    InvalidSource,
    /// A fixed-size destination filled up.
    InsufficientDestination,
    /// A conversion program asked to stop.
    Interrupted,
}

impl fmt::Display for CodingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodingResult::Success => "success",
            CodingResult::InsufficientSource => "insufficient-source",
            CodingResult::InvalidSource => "invalid-source",
            CodingResult::InsufficientDestination => "insufficient-destination",
            CodingResult::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// Line terminators observed in decoded text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EolSeen(pub u8);

impl EolSeen {
    /// A bare `LF`.
    pub const LF: Self = Self(1);
    /// A `CR LF` pair.
    pub const CRLF: Self = Self(2);
    /// A bare `CR`.
    pub const CR: Self = Self(4);

    /// Records `kind`.
    #[inline]
    pub fn insert(&mut self, kind: Self) {
        self.0 |= kind.0;
    }

    /// Whether `kind` was seen.
    #[inline]
    pub fn has(self, kind: Self) -> bool {
        self.0 & kind.0 != 0
    }

    /// Whether nothing was seen.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the kinds seen.
    pub fn names(self) -> Vec<&'static str> {
        [(Self::LF, "lf"), (Self::CRLF, "crlf"), (Self::CR, "cr")]
            .into_iter()
            .filter(|(kind, _)| self.has(*kind))
            .map(|(_, name)| name)
            .collect()
    }
}

impl fmt::Debug for EolSeen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EolSeen({})", self.names().join("|"))
    }
}

/// Options of a decode or encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// The source is complete; incomplete trailing sequences are flushed
    /// as raw bytes instead of being held back.
    pub last_block: bool,
    /// Substitute `?` instead of the default character on encode.
    pub safe: bool,
    /// Record which charset each decoded run came from.
    pub annotate_charsets: bool,
    /// Stop encoding once the output would exceed this many bytes.
    pub destination_limit: Option<usize>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            last_block: true,
            safe: false,
            annotate_charsets: false,
            destination_limit: None,
        }
    }
}

/// Summary of a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Report {
    /// Overall outcome.
    pub result: CodingResult,
    /// Coding system actually used, after detection.
    pub coding: String,
    /// Source units consumed: bytes on decode, characters on encode.
    pub consumed: usize,
    /// Destination units produced: characters on decode, bytes on encode.
    pub produced: usize,
    /// Malformed sequences (decode) or substituted characters (encode).
    pub invalid: usize,
    /// Line terminators seen while decoding.
    pub eol_seen: EolSeen,
}

/// UTF codec sub-state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UtfState {
    /// The stream start (and its BOM) has been handled.
    pub bom_done: bool,
    /// Byte order settled by a BOM.
    pub endian: Option<Endian>,
}

/// ISO-2022 sub-state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Iso2022State {
    pub initialized: bool,
    /// Charset designated to G0..G3.
    pub designation: [Option<CharsetId>; 4],
    /// Register invoked into GL.
    pub gl: u8,
    /// Register invoked into GR.
    pub gr: Option<u8>,
    /// Encoder is at the start of a line.
    pub bol: bool,
    /// Current direction from `ESC [ n ]`: 0 none, 1 left-to-right, 2 right-to-left.
    pub direction: u8,
    /// Bytes left in an extended segment.
    pub ext_segment: usize,
    /// Inside an embedded UTF-8 run.
    pub utf8_embedded: bool,
}

/// State a program-driven codec keeps between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CclState {
    /// General registers.
    pub registers: [i32; 8],
    /// Instruction counter, for programs that suspend mid-way.
    pub ic: usize,
}

/// Persistent per-codec state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CodecState {
    pub utf: UtfState,
    pub iso: Iso2022State,
    pub ccl: CclState,
}

/// Restore point taken by encoders before a step that may overflow a
/// fixed-size destination.
pub(crate) struct Checkpoint {
    len: usize,
    state: CodecState,
}

/// Working state of one conversion.
pub struct Session<'a> {
    pub(crate) charsets: &'a dyn CharsetRegistry,
    pub(crate) coding: Arc<CodingSystem>,
    pub(crate) state: CodecState,
    pub(crate) options: ConvertOptions,
    /// Decode source: carryover followed by the current chunk.
    pub(crate) src: Vec<u8>,
    /// Bytes of `src` consumed by the codec.
    pub(crate) consumed: usize,
    pub(crate) charbuf: Scratch<'a>,
    pub(crate) dst: Destination,
    pub(crate) result: CodingResult,
    pub(crate) last_block: bool,
    /// Malformed sequences or substitutions so far.
    pub(crate) invalid: usize,
}

impl<'a> Session<'a> {
    /// A session converting with `coding`, using `charbuf` as work buffer.
    pub fn new(
        charsets: &'a dyn CharsetRegistry,
        coding: Arc<CodingSystem>,
        charbuf: Scratch<'a>,
        options: ConvertOptions,
    ) -> Self {
        let dst = match options.destination_limit {
            Some(limit) => Destination::fixed(limit),
            None => Destination::growable(),
        };
        Self {
            charsets,
            coding,
            state: CodecState::default(),
            options,
            src: Vec::new(),
            consumed: 0,
            charbuf,
            dst,
            result: CodingResult::Success,
            last_block: options.last_block,
            invalid: 0,
        }
    }

    /// The coding system in use.
    pub fn coding(&self) -> &Arc<CodingSystem> {
        &self.coding
    }

    /// Switches to another coding system, resetting codec state.
    pub(crate) fn set_coding(&mut self, coding: Arc<CodingSystem>) {
        self.coding = coding;
        self.state = CodecState::default();
    }

    /// Result of the last codec step.
    pub fn result(&self) -> CodingResult {
        self.result
    }

    /// Emits an undecodable byte as a raw-byte character.
    #[inline]
    pub(crate) fn emit_raw(&mut self, b: u8) {
        self.charbuf.push_plain_char(raw_byte_char(b));
        self.invalid += 1;
    }

    /// Emits bytes that are carried through verbatim, not as errors.
    pub(crate) fn emit_verbatim(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.charbuf.push_plain_char(raw_byte_char(b));
        }
    }

    /// Whether unencodable characters become `?`.
    pub(crate) fn safe(&self) -> bool {
        self.options.safe
            || matches!(&self.coding.kind,
                CodecKind::Iso2022(p) if p.flags.contains(Iso2022Flags::SAFE))
    }

    /// Replacement for a character the coding system cannot encode.
    pub(crate) fn substitute_char(&self) -> u32 {
        if self.safe() {
            u32::from(b'?')
        } else {
            self.coding.default_char
        }
    }

    /// Encodes `c` with `put`, falling back to the substitute and then to a
    /// literal `?` byte.
    pub(crate) fn encode_or_substitute(
        &mut self,
        c: u32,
        mut put: impl FnMut(&mut Self, u32) -> bool,
    ) {
        if put(self, c) {
            return;
        }
        self.invalid += 1;
        let sub = self.substitute_char();
        if sub != c && put(self, sub) {
            return;
        }
        if !put(self, u32::from(b'?')) {
            self.dst.push(b'?');
        }
    }

    /// Takes a restore point before an encode step.
    #[inline]
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.dst.len(),
            state: self.state,
        }
    }

    /// Undoes an encode step that overflowed the destination and records
    /// the shortage. Returns `true` if a rollback happened.
    pub(crate) fn rollback_if_overflowed(&mut self, cp: Checkpoint) -> bool {
        if !self.dst.overflowed() {
            return false;
        }
        self.dst.truncate(cp.len);
        self.state = cp.state;
        self.result = CodingResult::InsufficientDestination;
        true
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("coding", &self.coding.name)
            .field("consumed", &self.consumed)
            .field("src_len", &self.src.len())
            .field("charbuf_len", &self.charbuf.len())
            .field("dst_len", &self.dst.len())
            .field("result", &self.result)
            .field("invalid", &self.invalid)
            .finish()
    }
}
