//! Chunked decode and encode orchestration.
//!
//! A [`StreamingDecoder`] feeds successive byte chunks through the session's
//! decoder, turns the work buffer into characters and annotations, applies
//! end-of-line conversion and the decode translation table, and holds back
//! incomplete trailing sequences until the next chunk. A
//! [`StreamingEncoder`] runs the same steps in reverse order.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::buffer::{Annotation, AnnotationKind, Component, DecodedText};
use crate::charbuf::{CHARBUF_SIZE, CompositionMethod, MAX_COMPOSITION_COMPONENTS, WorkItem};
use crate::charset::CharsetId;
use crate::codec::{self, emacs_mule};
use crate::coding::{CodecKind, CodingSystem, Endian, EolType};
use crate::detection::{DetectOptions, EncodingDetector, detect_eol, eol_sample_complete};
use crate::registry::Registry;
use crate::session::{CodingResult, ConvertOptions, EolSeen, Report, Session};
use crate::translate::TranslationTable;

/// Most bytes an incomplete trailing sequence may hold back between chunks.
pub const CARRYOVER_LIMIT: usize = 64;

const CR: u32 = 0x0D;
const LF: u32 = 0x0A;

/// End-of-line conversion of decoded characters.
///
/// Under `Dos`, and while the convention is still undecided, a `CR` is held
/// until the next character shows whether it starts a `CR LF` pair. An
/// undecided convention only reaches this point when the sampled input had
/// no line end; the first terminator then decides it.
#[derive(Debug, Clone, Copy)]
struct EolDecoder {
    eol: EolType,
    held_cr: bool,
    prev_cr: bool,
    seen: EolSeen,
}

impl EolDecoder {
    fn new(eol: EolType) -> Self {
        Self {
            eol,
            held_cr: false,
            prev_cr: false,
            seen: EolSeen::default(),
        }
    }

    /// Characters held back, each of which becomes exactly one output character.
    fn pending(&self) -> usize {
        usize::from(self.held_cr)
    }

    fn push(&mut self, c: u32, out: &mut Vec<u32>) {
        if self.held_cr {
            self.held_cr = false;
            if c == LF {
                self.seen.insert(EolSeen::CRLF);
                if self.eol == EolType::AutoDetect {
                    self.eol = EolType::Dos;
                }
                out.push(LF);
                return;
            }
            self.seen.insert(EolSeen::CR);
            if self.eol == EolType::AutoDetect {
                self.eol = EolType::Mac;
            }
            out.push(if self.eol == EolType::Mac { LF } else { CR });
        } else if self.prev_cr {
            self.prev_cr = false;
            if c == LF {
                self.seen.insert(EolSeen::CRLF);
                out.push(LF);
                return;
            }
            self.seen.insert(EolSeen::CR);
        }
        match c {
            CR => match self.eol {
                EolType::Dos | EolType::AutoDetect => self.held_cr = true,
                EolType::Mac => {
                    self.prev_cr = true;
                    out.push(LF);
                }
                EolType::Unix => {
                    self.prev_cr = true;
                    out.push(CR);
                }
            },
            LF => {
                self.seen.insert(EolSeen::LF);
                if self.eol == EolType::AutoDetect {
                    self.eol = EolType::Unix;
                }
                out.push(LF);
            }
            _ => out.push(c),
        }
    }

    fn flush(&mut self, out: &mut Vec<u32>) {
        if self.held_cr {
            self.held_cr = false;
            self.seen.insert(EolSeen::CR);
            if self.eol == EolType::AutoDetect {
                self.eol = EolType::Mac;
            }
            out.push(if self.eol == EolType::Mac { LF } else { CR });
        }
        if self.prev_cr {
            self.prev_cr = false;
            self.seen.insert(EolSeen::CR);
        }
    }
}

/// Text after a translation pass, with the index of the source character
/// each output character came from.
struct Translated {
    chars: Vec<u32>,
    origins: Vec<usize>,
    annotations: Vec<Annotation>,
    /// Source characters used; the rest may still extend a match.
    consumed: usize,
}

fn translate_text(table: Option<&TranslationTable>, text: DecodedText, complete: bool) -> Translated {
    let Some(table) = table else {
        let consumed = text.chars.len();
        return Translated {
            origins: (0..consumed).collect(),
            chars: text.chars,
            annotations: text.annotations,
            consumed,
        };
    };
    let (pairs, consumed) = table.apply_indexed(&text.chars, complete);
    let first_from = |index: usize| pairs.partition_point(|&(_, origin)| origin < index);
    let annotations = text
        .annotations
        .into_iter()
        .filter(|a| a.end <= consumed)
        .filter_map(|a| {
            let (start, end) = (first_from(a.start), first_from(a.end));
            (start < end).then_some(Annotation {
                start,
                end,
                kind: a.kind,
            })
        })
        .collect();
    let (chars, origins) = pairs.into_iter().unzip();
    Translated {
        chars,
        origins,
        annotations,
        consumed,
    }
}

/// Chunked decoder.
///
/// Feed chunks in order with [`feed`](Self::feed); pass `last = true` with
/// the final chunk (possibly empty) so held-back bytes are flushed.
pub struct StreamingDecoder<'r> {
    registry: &'r Registry,
    session: Session<'r>,
    /// Detection options while the coding system is still undecided.
    detect: Option<DetectOptions>,
    /// Sample limit while only the end-of-line convention is undecided.
    eol_sample_limit: Option<usize>,
    sample: Vec<u8>,
    eol: EolDecoder,
    held: Vec<u32>,
    /// Bytes drained from the session source by earlier chunks.
    drained: usize,
    produced: usize,
    interrupted: bool,
    finished: bool,
}

impl<'r> StreamingDecoder<'r> {
    /// A decoder for `coding`, using the registry's work-buffer pool.
    pub fn new(registry: &'r Registry, coding: Arc<CodingSystem>, options: ConvertOptions) -> Self {
        let detect = coding
            .is_undecided()
            .then(|| DetectOptions::for_coding(&coding));
        let eol_sample_limit = (detect.is_none() && coding.eol == EolType::AutoDetect)
            .then(|| DetectOptions::default().sample_limit);
        let eol = EolDecoder::new(coding.eol);
        let session = Session::new(
            registry.charsets(),
            coding,
            registry.scratch().acquire(),
            options,
        );
        Self {
            registry,
            session,
            detect,
            eol_sample_limit,
            sample: Vec::new(),
            eol,
            held: Vec::new(),
            drained: 0,
            produced: 0,
            interrupted: false,
            finished: false,
        }
    }

    /// The coding system in use; after detection, the detected one.
    pub fn coding(&self) -> &Arc<CodingSystem> {
        self.session.coding()
    }

    /// Whether the final chunk has been fed or a program stopped decoding.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes the next chunk.
    pub fn feed(&mut self, chunk: &[u8], last: bool) -> DecodedText {
        if self.finished {
            if !chunk.is_empty() {
                warn!(len = chunk.len(), "input after the end of decoding ignored");
            }
            return DecodedText::default();
        }
        if let Some(options) = self.detect {
            self.sample.extend_from_slice(chunk);
            if !last && self.sample.len() < options.sample_limit {
                return DecodedText::default();
            }
            self.resolve(options);
            let sample = std::mem::take(&mut self.sample);
            self.load(&sample);
        } else if let Some(limit) = self.eol_sample_limit {
            self.sample.extend_from_slice(chunk);
            let utf16 = sample_endian(self.session.coding(), &self.sample);
            if !last && self.sample.len() < limit && !eol_sample_complete(&self.sample, utf16) {
                return DecodedText::default();
            }
            self.resolve_eol(utf16);
            let sample = std::mem::take(&mut self.sample);
            self.load(&sample);
        } else {
            self.load(chunk);
        }
        self.session.last_block = last;

        let mut stage = DecodedText::default();
        self.run(&mut stage);
        if self.interrupted {
            self.finished = true;
        } else if last {
            let rest = self.session.src.len() - self.session.consumed;
            self.flush_raw(rest, &mut stage);
            self.eol.flush(&mut stage.chars);
            self.finished = true;
        } else {
            let rest = self.session.src.len() - self.session.consumed;
            if rest > CARRYOVER_LIMIT {
                warn!(
                    held = rest,
                    limit = CARRYOVER_LIMIT,
                    "carryover overflow, flushing raw bytes"
                );
                self.flush_raw(rest - CARRYOVER_LIMIT, &mut stage);
            }
        }

        let out = self.translate(stage, self.finished);
        self.produced += out.len();
        trace!(
            chunk = chunk.len(),
            chars = out.len(),
            carryover = self.session.src.len() - self.session.consumed,
            last,
            "decoded chunk"
        );
        out
    }

    /// Feeds an empty final chunk.
    pub fn finish(&mut self) -> DecodedText {
        self.feed(&[], true)
    }

    /// Summary of the conversion so far.
    pub fn report(&self) -> Report {
        let s = &self.session;
        let pending = s.src.len() > s.consumed
            || !self.sample.is_empty()
            || self.eol.pending() > 0
            || !self.held.is_empty();
        let result = if self.interrupted {
            CodingResult::Interrupted
        } else if !self.finished && pending {
            CodingResult::InsufficientSource
        } else if s.invalid > 0 {
            CodingResult::InvalidSource
        } else {
            CodingResult::Success
        };
        let coding = self.registry.eol_variant(s.coding(), self.eol.eol);
        Report {
            result,
            coding: coding.name.clone(),
            consumed: self.drained + s.consumed,
            produced: self.produced,
            invalid: s.invalid,
            eol_seen: self.eol.seen,
        }
    }

    /// Replaces the undecided placeholder by the detected coding system,
    /// keeping a fixed end-of-line convention of the placeholder.
    fn resolve(&mut self, options: DetectOptions) {
        self.detect = None;
        let requested = Arc::clone(self.session.coding());
        let detected = match EncodingDetector::with_options(self.registry, options).detect(&self.sample) {
            Ok(result) => result.coding,
            Err(err) => {
                warn!(%err, "detection failed, decoding as raw bytes");
                return;
            }
        };
        let coding = if requested.eol == EolType::AutoDetect {
            detected
        } else {
            let base = detected
                .base
                .as_deref()
                .and_then(|name| self.registry.lookup(name))
                .unwrap_or(detected);
            self.registry.eol_variant(&base, requested.eol)
        };
        debug!(from = %requested.name, to = %coding.name, "resolved undecided coding system");
        self.eol = EolDecoder::new(coding.eol);
        self.session.set_coding(coding);
    }

    /// Decides the end-of-line convention from the buffered sample.
    fn resolve_eol(&mut self, utf16: Option<Endian>) {
        self.eol_sample_limit = None;
        let eol = detect_eol(&self.sample, utf16);
        debug!(coding = %self.session.coding().name, ?eol, "sampled end-of-line convention");
        self.eol = EolDecoder::new(eol);
    }

    fn load(&mut self, bytes: &[u8]) {
        let s = &mut self.session;
        s.src.drain(..s.consumed);
        self.drained += s.consumed;
        s.consumed = 0;
        s.src.extend_from_slice(bytes);
    }

    fn run(&mut self, stage: &mut DecodedText) {
        loop {
            let s = &mut self.session;
            s.charbuf.clear();
            s.result = CodingResult::Success;
            let before = s.consumed;
            codec::decode(s);
            let progressed = s.consumed > before || !s.charbuf.is_empty();
            self.produce(stage);
            match self.session.result {
                CodingResult::Interrupted => {
                    self.interrupted = true;
                    break;
                }
                CodingResult::InsufficientSource => break,
                _ => {}
            }
            if self.session.consumed >= self.session.src.len() || !progressed {
                break;
            }
        }
    }

    /// Emits the next `count` unconsumed bytes as raw-byte characters.
    fn flush_raw(&mut self, count: usize, stage: &mut DecodedText) {
        if count == 0 {
            return;
        }
        let start = self.session.consumed;
        let bytes = self.session.src[start..start + count].to_vec();
        for piece in bytes.chunks(CHARBUF_SIZE / 2) {
            self.session.charbuf.clear();
            for &b in piece {
                self.session.emit_raw(b);
            }
            self.produce(stage);
        }
        self.session.consumed += count;
    }

    /// Moves the work buffer into `stage`.
    fn produce(&mut self, stage: &mut DecodedText) {
        let Self { session, eol, .. } = self;
        let items = session.charbuf.items();
        let mut span: Option<(usize, usize, CharsetId)> = None;
        let mut i = 0;
        while i < items.len() {
            match items[i] {
                WorkItem::Char(c) => {
                    eol.push(c, &mut stage.chars);
                    if let Some((start, remaining, charset)) = span {
                        if remaining <= 1 {
                            stage.annotations.push(Annotation {
                                start,
                                end: stage.chars.len() + eol.pending(),
                                kind: AnnotationKind::Charset(charset),
                            });
                            span = None;
                        } else {
                            span = Some((start, remaining - 1, charset));
                        }
                    }
                }
                WorkItem::CharsetSpan { charset, nchars } => {
                    if nchars > 0 {
                        span = Some((stage.chars.len() + eol.pending(), nchars, charset));
                    }
                }
                WorkItem::Composition { method, nchars, .. } => {
                    let end = emacs_mule::composition_end(items, i + 1, nchars);
                    let start = stage.chars.len() + eol.pending();
                    let mut components = Vec::with_capacity(end - i - 1);
                    for item in &items[i + 1..end] {
                        match *item {
                            WorkItem::Char(c) => {
                                eol.push(c, &mut stage.chars);
                                components.push(Component::Char(c));
                            }
                            WorkItem::Rule(rule) => components.push(Component::Rule(rule)),
                            _ => {}
                        }
                    }
                    stage.annotations.push(Annotation {
                        start,
                        end: stage.chars.len() + eol.pending(),
                        kind: AnnotationKind::Composition { method, components },
                    });
                    i = end;
                    continue;
                }
                WorkItem::Rule(_) => {}
            }
            i += 1;
        }
        if let Some((start, _, charset)) = span {
            stage.annotations.push(Annotation {
                start,
                end: stage.chars.len() + eol.pending(),
                kind: AnnotationKind::Charset(charset),
            });
        }
    }

    fn translate(&mut self, stage: DecodedText, complete: bool) -> DecodedText {
        let Some(table) = self.session.coding().decode_table.clone() else {
            return stage;
        };
        let mut text = DecodedText {
            chars: std::mem::take(&mut self.held),
            annotations: Vec::new(),
        };
        text.append(stage);
        let translated = translate_text(Some(&table), text.clone(), complete);
        self.held = text.chars[translated.consumed..].to_vec();
        DecodedText {
            chars: translated.chars,
            annotations: translated.annotations,
        }
    }
}

/// Byte order of a UTF-16 sample: its BOM if any, else the coding's default.
fn sample_endian(coding: &CodingSystem, sample: &[u8]) -> Option<Endian> {
    let CodecKind::Utf16 { endian, .. } = coding.kind else {
        return None;
    };
    Some(match sample {
        [0xFF, 0xFE, ..] => Endian::Little,
        [0xFE, 0xFF, ..] => Endian::Big,
        _ => endian,
    })
}

impl std::fmt::Debug for StreamingDecoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDecoder")
            .field("session", &self.session)
            .field("detecting", &self.detect.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

/// Chunked encoder.
///
/// Feed characters in order with [`feed`](Self::feed) or
/// [`feed_text`](Self::feed_text); the final call must pass `last = true`
/// so shift states are reset.
pub struct StreamingEncoder<'r> {
    session: Session<'r>,
    eol: EolType,
    held: Vec<u32>,
    /// Characters handed in so far, held ones included.
    fed: usize,
    consumed: usize,
    produced: usize,
    stopped: bool,
    finished: bool,
}

impl<'r> StreamingEncoder<'r> {
    /// An encoder for `coding`, using the registry's work-buffer pool.
    pub fn new(registry: &'r Registry, coding: Arc<CodingSystem>, options: ConvertOptions) -> Self {
        let eol = match coding.eol {
            EolType::AutoDetect => EolType::Unix,
            eol => eol,
        };
        let session = Session::new(
            registry.charsets(),
            coding,
            registry.scratch().acquire(),
            options,
        );
        Self {
            session,
            eol,
            held: Vec::new(),
            fed: 0,
            consumed: 0,
            produced: 0,
            stopped: false,
            finished: false,
        }
    }

    /// The coding system in use.
    pub fn coding(&self) -> &Arc<CodingSystem> {
        self.session.coding()
    }

    /// Encodes plain characters.
    pub fn feed(&mut self, chars: &[u32], last: bool) -> Vec<u8> {
        let text = DecodedText {
            chars: chars.to_vec(),
            annotations: Vec::new(),
        };
        self.feed_text(&text, last)
    }

    /// Encodes characters together with their composition and charset
    /// annotations.
    pub fn feed_text(&mut self, text: &DecodedText, last: bool) -> Vec<u8> {
        if self.finished || self.stopped {
            return Vec::new();
        }
        // Input index of the first character of `combined`.
        let base = self.fed - self.held.len();
        self.fed += text.len();
        let mut combined = DecodedText {
            chars: std::mem::take(&mut self.held),
            annotations: Vec::new(),
        };
        combined.append(text.clone());
        let table = self.session.coding().encode_table.clone();
        let translated = translate_text(table.as_deref(), combined.clone(), last);
        self.held = combined.chars[translated.consumed..].to_vec();

        let items = self.work_items(&translated);
        self.session.last_block = last;
        match self.run(&items, last) {
            Some(origin) => self.consumed = base + origin,
            None => self.consumed = self.fed - self.held.len(),
        }
        if last {
            self.finished = true;
        }
        let bytes = self.session.dst.take();
        self.produced += bytes.len();
        trace!(chars = text.len(), bytes = bytes.len(), last, "encoded chunk");
        bytes
    }

    /// Summary of the conversion so far.
    pub fn report(&self) -> Report {
        let s = &self.session;
        let result = if self.stopped {
            s.result
        } else if !self.finished && !self.held.is_empty() {
            CodingResult::InsufficientSource
        } else {
            CodingResult::Success
        };
        Report {
            result,
            coding: s.coding().name.clone(),
            consumed: self.consumed,
            produced: self.produced,
            invalid: s.invalid,
            eol_seen: EolSeen::default(),
        }
    }

    /// Builds work items with the source index of each, converting line
    /// feeds to the coding system's convention.
    fn work_items(&self, text: &Translated) -> Vec<(WorkItem, usize)> {
        let mut items = Vec::with_capacity(text.chars.len() + text.annotations.len());
        let mut annotations = text.annotations.iter().peekable();
        let mut i = 0;
        while i < text.chars.len() {
            let origin = text.origins[i];
            let mut composed = None;
            while let Some(a) = annotations.next_if(|a| a.start <= i) {
                if a.start < i || a.end <= a.start {
                    continue;
                }
                let end = a.end.min(text.chars.len());
                match &a.kind {
                    AnnotationKind::Charset(charset) => items.push((
                        WorkItem::CharsetSpan {
                            charset: *charset,
                            nchars: end - i,
                        },
                        origin,
                    )),
                    AnnotationKind::Composition { method, components } => {
                        if let Some(group) = composition_items(*method, components, &text.chars[i..end]) {
                            items.extend(group.into_iter().map(|item| (item, origin)));
                            composed = Some(end);
                        }
                    }
                }
            }
            if let Some(end) = composed {
                i = end;
                continue;
            }
            match (text.chars[i], self.eol) {
                (LF, EolType::Dos) => {
                    items.push((WorkItem::Char(CR), origin));
                    items.push((WorkItem::Char(LF), origin));
                }
                (LF, EolType::Mac) => items.push((WorkItem::Char(CR), origin)),
                (c, _) => items.push((WorkItem::Char(c), origin)),
            }
            i += 1;
        }
        items
    }

    /// Runs the encoder over `items` one work buffer at a time. Returns the
    /// source index where encoding stopped early, if it did.
    fn run(&mut self, items: &[(WorkItem, usize)], last: bool) -> Option<usize> {
        let mut next = 0;
        while next < items.len() {
            let s = &mut self.session;
            s.charbuf.clear();
            s.result = CodingResult::Success;
            let start = next;
            while next < items.len() && !s.charbuf.is_full() {
                let group = group_len(&items[next..]);
                for &(item, origin) in &items[next..next + group] {
                    s.charbuf.push_with_origin(item, origin);
                }
                next += group;
            }
            // A fixed destination short of the safe room still takes
            // characters up to its limit; the codec rolls back the one that
            // overflows it.
            if !s.dst.ensure_room(s.coding().safe_room()) {
                trace!(coding = %s.coding().name, "destination below safe room");
            }
            codec::encode(s);
            if matches!(
                s.result,
                CodingResult::InsufficientDestination | CodingResult::Interrupted
            ) {
                self.stopped = true;
                debug!(result = %s.result, "encoding stopped early");
                return Some(s.charbuf.origin(s.charbuf.read_pos).unwrap_or(items[next - 1].1 + 1));
            }
            if s.charbuf.read_pos < s.charbuf.len() {
                if s.charbuf.read_pos == 0 {
                    warn!(coding = %s.coding().name, "encoder made no progress");
                    break;
                }
                next = start + s.charbuf.read_pos;
            }
        }
        if last {
            codec::finish(&mut self.session);
            if self.session.result == CodingResult::InsufficientDestination {
                self.stopped = true;
            }
        }
        None
    }
}

impl std::fmt::Debug for StreamingEncoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingEncoder")
            .field("session", &self.session)
            .field("eol", &self.eol)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Items of one composition, or `None` when the annotation does not
/// describe the characters it covers.
fn composition_items(
    method: CompositionMethod,
    components: &[Component],
    chars: &[u32],
) -> Option<Vec<WorkItem>> {
    let nchars = components
        .iter()
        .filter(|c| matches!(c, Component::Char(_)))
        .count();
    if nchars == 0 || nchars != chars.len() || nchars > MAX_COMPOSITION_COMPONENTS {
        return None;
    }
    let mut items = Vec::with_capacity(components.len() + 1);
    items.push(WorkItem::Composition {
        method,
        nchars,
        nbytes: 0,
    });
    let mut k = 0;
    for component in components {
        match *component {
            Component::Char(_) => {
                items.push(WorkItem::Char(chars[k]));
                k += 1;
            }
            Component::Rule(rule) if method.has_rules() => items.push(WorkItem::Rule(rule)),
            Component::Rule(_) => {}
        }
    }
    Some(items)
}

/// Length of the item group starting at `items[0]`; a composition and its
/// components always go into the same work buffer.
fn group_len(items: &[(WorkItem, usize)]) -> usize {
    let Some(&(WorkItem::Composition { nchars, .. }, _)) = items.first() else {
        return 1;
    };
    let mut seen = 0;
    let mut len = 1;
    while len < items.len() && seen < nchars {
        match items[len].0 {
            WorkItem::Char(_) => seen += 1,
            WorkItem::Rule(_) => {}
            _ => break,
        }
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::CharsetRegistry;
    use crate::multibyte::{byte8_to_char, chars_of};

    fn decode_chunks(registry: &Registry, name: &str, chunks: &[&[u8]]) -> (DecodedText, Report) {
        let mut decoder = registry.decoder(name).unwrap();
        let mut text = DecodedText::default();
        for (i, chunk) in chunks.iter().enumerate() {
            text.append(decoder.feed(chunk, i + 1 == chunks.len()));
        }
        (text, decoder.report())
    }

    #[test]
    fn test_dos_eol_across_chunks() {
        let registry = Registry::new();
        let (text, report) = decode_chunks(&registry, "utf-8-dos", &[b"a\r", b"\nb\r", b"c"]);
        assert_eq!(text.chars, chars_of("a\nb\rc"));
        assert!(report.eol_seen.has(EolSeen::CRLF));
        assert!(report.eol_seen.has(EolSeen::CR));
        assert_eq!(report.result, CodingResult::Success);
        assert_eq!(report.consumed, 6);
    }

    #[test]
    fn test_auto_eol_sampled_before_decoding() {
        let registry = Registry::new();
        let mut decoder = registry.decoder("utf-8").unwrap();
        assert!(decoder.feed(b"a\r\nb\r\n", false).is_empty());
        assert_eq!(decoder.report().result, CodingResult::InsufficientSource);
        assert_eq!(decoder.feed(b"c\r\nd", false).chars, chars_of("a\nb\nc\nd"));
        assert!(decoder.finish().is_empty());
        assert_eq!(decoder.report().coding, "utf-8-dos");

        let (text, report) = decode_chunks(&registry, "utf-8", &[b"x\ry\r"]);
        assert_eq!(text.chars, chars_of("x\ny\n"));
        assert_eq!(report.coding, "utf-8-mac");

        let (text, report) = decode_chunks(&registry, "utf-8", &[b"x\r", b"\ny\n"]);
        assert_eq!(text.chars, chars_of("x\r\ny\n"));
        assert_eq!(report.coding, "utf-8-unix");
    }

    #[test]
    fn test_auto_eol_sampled_in_utf16() {
        let registry = Registry::new();
        let bytes = [0x61, 0, 0x0D, 0, 0x62, 0, 0x0D, 0, 0x0A, 0];
        let (text, report) = decode_chunks(&registry, "utf-16le", &[&bytes[..3], &bytes[3..]]);
        assert_eq!(text.chars, chars_of("a\rb\n"));
        assert_eq!(report.coding, "utf-16le-dos");
    }

    #[test]
    fn test_incomplete_tail_held_then_flushed() {
        let registry = Registry::new();
        let mut decoder = registry.decoder("utf-8-unix").unwrap();
        let first = decoder.feed(&[0x61, 0xE3, 0x81], false);
        assert_eq!(first.chars, vec![0x61]);
        assert_eq!(decoder.report().result, CodingResult::InsufficientSource);
        let rest = decoder.finish();
        assert_eq!(rest.chars, vec![byte8_to_char(0xE3), byte8_to_char(0x81)]);
        let report = decoder.report();
        assert_eq!(report.result, CodingResult::InvalidSource);
        assert_eq!(report.invalid, 2);
        assert_eq!(report.consumed, 3);
    }

    #[test]
    fn test_undecided_buffers_until_detection() {
        let registry = Registry::new();
        let (text, report) = decode_chunks(&registry, "undecided", &[b"caf", b"\xC3\xA9\r\n", b""]);
        assert_eq!(text.chars, chars_of("café\n"));
        assert_eq!(report.coding, "utf-8-dos");
    }

    #[test]
    fn test_undecided_keeps_fixed_eol() {
        let registry = Registry::new();
        let (text, report) = decode_chunks(&registry, "undecided-unix", &[b"caf\xC3\xA9\r\n"]);
        assert_eq!(text.chars, chars_of("café\r\n"));
        assert_eq!(report.coding, "utf-8-unix");
    }

    #[test]
    fn test_decode_translation_spans_chunks() {
        let mut registry = Registry::new();
        registry
            .load_config(
                r#"{"translation_tables": [{"name": "ligature", "entries": [[[102, 105], [64257]]]}],
                    "coding_systems": [{"name": "lig", "codec": {"type": "utf8"}, "eol": "unix",
                                        "decode_translation": "ligature",
                                        "encode_translation": "ligature"}]}"#,
            )
            .unwrap();
        let (text, _) = decode_chunks(&registry, "lig", &[b"of", b"fice"]);
        assert_eq!(text.chars, vec![0x6F, 0x66, 0xFB01, 0x63, 0x65]);
    }

    #[test]
    fn test_encode_eol_and_fixed_destination() {
        let registry = Registry::new();
        let mut encoder = registry.encoder("utf-8-dos").unwrap();
        assert_eq!(encoder.feed(&chars_of("a\nb"), true), b"a\r\nb");

        let options = ConvertOptions {
            destination_limit: Some(3),
            ..ConvertOptions::default()
        };
        let mut encoder = registry.encoder_with("utf-8-unix", options).unwrap();
        let bytes = encoder.feed(&chars_of("aé€"), true);
        assert_eq!(bytes, "aé".as_bytes());
        let report = encoder.report();
        assert_eq!(report.result, CodingResult::InsufficientDestination);
        assert_eq!(report.consumed, 2);
    }

    #[test]
    fn test_encoder_counts_substitutions() {
        let registry = Registry::new();
        let mut encoder = registry.encoder("iso-8859-1-unix").unwrap();
        assert_eq!(encoder.feed(&[0x41, 0x3042], true), b"A?");
        let report = encoder.report();
        assert_eq!(report.result, CodingResult::Success);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.consumed, 2);
    }

    #[test]
    fn test_charset_annotations() {
        let registry = Registry::new();
        let options = ConvertOptions {
            annotate_charsets: true,
            ..ConvertOptions::default()
        };
        let mut decoder = registry.decoder_with("euc-jp-unix", options).unwrap();
        let text = decoder.feed(&[0x41, 0xA4, 0xA2, 0xA4, 0xA2], true);
        assert_eq!(text.chars.len(), 3);
        let jisx0208 = registry.charsets().lookup("japanese-jisx0208").unwrap();
        assert!(text.annotations.iter().any(|a| a.start == 1
            && a.end == 3
            && a.kind == AnnotationKind::Charset(jisx0208)));
    }
}
