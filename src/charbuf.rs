//! The work buffer shared by decoders, encoders and the orchestrator.
//!
//! Decoders append [`WorkItem`]s; annotation headers precede the characters
//! they describe and are patched once the run length is known. Encoders read
//! the same items back. The buffer reserves [`CHARBUF_SLACK`] items so that a
//! single decode step, annotations included, never overruns it.

use serde::{Deserialize, Serialize};

use crate::charset::CharsetId;

/// Default number of items per work buffer.
pub const CHARBUF_SIZE: usize = 0x1000;

/// Items reserved past the fill limit for one step's worth of output.
pub const CHARBUF_SLACK: usize = 64;

/// Most components a single composition may carry.
pub const MAX_COMPOSITION_COMPONENTS: usize = 16;

/// How the components of a composition are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositionMethod {
    /// Components are stacked relative to each other.
    Relative,
    /// Components are placed by explicit rules.
    WithRule,
    /// Alternate characters are shown for the span.
    WithAltChars,
    /// Alternate characters placed by rules.
    WithRuleAltChars,
}

impl CompositionMethod {
    /// Method number used by the wire formats.
    pub fn code(self) -> u8 {
        match self {
            CompositionMethod::Relative => 0,
            CompositionMethod::WithRule => 1,
            CompositionMethod::WithAltChars => 2,
            CompositionMethod::WithRuleAltChars => 3,
        }
    }

    /// Method for a wire method number.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => CompositionMethod::Relative,
            1 => CompositionMethod::WithRule,
            2 => CompositionMethod::WithAltChars,
            3 => CompositionMethod::WithRuleAltChars,
            _ => return None,
        })
    }

    /// Whether components alternate with placement rules.
    pub fn has_rules(self) -> bool {
        matches!(
            self,
            CompositionMethod::WithRule | CompositionMethod::WithRuleAltChars
        )
    }
}

/// Placement rule between two composition components: the reference point
/// of the previous glyph and of the next glyph, each `0..9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositionRule {
    /// Reference point on the previous component.
    pub gref: u8,
    /// Reference point on the next component.
    pub nref: u8,
}

impl CompositionRule {
    /// Rule packed as `gref * 9 + nref`.
    pub fn pack(self) -> u8 {
        self.gref * 9 + self.nref
    }

    /// Unpacks `gref * 9 + nref`.
    pub fn unpack(code: u8) -> Option<Self> {
        (code < 81).then_some(Self {
            gref: code / 9,
            nref: code % 9,
        })
    }
}

/// One element of the work buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// A character.
    Char(u32),
    /// Starts a composition over the next `nchars` characters; rules for
    /// rule-based methods are interleaved as [`WorkItem::Rule`].
    Composition {
        /// Combining method.
        method: CompositionMethod,
        /// Characters covered.
        nchars: usize,
        /// Source bytes the composition occupied.
        nbytes: usize,
    },
    /// Placement rule inside a composition.
    Rule(CompositionRule),
    /// The next `nchars` characters came from `charset`.
    CharsetSpan {
        /// Source charset.
        charset: CharsetId,
        /// Characters covered.
        nchars: usize,
    },
}

/// Bounded buffer of [`WorkItem`]s.
#[derive(Debug, Clone)]
pub struct CharBuf {
    items: Vec<WorkItem>,
    capacity: usize,
    open_span: Option<usize>,
    // Source character index of each item, filled on the encode path.
    origins: Vec<usize>,
    pub(crate) read_pos: usize,
}

impl CharBuf {
    /// A buffer holding up to `capacity` items, slack included.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(CHARBUF_SLACK * 2);
        Self {
            items: Vec::new(),
            capacity,
            open_span: None,
            origins: Vec::new(),
            read_pos: 0,
        }
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the fill limit (`capacity - slack`) is reached.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity - CHARBUF_SLACK
    }

    /// Items that still fit, slack included.
    #[inline]
    pub fn room(&self) -> usize {
        self.capacity - self.items.len().min(self.capacity)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The items.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.items.clear();
        self.origins.clear();
        self.open_span = None;
        self.read_pos = 0;
    }

    /// Appends a character, extending the open charset span if any.
    #[inline]
    pub fn push_char(&mut self, c: u32) {
        self.items.push(WorkItem::Char(c));
        if let Some(start) = self.open_span {
            if let Some(WorkItem::CharsetSpan { nchars, .. }) = self.items.get_mut(start) {
                *nchars += 1;
            }
        }
    }

    /// Appends a character that is not part of any charset span.
    #[inline]
    pub fn push_plain_char(&mut self, c: u32) {
        self.close_span();
        self.items.push(WorkItem::Char(c));
    }

    /// Appends a character from `charset`, opening a new span when
    /// `annotate` is set and the charset differs from the open span's.
    pub fn push_charset_char(&mut self, charset: CharsetId, c: u32, annotate: bool) {
        if annotate {
            let same = self.open_span.is_some_and(|start| {
                matches!(self.items.get(start),
                    Some(WorkItem::CharsetSpan { charset: open, .. }) if *open == charset)
            });
            if !same {
                self.close_span();
                self.open_span = Some(self.items.len());
                self.items.push(WorkItem::CharsetSpan { charset, nchars: 0 });
            }
            self.push_char(c);
        } else {
            self.push_plain_char(c);
        }
    }

    /// Closes the open charset span, dropping it if it stayed empty.
    pub fn close_span(&mut self) {
        if let Some(start) = self.open_span.take() {
            if start + 1 == self.items.len() {
                self.items.pop();
            }
        }
    }

    /// Appends a complete composition: header, then components.
    pub fn push_composition(
        &mut self,
        method: CompositionMethod,
        nbytes: usize,
        components: &[WorkItem],
    ) {
        self.close_span();
        let nchars = components
            .iter()
            .filter(|item| matches!(item, WorkItem::Char(_)))
            .count();
        self.items.push(WorkItem::Composition {
            method,
            nchars,
            nbytes,
        });
        self.items.extend_from_slice(components);
    }

    /// Appends an item recording the source character it came from.
    pub(crate) fn push_with_origin(&mut self, item: WorkItem, origin: usize) {
        self.items.push(item);
        self.origins.push(origin);
    }

    /// Source character index of item `index`, or `None` past the end.
    pub(crate) fn origin(&self, index: usize) -> Option<usize> {
        self.origins.get(index).copied()
    }

    /// Number of characters (not annotations) in the buffer.
    pub fn char_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, WorkItem::Char(_)))
            .count()
    }
}

impl Default for CharBuf {
    fn default() -> Self {
        Self::new(CHARBUF_SIZE)
    }
}
