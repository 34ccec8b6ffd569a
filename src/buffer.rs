//! Destinations and the scratch work-buffer pool.
//!
//! Everything here is addressed by offset, never by a borrowed slice kept
//! across a call that may grow the storage.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use serde::Serialize;

use crate::charbuf::{CharBuf, CompositionMethod, CompositionRule};
use crate::charset::CharsetId;
use crate::multibyte;

/// Byte destination of an encoder: growable, or limited to a fixed size.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl Destination {
    /// A destination that grows on demand.
    pub fn growable() -> Self {
        Self::default()
    }

    /// A destination that never holds more than `limit` bytes.
    pub fn fixed(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit),
            limit: Some(limit),
        }
    }

    /// Makes sure `safe_room` more bytes can be written.
    ///
    /// A growable destination reserves the space and always succeeds; a
    /// fixed one reports whether the space is there.
    pub fn ensure_room(&mut self, safe_room: usize) -> bool {
        match self.limit {
            None => {
                self.bytes.reserve(safe_room);
                true
            }
            Some(limit) => limit.saturating_sub(self.bytes.len()) >= safe_room,
        }
    }

    /// Whether more bytes than the limit were written.
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.limit.is_some_and(|limit| self.bytes.len() > limit)
    }

    /// Whether the destination has a fixed size.
    pub fn is_fixed(&self) -> bool {
        self.limit.is_some()
    }

    /// Appends a byte.
    #[inline]
    pub fn push(&mut self, b: u8) {
        self.bytes.push(b);
    }

    /// Appends bytes.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drops bytes past `len`.
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// The bytes written.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Moves the written bytes out, keeping the limit.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

/// Component of a decoded composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Component {
    /// A component character.
    Char(u32),
    /// A placement rule.
    Rule(CompositionRule),
}

/// Out-of-band metadata attached to a range of decoded characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnnotationKind {
    /// The range is one composition.
    Composition {
        /// Combining method.
        method: CompositionMethod,
        /// Characters and rules, in source order.
        components: Vec<Component>,
    },
    /// The range was decoded from one charset.
    Charset(CharsetId),
}

/// An annotation over `start..end` (character offsets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    /// First character covered.
    pub start: usize,
    /// One past the last character covered.
    pub end: usize,
    /// What the range carries.
    pub kind: AnnotationKind,
}

/// Decoded characters plus their annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedText {
    /// Characters in the internal character space.
    pub chars: Vec<u32>,
    /// Annotations, ordered by start.
    pub annotations: Vec<Annotation>,
}

impl DecodedText {
    /// Number of characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Whether no characters were decoded.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The text as a `String`; non-Unicode characters become U+FFFD.
    pub fn to_string_lossy(&self) -> String {
        multibyte::chars_to_string_lossy(&self.chars)
    }

    /// The text in the internal multibyte representation.
    pub fn to_multibyte(&self) -> Vec<u8> {
        multibyte::multibyte_from_chars(&self.chars)
    }

    /// Appends `other`, shifting its annotations.
    pub fn append(&mut self, mut other: DecodedText) {
        let offset = self.chars.len();
        self.chars.append(&mut other.chars);
        self.annotations
            .extend(other.annotations.into_iter().map(|mut a| {
                a.start += offset;
                a.end += offset;
                a
            }));
    }
}

/// Reusable work buffer with an in-use flag.
///
/// [`acquire`](ScratchPool::acquire) hands out the pooled buffer when it is
/// free and a fresh temporary one when a conversion is already using it, so
/// nested conversions never share a buffer. The guard puts the pooled buffer
/// back when dropped, on every exit path.
#[derive(Debug)]
pub struct ScratchPool {
    slot: Mutex<Option<CharBuf>>,
    capacity: usize,
}

impl ScratchPool {
    /// A pool whose buffers hold `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            slot: Mutex::new(Some(CharBuf::new(capacity))),
            capacity,
        }
    }

    /// Takes the pooled buffer, or allocates a temporary one if it is busy.
    pub fn acquire(&self) -> Scratch<'_> {
        let pooled = self.slot.lock().ok().and_then(|mut slot| slot.take());
        match pooled {
            Some(mut buf) => {
                buf.clear();
                Scratch {
                    buf,
                    pool: Some(self),
                }
            }
            None => Scratch {
                buf: CharBuf::new(self.capacity),
                pool: None,
            },
        }
    }

    /// Whether the pooled buffer is currently handed out.
    pub fn in_use(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(crate::charbuf::CHARBUF_SIZE)
    }
}

/// A work buffer borrowed from a [`ScratchPool`] or owned outright.
#[derive(Debug)]
pub struct Scratch<'a> {
    buf: CharBuf,
    pool: Option<&'a ScratchPool>,
}

impl Scratch<'_> {
    /// A buffer that belongs to no pool.
    pub fn detached(capacity: usize) -> Scratch<'static> {
        Scratch {
            buf: CharBuf::new(capacity),
            pool: None,
        }
    }

    /// Whether this is the pool's shared buffer.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Deref for Scratch<'_> {
    type Target = CharBuf;

    fn deref(&self) -> &CharBuf {
        &self.buf
    }
}

impl DerefMut for Scratch<'_> {
    fn deref_mut(&mut self) -> &mut CharBuf {
        &mut self.buf
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool {
            if let Ok(mut slot) = pool.slot.lock() {
                *slot = Some(std::mem::take(&mut self.buf));
            }
        }
    }
}
