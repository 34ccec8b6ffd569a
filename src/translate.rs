//! Character translation tables.
//!
//! A table maps single characters or character sequences to replacement
//! sequences. Lookups prefer the longest matching source sequence, and a
//! streaming caller can ask whether more input might still extend a match.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Serializable table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationTableSpec {
    /// Table name.
    pub name: String,
    /// `(from, to)` pairs; `from` must not be empty.
    pub entries: Vec<(Vec<u32>, Vec<u32>)>,
}

/// Outcome of a table lookup at the head of a character sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// `consumed` characters are replaced by `replacement`.
    Match {
        /// Source characters covered by the match.
        consumed: usize,
        /// Characters to emit instead.
        replacement: &'a [u32],
    },
    /// A longer entry could still match once more characters arrive.
    NeedMore,
    /// The first character has no entry.
    NoMatch,
}

/// Compiled translation table.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    name: String,
    // Keyed by first character; each list is sorted longest source first.
    entries: HashMap<u32, Vec<(Vec<u32>, Vec<u32>)>>,
    max_len: usize,
}

impl TranslationTable {
    /// Compiles a table from its definition. Empty sources are ignored.
    pub fn new(spec: &TranslationTableSpec) -> Self {
        let mut table = Self {
            name: spec.name.clone(),
            ..Self::default()
        };
        for (from, to) in &spec.entries {
            table.insert(from.clone(), to.clone());
        }
        table
    }

    /// A table of single-character mappings.
    pub fn from_pairs(name: &str, pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut table = Self {
            name: name.to_string(),
            ..Self::default()
        };
        for (from, to) in pairs {
            table.insert(vec![from], vec![to]);
        }
        table
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, from: Vec<u32>, to: Vec<u32>) {
        let Some(&first) = from.first() else {
            return;
        };
        self.max_len = self.max_len.max(from.len());
        let list = self.entries.entry(first).or_default();
        list.retain(|(existing, _)| *existing != from);
        list.push((from, to));
        list.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the longest source sequence.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Looks up the longest entry matching the head of `input`.
    ///
    /// With `complete` unset, returns [`Lookup::NeedMore`] when `input` is a
    /// proper prefix of a longer entry, since that entry would take priority.
    pub fn lookup(&self, input: &[u32], complete: bool) -> Lookup<'_> {
        let Some(first) = input.first() else {
            return Lookup::NoMatch;
        };
        let Some(list) = self.entries.get(first) else {
            return Lookup::NoMatch;
        };
        for (from, to) in list {
            if from.len() <= input.len() {
                if input.starts_with(from) {
                    return Lookup::Match {
                        consumed: from.len(),
                        replacement: to,
                    };
                }
            } else if !complete && from.starts_with(input) {
                return Lookup::NeedMore;
            }
        }
        Lookup::NoMatch
    }

    /// Translates a whole sequence.
    pub fn apply(&self, input: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(input.len());
        let mut i = 0;
        while i < input.len() {
            match self.lookup(&input[i..], true) {
                Lookup::Match {
                    consumed,
                    replacement,
                } => {
                    out.extend_from_slice(replacement);
                    i += consumed;
                }
                _ => {
                    out.push(input[i]);
                    i += 1;
                }
            }
        }
        out
    }

    /// Translates the head of `input`, pairing each output character with
    /// the index of the input character it came from.
    ///
    /// With `complete` unset, stops before a tail that a longer entry could
    /// still match; the second value is the number of input characters
    /// consumed.
    pub fn apply_indexed(&self, input: &[u32], complete: bool) -> (Vec<(u32, usize)>, usize) {
        let mut out = Vec::with_capacity(input.len());
        let mut i = 0;
        while i < input.len() {
            match self.lookup(&input[i..], complete) {
                Lookup::Match {
                    consumed,
                    replacement,
                } => {
                    out.extend(replacement.iter().map(|&r| (r, i)));
                    i += consumed;
                }
                Lookup::NeedMore => break,
                Lookup::NoMatch => {
                    out.push((input[i], i));
                    i += 1;
                }
            }
        }
        (out, i)
    }
}
