//! Codecs driven by an external conversion program.
//!
//! The program itself is opaque: it is handed a slice of input units (bytes
//! on decode, characters on encode) and reports how many it consumed, what
//! it produced and whether it wants to stop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::charbuf::{CHARBUF_SLACK, WorkItem};
use crate::charset::CharsetId;
use crate::coding::{CclParams, CodingCategory};
use crate::detection::DetectionInfo;
use crate::session::{CclState, CodingResult, Session};

/// Largest slice handed to a program in one run.
const RUN_CHUNK: usize = 0x400;

/// How a program run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CclStatus {
    /// The whole input was processed.
    Success,
    /// The program needs more input to continue.
    SuspendOnSource,
    /// The output capacity was reached.
    SuspendOnDestination,
    /// The program asked to stop.
    Quit,
    /// The program hit an instruction it could not execute.
    InvalidCommand,
}

/// Outcome of one [`ByteCodeProgram::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CclRun {
    /// Input units consumed.
    pub consumed: usize,
    /// Output units; bytes on encode, characters on decode.
    pub produced: Vec<i32>,
    /// Why the run stopped.
    pub status: CclStatus,
}

/// A conversion program.
///
/// `state` persists across runs of the same conversion, so a program may
/// suspend and resume. `last` is set on the final run of a conversion.
pub trait ByteCodeProgram: fmt::Debug + Send + Sync {
    /// Runs the program over `input`, producing at most `out_capacity` units.
    fn run(
        &self,
        state: &mut CclState,
        input: &[i32],
        out_capacity: usize,
        charsets: &[CharsetId],
        last: bool,
    ) -> CclRun;
}

fn status_result(status: CclStatus) -> Option<CodingResult> {
    match status {
        CclStatus::Success | CclStatus::SuspendOnDestination => None,
        CclStatus::SuspendOnSource => Some(CodingResult::InsufficientSource),
        CclStatus::Quit | CclStatus::InvalidCommand => Some(CodingResult::Interrupted),
    }
}

pub(crate) fn decode(s: &mut Session<'_>, params: &CclParams) {
    let charsets = s.coding.charsets.clone();
    while s.consumed < s.src.len() && !s.charbuf.is_full() {
        let end = s.src.len().min(s.consumed + RUN_CHUNK);
        let input: Vec<i32> = s.src[s.consumed..end].iter().map(|&b| i32::from(b)).collect();
        let capacity = s.charbuf.room().saturating_sub(CHARBUF_SLACK).max(1);
        let last = s.last_block && end == s.src.len();
        let run = params
            .decoder
            .run(&mut s.state.ccl, &input, capacity, &charsets, last);
        for &c in &run.produced {
            if let Ok(c) = u32::try_from(c) {
                s.charbuf.push_plain_char(c);
            }
        }
        s.consumed += run.consumed.min(input.len());
        if let Some(result) = status_result(run.status) {
            s.result = result;
            break;
        }
        if run.consumed == 0 && run.produced.is_empty() {
            break;
        }
    }
}

pub(crate) fn encode(s: &mut Session<'_>, params: &CclParams) {
    let charsets = s.coding.charsets.clone();
    let chars: Vec<(usize, i32)> = s.charbuf.items()[s.charbuf.read_pos..]
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match *item {
            WorkItem::Char(c) => Some((s.charbuf.read_pos + i, c as i32)),
            _ => None,
        })
        .collect();
    let mut done = 0;
    while done < chars.len() {
        let end = chars.len().min(done + RUN_CHUNK);
        let input: Vec<i32> = chars[done..end].iter().map(|&(_, c)| c).collect();
        let capacity = if s.dst.is_fixed() {
            s.options
                .destination_limit
                .unwrap_or(0)
                .saturating_sub(s.dst.len())
        } else {
            input.len() * 4 + 16
        };
        let last = s.last_block && end == chars.len();
        let cp = s.checkpoint();
        let run = params
            .encoder
            .run(&mut s.state.ccl, &input, capacity, &charsets, last);
        for &b in &run.produced {
            s.dst.push((b & 0xFF) as u8);
        }
        if s.rollback_if_overflowed(cp) {
            break;
        }
        done += run.consumed.min(input.len());
        if let Some(result) = status_result(run.status) {
            s.result = result;
            break;
        }
        if run.status == CclStatus::SuspendOnDestination && s.dst.is_fixed() {
            s.result = CodingResult::InsufficientDestination;
            break;
        }
        if run.consumed == 0 && run.produced.is_empty() {
            break;
        }
    }
    s.charbuf.read_pos = match chars.get(done) {
        Some(&(index, _)) => index,
        None => s.charbuf.len(),
    };
}

/// Classifier for the program-driven category: every byte must be one the
/// decoder declares valid.
pub(crate) fn detect(src: &[u8], info: &mut DetectionInfo, valid_codes: &[bool; 256]) {
    let mask = CodingCategory::Ccl.mask();
    info.check(mask);
    let mut found = false;
    for &b in src {
        if !valid_codes[usize::from(b)] {
            info.reject(mask);
            return;
        }
        found |= b >= 0x80;
    }
    if found {
        info.find(mask);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::coding::{CodecSpec, CodingSystemSpec, EolType};
    use crate::{Registry, api};

    /// Byte-per-character program that swaps ASCII letter case and stops at NUL.
    #[derive(Debug)]
    struct SwapCase;

    impl ByteCodeProgram for SwapCase {
        fn run(
            &self,
            state: &mut CclState,
            input: &[i32],
            out_capacity: usize,
            _charsets: &[CharsetId],
            _last: bool,
        ) -> CclRun {
            let mut produced = Vec::new();
            for (i, &unit) in input.iter().enumerate() {
                if unit == 0 {
                    return CclRun {
                        consumed: i,
                        produced,
                        status: CclStatus::Quit,
                    };
                }
                if produced.len() == out_capacity {
                    return CclRun {
                        consumed: i,
                        produced,
                        status: CclStatus::SuspendOnDestination,
                    };
                }
                let swapped = match u8::try_from(unit) {
                    Ok(b) if b.is_ascii_alphabetic() => i32::from(b ^ 0x20),
                    _ => unit,
                };
                state.registers[0] += 1;
                produced.push(swapped);
            }
            CclRun {
                consumed: input.len(),
                produced,
                status: CclStatus::Success,
            }
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_ccl_program("swap-case", Arc::new(SwapCase));
        let spec = CodingSystemSpec::new(
            "swap-case",
            CodecSpec::Ccl {
                decoder: "swap-case".into(),
                encoder: "swap-case".into(),
                valid_codes: vec![(0x01, 0xFF)],
            },
        )
        .eol(EolType::Unix);
        registry.define_coding_system(spec).unwrap();
        registry
    }

    #[test]
    fn test_program_decodes_and_encodes() {
        let registry = registry();
        let decoded = api::decode(&registry, "swap-case", b"Hello").unwrap();
        assert_eq!(api::decode_to_string(&registry, "swap-case", b"Hello").unwrap(), "hELLO");
        let encoded = api::encode(&registry, "swap-case", &decoded.text.chars).unwrap();
        assert_eq!(encoded.bytes, b"Hello");
    }

    #[test]
    fn test_quit_interrupts() {
        let registry = registry();
        let decoded = api::decode(&registry, "swap-case", b"ab\0cd").unwrap();
        assert_eq!(decoded.report.result, CodingResult::Interrupted);
        assert_eq!(decoded.text.chars, vec![0x41, 0x42]);
    }

    #[test]
    fn test_unknown_program_is_rejected() {
        let mut registry = Registry::new();
        let spec = CodingSystemSpec::new(
            "missing",
            CodecSpec::Ccl {
                decoder: "nope".into(),
                encoder: "nope".into(),
                valid_codes: Vec::new(),
            },
        );
        assert!(registry.define_coding_system(spec).is_err());
    }

    #[test]
    fn test_detect_uses_valid_codes() {
        let mut valid = [false; 256];
        valid[0x20..].iter_mut().for_each(|v| *v = true);
        let mut info = DetectionInfo::default();
        detect(&[0x41, 0xC0], &mut info, &valid);
        assert!(info.found.has(CodingCategory::Ccl));
        let mut info = DetectionInfo::default();
        detect(&[0x01], &mut info, &valid);
        assert!(info.rejected.has(CodingCategory::Ccl));
    }
}
