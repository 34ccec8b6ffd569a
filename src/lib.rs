//! # FastCoding - Streaming Coding-System Conversion Engine
//!
//! Converts between external byte encodings and an internal character
//! space that extends Unicode with private charset blocks and raw-byte
//! characters, so any input survives a decode/encode round trip.
//!
//! ## Features
//!
//! - **Chunked conversion** that carries incomplete sequences across calls
//! - **Automatic detection** of the coding system and end-of-line convention
//! - **Stateful codecs** for UTF-8/16, ISO-2022, Shift-JIS, Big5, emacs-mule,
//!   charset tables and byte-code programs
//! - **JSON configuration** for user-defined charsets and coding systems
//!
//! ## Quick Start
//!
//! ```rust
//! use fast_coding::{Registry, Translator, api};
//!
//! let registry = Registry::new();
//!
//! let decoded = api::decode(&registry, "iso-latin-1", b"caf\xE9").unwrap();
//! assert_eq!(decoded.text.to_string_lossy(), "café");
//!
//! let translator = Translator::new(&registry, "latin-1", "utf-16be").unwrap();
//! assert_eq!(translator.convert(b"\xE9"), vec![0x00, 0xE9]);
//! ```

#![warn(missing_docs)]

use std::sync::Arc;

pub mod api;
pub mod buffer;
pub mod charbuf;
pub mod charset;
pub mod codec;
pub mod coding;
pub mod convert;
pub mod detection;
pub mod multibyte;
pub mod registry;
pub mod session;
pub mod translate;

pub use buffer::{Annotation, AnnotationKind, Component, DecodedText, ScratchPool};
pub use charset::{CharsetId, CharsetRegistry, CharsetSpec, Charsets};
pub use coding::{CodecSpec, CodingCategory, CodingSystem, CodingSystemSpec, EolType};
pub use convert::{StreamingDecoder, StreamingEncoder};
pub use detection::{DetectOptions, DetectionResult, EncodingDetector};
pub use registry::{Property, Registry, RegistryConfig};
pub use session::{CodingResult, ConvertOptions, Report};

/// Result type for registry and definition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while defining or looking up coding systems.
///
/// Malformed input never produces an `Error`; conversions recover and say
/// so in their [`Report`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No coding system or alias with this name.
    #[error("unknown coding system `{0}`")]
    UnknownCodingSystem(String),
    /// No charset with this name.
    #[error("unknown charset `{0}`")]
    UnknownCharset(String),
    /// A coding-system definition was rejected.
    #[error("invalid coding system `{name}`: {reason}")]
    InvalidDefinition {
        /// Coding system being defined.
        name: String,
        /// What was wrong.
        reason: String,
    },
    /// A charset definition was rejected.
    #[error("invalid charset `{name}`: {reason}")]
    InvalidCharset {
        /// Charset being defined.
        name: String,
        /// What was wrong.
        reason: String,
    },
    /// A coding definition names a program that was never registered.
    #[error("unknown byte-code program `{0}`")]
    UnknownCclProgram(String),
    /// A name is already taken by another definition.
    #[error("`{0}` is already defined")]
    DuplicateDefinition(String),
    /// Configuration document could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of [`Translator::convert_with_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// Bytes in the target coding system.
    pub bytes: Vec<u8>,
    /// Summary of the decode side.
    pub decode: Report,
    /// Summary of the encode side.
    pub encode: Report,
}

/// Converts bytes from one coding system to another.
#[derive(Debug, Clone)]
pub struct Translator<'r> {
    registry: &'r Registry,
    from: Arc<CodingSystem>,
    to: Arc<CodingSystem>,
}

impl<'r> Translator<'r> {
    /// Create a translator between two registered coding systems
    pub fn new(registry: &'r Registry, from: &str, to: &str) -> Result<Self> {
        Ok(Self {
            registry,
            from: registry.get(from)?,
            to: registry.get(to)?,
        })
    }

    /// Get source coding system
    pub fn from_coding(&self) -> &Arc<CodingSystem> {
        &self.from
    }

    /// Get target coding system
    pub fn to_coding(&self) -> &Arc<CodingSystem> {
        &self.to
    }

    /// Convert a complete input
    pub fn convert(&self, input: &[u8]) -> Vec<u8> {
        self.convert_with_report(input).bytes
    }

    /// Convert a complete input and report on both sides
    pub fn convert_with_report(&self, input: &[u8]) -> Translation {
        let mut stream = StreamingTranslator::from_translator(self);
        let bytes = stream.process_chunk(input, true);
        let (decode, encode) = stream.reports();
        Translation {
            bytes,
            decode,
            encode,
        }
    }
}

/// Chunked converter for large inputs.
///
/// Incomplete sequences at the end of a chunk are carried to the next one,
/// so the concatenated output does not depend on where chunks are split.
#[derive(Debug)]
pub struct StreamingTranslator<'r> {
    decoder: StreamingDecoder<'r>,
    encoder: StreamingEncoder<'r>,
}

impl<'r> StreamingTranslator<'r> {
    /// Create a streaming translator between two registered coding systems
    pub fn new(registry: &'r Registry, from: &str, to: &str) -> Result<Self> {
        Translator::new(registry, from, to).map(|t| Self::from_translator(&t))
    }

    fn from_translator(translator: &Translator<'r>) -> Self {
        let options = ConvertOptions::default();
        Self {
            decoder: StreamingDecoder::new(translator.registry, Arc::clone(&translator.from), options),
            encoder: StreamingEncoder::new(translator.registry, Arc::clone(&translator.to), options),
        }
    }

    /// Process a chunk of data; `last` marks the end of the input
    pub fn process_chunk(&mut self, input: &[u8], last: bool) -> Vec<u8> {
        let text = self.decoder.feed(input, last);
        self.encoder.feed_text(&text, last)
    }

    /// Decode and encode summaries so far
    pub fn reports(&self) -> (Report, Report) {
        (self.decoder.report(), self.encoder.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_to_utf8() {
        let registry = Registry::new();
        let translator = Translator::new(&registry, "iso-latin-1", "utf-8").unwrap();

        let output = translator.convert(b"caf\xE9\n");

        assert_eq!(std::str::from_utf8(&output).unwrap(), "café\n");
    }

    #[test]
    fn test_unknown_coding_system() {
        let registry = Registry::new();
        let err = Translator::new(&registry, "utf-8", "EBCDIC-037").unwrap_err();
        assert!(matches!(err, Error::UnknownCodingSystem(ref name) if name == "EBCDIC-037"));
        assert_eq!(err.to_string(), "unknown coding system `EBCDIC-037`");
    }

    #[test]
    fn test_streaming_translator() {
        let registry = Registry::new();
        let mut stream = StreamingTranslator::new(&registry, "utf-8", "latin-1").unwrap();

        let chunk1 = b"caf\xC3"; // "caf" + half of "é"
        let chunk2 = b"\xA9!";

        let mut combined = stream.process_chunk(chunk1, false);
        combined.extend(stream.process_chunk(chunk2, true));

        assert_eq!(combined, b"caf\xE9!");
        let (decode, encode) = stream.reports();
        assert_eq!(decode.consumed, 6);
        assert_eq!(encode.produced, 5);
    }

    #[test]
    fn test_eol_conversion() {
        let registry = Registry::new();
        let translator = Translator::new(&registry, "utf-8-dos", "utf-8-mac").unwrap();
        assert_eq!(translator.convert(b"a\r\nb\r\n"), b"a\rb\r");
    }

    #[test]
    fn test_report_counts_invalid_bytes() {
        let registry = Registry::new();
        let translator = Translator::new(&registry, "utf-8", "raw-text").unwrap();

        let translation = translator.convert_with_report(b"ok\xFF");

        assert_eq!(translation.bytes, b"ok\xFF");
        assert_eq!(translation.decode.invalid, 1);
        assert_eq!(translation.decode.result, CodingResult::InvalidSource);
        assert_eq!(translation.encode.result, CodingResult::Success);
    }
}
