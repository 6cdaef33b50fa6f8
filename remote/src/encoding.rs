//! Strict text decoding for captured command output.

use alloc::string::String;
use core::{fmt, str::FromStr};

use encoding_rs::{DecoderResult, Encoding, REPLACEMENT, UTF_8};
use serde::{Deserialize, Deserializer};

use crate::error::{DecodeError, RemoteError};

/// Text encoding used to decode a host's command output.
///
/// Decoding never substitutes replacement characters; invalid input is an error.
/// `ascii` and `latin-1` keep their ISO meaning (the WHATWG tables would map
/// both labels to `windows-1252`); every other label, e.g. `cp1251`, `cp866`,
/// `shift_jis` or `utf-16`, resolves through [`encoding_rs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
    Legacy(&'static Encoding),
}

impl TextEncoding {
    /// Canonical name, as shown in logs and errors.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Ascii => "ascii",
            Self::Latin1 => "latin-1",
            Self::Legacy(encoding) => encoding.name(),
        }
    }

    /// Decodes `bytes`, failing on the first byte the encoding can't represent.
    ///
    /// # Errors
    ///
    /// Returns the offset of the first undecodable byte.
    pub fn decode(self, bytes: &[u8]) -> Result<String, DecodeError> {
        match self {
            Self::Utf8 => core::str::from_utf8(bytes)
                .map(ToOwned::to_owned)
                .map_err(|e| DecodeError {
                    offset: e.valid_up_to(),
                }),
            Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(DecodeError { offset }),
                None => Ok(bytes.iter().copied().map(char::from).collect()),
            },
            Self::Latin1 => Ok(bytes.iter().copied().map(char::from).collect()),
            Self::Legacy(encoding) => decode_without_replacement(encoding, bytes),
        }
    }
}

/// Runs an `encoding_rs` decoder to completion, stopping at the first malformed sequence.
///
/// A leading byte order mark of the same encoding is dropped.
fn decode_without_replacement(
    encoding: &'static Encoding,
    bytes: &[u8],
) -> Result<String, DecodeError> {
    let mut decoder = encoding.new_decoder_with_bom_removal();
    let mut decoded = String::new();
    let mut consumed = 0;
    loop {
        let remaining = bytes.get(consumed..).unwrap_or_default();
        decoded.reserve(
            decoder
                .max_utf8_buffer_length_without_replacement(remaining.len())
                .unwrap_or(remaining.len()),
        );
        let (result, read) =
            decoder.decode_to_string_without_replacement(remaining, &mut decoded, true);
        consumed += read;
        match result {
            DecoderResult::InputEmpty => return Ok(decoded),
            DecoderResult::OutputFull => {}
            DecoderResult::Malformed(malformed, trailing) => {
                return Err(DecodeError {
                    offset: consumed
                        .saturating_sub(usize::from(malformed) + usize::from(trailing)),
                });
            }
        }
    }
}

impl FromStr for TextEncoding {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        match label.as_str() {
            "utf-8" | "utf8" | "utf_8" => return Ok(Self::Utf8),
            "ascii" | "us-ascii" => return Ok(Self::Ascii),
            "latin-1" | "latin1" | "latin_1" | "iso-8859-1" | "iso8859-1" | "l1" => {
                return Ok(Self::Latin1);
            }
            _ => {}
        }
        // codec names often spell the WHATWG label with underscores (`utf_16`)
        Encoding::for_label(label.as_bytes())
            .or_else(|| Encoding::for_label(label.replace('_', "-").as_bytes()))
            .filter(|&encoding| encoding != REPLACEMENT)
            .map(|encoding| {
                if encoding == UTF_8 {
                    Self::Utf8
                } else {
                    Self::Legacy(encoding)
                }
            })
            .ok_or_else(|| RemoteError::UnknownEncoding(s.to_owned()))
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TextEncoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
