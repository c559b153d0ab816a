//! Text handling for the default character repertoire.
//!
//! Element values of textual representations are stored as raw bytes.
//! The default repertoire (ISO-IR 6) is decoded as ISO 8859-1,
//! its superset.

use std::borrow::Cow;

use encoding::all::ISO_8859_1;
use encoding::{DecoderTrap, EncoderTrap, Encoding, RawDecoder, StringWriter};
use snafu::Snafu;

/// An error type for text encoding issues.
#[derive(Debug, Snafu)]
#[snafu(display("Could not encode text: {}", message))]
pub struct EncodeTextError {
    message: Cow<'static, str>,
}

/// An error type for text decoding issues.
#[derive(Debug, Snafu)]
#[snafu(display("Could not decode text: {}", message))]
pub struct DecodeTextError {
    message: Cow<'static, str>,
}

/// A holder of encoding and decoding mechanisms for text in DICOM content.
pub trait TextCodec {
    /// The defined term of this character set,
    /// as found in Specific Character Set (0008,0005).
    fn name(&self) -> &'static str;

    /// Decode the given byte buffer as a single string,
    /// which may contain backslash separated values.
    fn decode(&self, text: &[u8]) -> Result<String, DecodeTextError>;

    /// Encode a text value into a byte vector.
    fn encode(&self, text: &str) -> Result<Vec<u8>, EncodeTextError>;
}

/// Bytes which the codec cannot map are written out as `\ooo` octal escapes.
fn decode_text_trap(
    _decoder: &mut dyn RawDecoder,
    input: &[u8],
    output: &mut dyn StringWriter,
) -> bool {
    let c = input[0];
    output.write_char('\\');
    for digit in [c >> 6, (c >> 3) & 7, c & 7] {
        output.write_char((digit + b'0') as char);
    }
    true
}

/// Codec for the default character repertoire, extended to ISO 8859-1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefaultCharacterSetCodec;

impl TextCodec for DefaultCharacterSetCodec {
    fn name(&self) -> &'static str {
        "ISO_IR 6"
    }

    fn decode(&self, text: &[u8]) -> Result<String, DecodeTextError> {
        ISO_8859_1
            .decode(text, DecoderTrap::Call(decode_text_trap))
            .map_err(|message| DecodeTextSnafu { message }.build())
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, EncodeTextError> {
        ISO_8859_1
            .encode(text, EncoderTrap::Strict)
            .map_err(|message| EncodeTextSnafu { message }.build())
    }
}

/// Remove trailing padding (spaces and NUL characters)
/// from a textual value.
pub fn trim_padding(text: &str) -> &str {
    text.trim_end_matches(|c| c == ' ' || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_roundtrip() {
        let codec = DefaultCharacterSetCodec;
        let bytes = codec.encode("Müller^José").unwrap();
        assert_eq!(bytes.len(), 11);
        assert_eq!(codec.decode(&bytes).unwrap(), "Müller^José");
        assert!(codec.encode("東京").is_err());
    }

    #[test]
    fn upper_half_decodes_as_latin1() {
        let codec = DefaultCharacterSetCodec;
        assert_eq!(codec.decode(&[b'D', 0xE9, b'j', 0xE0]).unwrap(), "Déjà");
        assert_eq!(codec.encode("\u{ff}").unwrap(), [0xFF]);
    }

    #[test]
    fn trims_both_paddings() {
        assert_eq!(trim_padding("1.2.840\0"), "1.2.840");
        assert_eq!(trim_padding("CT "), "CT");
        assert_eq!(trim_padding(" A B "), " A B");
    }
}
