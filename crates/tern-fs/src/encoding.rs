//! Buffer encodings accepted by `readFile`, `writeFile` and the streams.

use crate::errors::{NodeError, NodeResult};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16le,
    Latin1,
    Ascii,
    Base64,
    Base64Url,
    Hex,
}

impl Encoding {
    pub fn parse(name: &str) -> Option<Self> {
        let enc = match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Self::Utf8,
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Self::Utf16le,
            "latin1" | "binary" => Self::Latin1,
            "ascii" => Self::Ascii,
            "base64" => Self::Base64,
            "base64url" => Self::Base64Url,
            "hex" => Self::Hex,
            _ => return None,
        };
        Some(enc)
    }

    /// Parse an encoding argument, raising `ERR_INVALID_ARG_VALUE` for unknown names.
    pub fn validate(name: &str, arg: &str) -> NodeResult<Self> {
        Self::parse(name).ok_or_else(|| NodeError::invalid_arg_value(arg, name, "is invalid encoding"))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Utf16le => "utf16le",
            Self::Latin1 => "latin1",
            Self::Ascii => "ascii",
            Self::Base64 => "base64",
            Self::Base64Url => "base64url",
            Self::Hex => "hex",
        }
    }

    /// String to bytes.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Latin1 | Self::Ascii => text.chars().map(|c| c as u32 as u8).collect(),
            // Undecodable input yields an empty buffer.
            Self::Base64 | Self::Base64Url => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '=')
                    .map(|c| match c {
                        '-' => '+',
                        '_' => '/',
                        other => other,
                    })
                    .collect();
                base64::engine::general_purpose::STANDARD_NO_PAD
                    .decode(cleaned)
                    .unwrap_or_default()
            }
            Self::Hex => {
                let even = text.len() - text.len() % 2;
                text.get(..even)
                    .and_then(|digits| hex::decode(digits).ok())
                    .unwrap_or_default()
            }
        }
    }

    /// Bytes to string.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            Self::Latin1 => bytes.iter().map(|b| *b as char).collect(),
            Self::Ascii => bytes.iter().map(|b| (*b & 0x7f) as char).collect(),
            Self::Base64 => STANDARD.encode(bytes),
            Self::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
            Self::Hex => hex::encode(bytes),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(Encoding::parse("UTF-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::parse("binary"), Some(Encoding::Latin1));
        assert_eq!(Encoding::parse("ucs2"), Some(Encoding::Utf16le));
        assert_eq!(Encoding::parse("klingon"), None);
        let err = Encoding::validate("klingon", "encoding").expect_err("unknown");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    }

    #[test]
    fn hex_and_base64() {
        assert_eq!(Encoding::Hex.decode(b"\x01\xff"), "01ff");
        assert_eq!(Encoding::Hex.encode("01ff0"), vec![0x01, 0xff]);
        assert_eq!(Encoding::Base64.decode(b"hi!"), "aGkh");
        assert_eq!(Encoding::Base64.encode("aGkh"), b"hi!");
        assert_eq!(Encoding::Base64Url.encode("aGkh"), b"hi!");
    }

    #[test]
    fn utf16le_round_trip_of_text() {
        let bytes = Encoding::Utf16le.encode("hé");
        assert_eq!(bytes, vec![0x68, 0x00, 0xe9, 0x00]);
        assert_eq!(Encoding::Utf16le.decode(&bytes), "hé");
    }
}
