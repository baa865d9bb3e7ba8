//! Card identifier normalization.
//!
//! A reader reports a card's UID as raw bytes. Everything downstream (storage
//! keys, the web UI, rename requests) works with the canonical text form:
//! two uppercase hex digits per byte, in reader order, with no separators.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Render bytes as uppercase, zero-padded hex with no delimiters.
///
/// The output is always exactly `2 * bytes.len()` characters. An empty slice
/// yields an empty string; use [`CardId::from_bytes`] when the result is going
/// to be used as a key.
///
/// ```
/// assert_eq!(cardlog::identifier::normalize(&[0x04, 0x1A]), "041A");
/// ```
#[must_use]
pub fn normalize(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Decode contiguous hex text into bytes.
///
/// Accepts either case. The input must have an even number of digits.
pub(crate) fn decode_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", text.len()));
    }
    if let Some(bad) = text.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("'{bad}' is not a hex digit"));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

/// A canonical, non-empty card identifier.
///
/// This is the primary key of a scan record. Two reads of the same card always
/// produce equal `CardId`s.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CardId(String);

impl CardId {
    /// Normalize raw reader bytes into an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyIdentifier`] if `bytes` is empty, since an empty
    /// string cannot serve as a storage key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::EmptyIdentifier);
        }
        Ok(Self(normalize(bytes)))
    }

    /// Parse a textual identifier such as `041aff` or `041AFF`.
    ///
    /// Surrounding whitespace is ignored and the result is re-normalized, so
    /// lowercase input addresses the same record as uppercase input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyIdentifier`] for blank input and
    /// [`Error::InvalidIdentifier`] for anything that is not whole hex bytes.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyIdentifier);
        }
        let bytes = decode_hex(trimmed).map_err(|reason| Error::invalid_identifier(trimmed, reason))?;
        Self::from_bytes(&bytes)
    }

    /// The canonical text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of UID bytes this identifier encodes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.0.len() / 2
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for CardId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for CardId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CardId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_and_uppercases() {
        assert_eq!(normalize(&[0x04, 0x1A]), "041A");
        assert_eq!(normalize(&[0x04, 0x1A, 0xFF]), "041AFF");
        assert_eq!(normalize(&[0x00, 0x0a, 0xb0]), "000AB0");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(&[]), "");
    }

    #[test]
    fn test_normalize_length_and_alphabet() {
        let pattern = regex::Regex::new("^[0-9A-F]*$").unwrap();
        for len in 1..=10u8 {
            let bytes: Vec<u8> = (0..len).map(|i| i.wrapping_mul(37).wrapping_add(len)).collect();
            let text = normalize(&bytes);
            assert_eq!(text.len(), 2 * bytes.len());
            assert!(pattern.is_match(&text), "unexpected output {text}");
        }
    }

    #[test]
    fn test_normalize_every_byte_value() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = normalize(&bytes);
        assert_eq!(text.len(), 512);
        assert!(text.starts_with("000102"));
        assert!(text.ends_with("FDFEFF"));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03];
        assert_eq!(normalize(&bytes), normalize(&bytes));
        assert_eq!(
            CardId::from_bytes(&bytes).unwrap(),
            CardId::from_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn test_from_bytes_rejects_empty() {
        assert!(matches!(CardId::from_bytes(&[]), Err(Error::EmptyIdentifier)));
    }

    #[test]
    fn test_from_bytes_seven_byte_uid() {
        let id = CardId::from_bytes(&[0x04, 0x5C, 0x23, 0x92, 0xE1, 0x6C, 0x80]).unwrap();
        assert_eq!(id.as_str(), "045C2392E16C80");
        assert_eq!(id.byte_len(), 7);
    }

    #[test]
    fn test_parse_accepts_lowercase() {
        let id = CardId::parse(" 041aff\n").unwrap();
        assert_eq!(id.as_str(), "041AFF");
        assert_eq!(id, "041AFF".parse::<CardId>().unwrap());
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(matches!(CardId::parse(""), Err(Error::EmptyIdentifier)));
        assert!(matches!(CardId::parse("   "), Err(Error::EmptyIdentifier)));
    }

    #[test]
    fn test_parse_rejects_odd_length() {
        let err = CardId::parse("41AFF").unwrap_err();
        assert!(err.to_string().contains("odd number"));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let err = CardId::parse("04/1AFF").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
        assert!(err.to_string().contains("'/'"));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id = CardId::from_bytes(&[0x04, 0x1A]).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"041A\"");

        let back: CardId = serde_json::from_str("\"041a\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<CardId>("\"\"").is_err());
    }
}
