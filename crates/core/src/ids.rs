//! Identifier codec between the stored decimal form and the hex form used by
//! the span model.
//!
//! The `id` and `parent_id` tags hold unsigned integers rendered in decimal,
//! while spans carry lowercase hex without zero padding. Trace ids supplied
//! by callers are hex and may be padded to 16 or 32 digits.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipfluxError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(String);

impl TraceId {
    pub fn parse(input: &str) -> Result<Self> {
        if !is_hex_of_len(input, 32) {
            return Err(ZipfluxError::MalformedIdentifier(format!(
                "invalid trace id: {input}"
            )));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SpanId {
    pub fn parse(input: &str) -> Result<Self> {
        if !is_hex_of_len(input, 16) {
            return Err(ZipfluxError::MalformedIdentifier(format!(
                "invalid span id: {input}"
            )));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Renders a stored decimal identifier as unpadded lowercase hex.
pub fn decode(raw: &str) -> Result<String> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ZipfluxError::MalformedIdentifier(format!(
            "expected a decimal identifier, got {raw:?}"
        )));
    }
    let value = raw.parse::<u128>().map_err(|e| {
        ZipfluxError::MalformedIdentifier(format!("identifier {raw:?} out of range: {e}"))
    })?;
    Ok(format!("{value:x}"))
}

/// Storage writes a root span's own id into `parent_id`.
pub fn normalize_parent(parent_hex: &str, own_hex: &str) -> Option<String> {
    if parent_hex == own_hex {
        None
    } else {
        Some(parent_hex.to_string())
    }
}

pub fn trim_leading_zeroes(hex: &str) -> Result<String> {
    if !is_hex_of_len(hex, 32) {
        return Err(ZipfluxError::MalformedIdentifier(format!(
            "expected a hex identifier, got {hex:?}"
        )));
    }
    let value = u128::from_str_radix(hex, 16)
        .map_err(|e| ZipfluxError::MalformedIdentifier(format!("bad hex id {hex:?}: {e}")))?;
    Ok(format!("{value:x}"))
}

/// Prepares a caller-supplied trace id for lookup. Without strict trace ids a
/// 128-bit id is narrowed to its low 64 bits.
pub fn lookup_trace_id(hex: &str, strict: bool) -> Result<String> {
    let hex = hex.trim();
    if !strict && hex.len() == 32 && is_hex_of_len(hex, 32) {
        let low = hex.get(16..).ok_or_else(|| {
            ZipfluxError::MalformedIdentifier(format!("expected a hex identifier, got {hex:?}"))
        })?;
        return trim_leading_zeroes(low);
    }
    trim_leading_zeroes(hex)
}

fn is_hex_of_len(input: &str, max_len: usize) -> bool {
    !input.is_empty() && input.len() <= max_len && input.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        let trace = TraceId::parse("4BF92F3577B34DA6A3CE929D0E0E4736").unwrap();
        let span = SpanId::parse("00f067aa0ba902b7").unwrap();
        assert_eq!(trace.as_str(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span.as_str(), "00f067aa0ba902b7");
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(TraceId::parse("").is_err());
        assert!(TraceId::parse("4bf92f3577b34da6a3ce929d0e0e47360").is_err());
        assert!(SpanId::parse("zzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn decode_renders_unpadded_hex() {
        assert_eq!(decode("255").unwrap(), "ff");
        assert_eq!(decode("0").unwrap(), "0");
        assert_eq!(decode("18446744073709551615").unwrap(), "ffffffffffffffff");
    }

    #[test]
    fn decode_ignores_zero_padding() {
        assert_eq!(decode("007").unwrap(), decode("7").unwrap());
        for raw in ["42", "042", "00000042"] {
            assert_eq!(decode(raw).unwrap(), "2a");
        }
    }

    #[test]
    fn decode_rejects_non_decimal() {
        for raw in ["", "-1", "+7", "12a", " 12", "1.5"] {
            assert!(
                matches!(decode(raw), Err(ZipfluxError::MalformedIdentifier(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn normalize_parent_elides_self_reference() {
        assert_eq!(normalize_parent("2a", "2a"), None);
        assert_eq!(normalize_parent("1f", "2a"), Some("1f".to_string()));
    }

    #[test]
    fn trims_padded_trace_ids() {
        assert_eq!(trim_leading_zeroes("000000000000002a").unwrap(), "2a");
        assert_eq!(trim_leading_zeroes("2A").unwrap(), "2a");
        assert!(trim_leading_zeroes("xyz").is_err());
    }

    #[test]
    fn lookup_narrows_wide_ids_unless_strict() {
        let wide = "463ac35c9f6413ad48485a3953bb6124";
        assert_eq!(lookup_trace_id(wide, false).unwrap(), "48485a3953bb6124");
        assert_eq!(
            lookup_trace_id(wide, true).unwrap(),
            "463ac35c9f6413ad48485a3953bb6124"
        );
        assert_eq!(lookup_trace_id("00000000000000ab", true).unwrap(), "ab");
    }

    #[test]
    fn lookup_rejects_non_ascii_wide_ids() {
        let id = format!("a{}a", "\u{e9}".repeat(15));
        assert_eq!(id.len(), 32);
        for strict in [false, true] {
            assert!(matches!(
                lookup_trace_id(&id, strict),
                Err(ZipfluxError::MalformedIdentifier(_))
            ));
        }
    }
}
