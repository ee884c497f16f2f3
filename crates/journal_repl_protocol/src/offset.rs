//! Signed base-16 offset codec.
//!
//! `X-Write-Head` and `X-Commit-Delta` carry signed 64-bit values as hex
//! text: magnitude digits with a leading `-` for negatives, never two's
//! complement. The `writeHead` query parameter is decimal and does not go
//! through this module.

use crate::error::{ProtocolError, ProtocolResult};

/// Formats `value` as lowercase signed hex (`42` → `2a`, `-42` → `-2a`).
pub fn format_hex_offset(value: i64) -> String {
    if value < 0 {
        format!("-{:x}", value.unsigned_abs())
    } else {
        format!("{:x}", value)
    }
}

/// Parses signed hex text produced by [`format_hex_offset`] or a peer.
///
/// An optional `+` or `-` sign is accepted; a `0x` prefix is not.
pub fn parse_hex_offset(value: &str) -> ProtocolResult<i64> {
    let trimmed = value.trim();
    i64::from_str_radix(trimmed, 16).map_err(|e| ProtocolError::InvalidOffset {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_sign_and_magnitude() {
        assert_eq!(format_hex_offset(0), "0");
        assert_eq!(format_hex_offset(42), "2a");
        assert_eq!(format_hex_offset(-42), "-2a");
        assert_eq!(format_hex_offset(i64::MAX), "7fffffffffffffff");
        assert_eq!(format_hex_offset(i64::MIN), "-8000000000000000");
    }

    #[test]
    fn parses_peer_values() {
        assert_eq!(parse_hex_offset("2a").unwrap(), 42);
        assert_eq!(parse_hex_offset("2A").unwrap(), 42);
        assert_eq!(parse_hex_offset(" -2a ").unwrap(), -42);
        assert_eq!(parse_hex_offset("+10").unwrap(), 16);
        assert_eq!(parse_hex_offset("-8000000000000000").unwrap(), i64::MIN);
    }

    #[test]
    fn rejects_malformed_values() {
        for bad in ["", "0x2a", "zz", "2a2a2a2a2a2a2a2a2a", "- 2a"] {
            let err = parse_hex_offset(bad).unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidOffset { .. }), "{bad:?}");
        }
    }

    proptest! {
        #[test]
        fn parse_accepts_every_formatted_offset(value in any::<i64>()) {
            prop_assert_eq!(parse_hex_offset(&format_hex_offset(value)).unwrap(), value);
        }
    }
}
