// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Physical key encoding: `<column:010>_<sequence:010>`.

use crate::QueueError;

/// Zero-padding width for both key components. Sequences up to
/// 10^10 - 1 keep their lexicographic order under this width.
pub(crate) const PAD_WIDTH: usize = 10;

pub(crate) fn encode(column: u64, sequence: u64) -> String {
    format!("{column:010}_{sequence:010}")
}

pub(crate) fn column_prefix(column: u64) -> String {
    format!("{column:010}_")
}

/// Parses a key into `(column, sequence)` by numeric interpretation of its
/// components, accepting both canonical padded keys and legacy unpadded
/// ones.
pub(crate) fn decode(raw: &[u8]) -> Result<(u64, u64), QueueError> {
    let corrupt = || QueueError::CorruptKey(String::from_utf8_lossy(raw).into_owned());

    let text = std::str::from_utf8(raw).map_err(|_| corrupt())?;
    let (column, sequence) = text.split_once('_').ok_or_else(corrupt)?;
    let column = parse_decimal(column).ok_or_else(corrupt)?;
    let sequence = parse_decimal(sequence).ok_or_else(corrupt)?;
    Ok((column, sequence))
}

/// True if the key already uses the canonical fixed-width form.
pub(crate) fn is_canonical(raw: &[u8]) -> bool {
    raw.len() == 2 * PAD_WIDTH + 1
        && raw[PAD_WIDTH] == b'_'
        && raw[..PAD_WIDTH].iter().all(u8::is_ascii_digit)
        && raw[PAD_WIDTH + 1..].iter().all(u8::is_ascii_digit)
}

/// Resolves a column name to its numeric id. `"001"` and `"1"` denote the
/// same column.
pub(crate) fn parse_column(name: &str) -> Result<u64, QueueError> {
    parse_decimal(name).ok_or_else(|| QueueError::InvalidColumn(name.to_string()))
}

fn parse_decimal(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_pads_both_components() {
        assert_eq!(encode(1, 1), "0000000001_0000000001");
        assert_eq!(encode(2, 1), "0000000002_0000000001");
        assert_eq!(encode(42, 9_999_999_999), "0000000042_9999999999");
    }

    #[test]
    fn lexicographic_order_matches_numeric_order() {
        let pairs = [
            (1, 1),
            (1, 2),
            (1, 10),
            (1, 9_999_999_999),
            (2, 1),
            (10, 1),
            (10, 2),
            (100, 5),
        ];
        for a in &pairs {
            for b in &pairs {
                let key_order = encode(a.0, a.1).cmp(&encode(b.0, b.1));
                assert_eq!(
                    key_order,
                    a.cmp(b),
                    "key order diverged for {a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn decode_accepts_canonical_and_legacy_keys() {
        assert_eq!(decode(b"0000000001_0000000003").unwrap(), (1, 3));
        assert_eq!(decode(b"1_3").unwrap(), (1, 3));
        assert_eq!(decode(b"10_2").unwrap(), (10, 2));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"no-separator").is_err());
        assert!(decode(b"_1").is_err());
        assert!(decode(b"1_").is_err());
        assert!(decode(b"a_b").is_err());
        assert!(decode(b"\xff\xfe_1").is_err());
    }

    #[test]
    fn canonical_detection() {
        assert!(is_canonical(b"0000000001_0000000001"));
        assert!(!is_canonical(b"1_1"));
        assert!(!is_canonical(b"0000000001_001"));
        assert!(!is_canonical(b"00000000010000000001"));
    }

    #[test]
    fn column_names_with_leading_zeros_are_equivalent() {
        assert_eq!(parse_column("001").unwrap(), parse_column("1").unwrap());
        assert!(parse_column("orders").is_err());
        assert!(parse_column("").is_err());
        assert!(parse_column("1a").is_err());
    }
}
