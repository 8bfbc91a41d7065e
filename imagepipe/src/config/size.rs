//! Cache budgets written as "512MB", "2GB" or a plain byte count.

use thiserror::Error;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Binary units, largest first; `format_size` relies on the order.
const UNITS: [(&str, u64); 3] = [("GB", GIB), ("MB", MIB), ("KB", KIB)];

/// A budget string that is not a whole number of bytes, KB, MB or GB.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{0}' - expected a byte count or a whole number of KB, MB or GB")]
pub struct SizeParseError(String);

fn unit_multiplier(suffix: &str) -> Option<u64> {
    match suffix.to_ascii_uppercase().as_str() {
        "" | "B" => Some(1),
        "K" | "KB" => Some(KIB),
        "M" | "MB" => Some(MIB),
        "G" | "GB" => Some(GIB),
        _ => None,
    }
}

/// Parse a budget into bytes.
///
/// A unit suffix (`K`/`KB`, `M`/`MB`, `G`/`GB`, any case, optionally after a
/// space) scales by powers of 1024. Without one the value is a byte count.
///
/// ```
/// use imagepipe::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("64 mb").unwrap(), 64 << 20);
/// assert_eq!(parse_size("8G").unwrap(), 8 << 30);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let invalid = || SizeParseError(input.to_string());
    let trimmed = input.trim();

    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(digits_end);
    if number.is_empty() {
        return Err(invalid());
    }

    let multiplier = unit_multiplier(suffix.trim_start()).ok_or_else(invalid)?;
    number
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// Render a byte count in the largest unit that divides it exactly.
///
/// The output always parses back to the same value with [`parse_size`].
///
/// ```
/// use imagepipe::config::format_size;
///
/// assert_eq!(format_size(256 << 20), "256MB");
/// assert_eq!(format_size(3 << 30), "3GB");
/// assert_eq!(format_size(1500), "1500");
/// ```
pub fn format_size(bytes: u64) -> String {
    UNITS
        .iter()
        .find(|(_, unit)| bytes >= *unit && bytes % unit == 0)
        .map(|(name, unit)| format!("{}{name}", bytes / unit))
        .unwrap_or_else(|| bytes.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_byte_counts() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1500").unwrap(), 1500);
        assert_eq!(parse_size("1500B").unwrap(), 1500);
    }

    #[test]
    fn test_units_and_spelling() {
        assert_eq!(parse_size("16K").unwrap(), 16 * KIB);
        assert_eq!(parse_size("16kb").unwrap(), 16 * KIB);
        assert_eq!(parse_size(" 256 MB ").unwrap(), 256 * MIB);
        assert_eq!(parse_size("2Gb").unwrap(), 2 * GIB);
    }

    #[test]
    fn test_disk_budgets_beyond_four_gigabytes() {
        assert_eq!(parse_size("40GB").unwrap(), 40 * GIB);
        assert_eq!(format_size(40 * GIB), "40GB");
    }

    #[test]
    fn test_rejects_malformed_budgets() {
        for input in ["", "  ", "MB", "-1GB", "1.5GB", "2TB", "12 potatoes", "1GB extra"] {
            assert!(parse_size(input).is_err(), "{input:?} should not parse");
        }
        assert!(parse_size(&format!("{}GB", u64::MAX)).is_err());
    }

    #[test]
    fn test_format_prefers_largest_exact_unit() {
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(KIB), "1KB");
        assert_eq!(format_size(1536 * KIB), "1536KB");
        assert_eq!(format_size(GIB + MIB), "1025MB");
    }

    #[test]
    fn test_formatted_budgets_parse_back() {
        for bytes in [1, 1000, 64 * KIB, 300 * MIB, 24 * GIB, GIB + 1] {
            assert_eq!(parse_size(&format_size(bytes)).unwrap(), bytes);
        }
    }
}
