//! Human-readable sizes, counts and durations

use std::time::Duration;

use crate::error::{ProbeError, Result};

const KIB: f64 = 1024.0;

/// Parse a byte count such as `4096`, `4K`, `3.5MiB` or `16G`
///
/// Units are binary and case-insensitive: B, K/KB/KiB, M/MB/MiB, G/GB/GiB,
/// T/TB/TiB. A bare number is a byte count.
pub fn parse_size(input: &str) -> Result<u64> {
    let text = input.trim();
    let invalid = |reason: &str| ProbeError::Config(format!("invalid size '{}': {}", input, reason));

    if text.is_empty() {
        return Err(invalid("empty"));
    }
    if let Ok(bytes) = text.parse::<u64>() {
        if bytes > i64::MAX as u64 {
            return Err(too_large(input));
        }
        return Ok(bytes);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    if number.is_empty() {
        return Err(invalid("missing number"));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| invalid("not a number"))?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => KIB.powi(2),
        "G" | "GB" | "GIB" => KIB.powi(3),
        "T" | "TB" | "TIB" => KIB.powi(4),
        _ => return Err(invalid("unknown unit (expected B, K, M, G or T)")),
    };

    check_size_limit(input, (value * multiplier).floor())
}

fn check_size_limit(input: &str, bytes: f64) -> Result<u64> {
    // i64::MAX rounds up to 2^63 as f64
    if bytes >= i64::MAX as f64 {
        return Err(too_large(input));
    }
    Ok(bytes as u64)
}

fn too_large(input: &str) -> ProbeError {
    ProbeError::Config(format!(
        "size '{}' exceeds the maximum of {} bytes",
        input,
        i64::MAX
    ))
}

/// Parse a count limit, where `-1` means unbounded
pub fn parse_count_max(input: &str) -> Result<u64> {
    let text = input.trim();
    if text == "-1" {
        return Ok(u64::MAX);
    }
    text.parse::<u64>().map_err(|_| {
        ProbeError::Config(format!(
            "invalid count '{}': expected a non-negative integer or -1 for no limit",
            input
        ))
    })
}

/// Format a byte count with binary unit abbreviations, e.g. `4K` or `3.5M`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G", "T", "P", "E"];

    if bytes == 0 {
        return "0B".to_string();
    }

    let mut value = bytes as f64;
    let mut exp = 0;
    while value >= KIB && exp < UNITS.len() - 1 {
        value /= KIB;
        exp += 1;
    }

    let formatted = format!("{:.1}", value);
    let formatted = formatted.strip_suffix(".0").unwrap_or(&formatted);
    format!("{}{}", formatted, UNITS[exp])
}

/// Format a duration as `1h 2m 3s`, `2m 3s`, `3s` or `250ms`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if seconds > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_suffixed_sizes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("12B").unwrap(), 12);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("4kb").unwrap(), 4096);
        assert_eq!(parse_size("4KiB").unwrap(), 4096);
        assert_eq!(parse_size("3.5M").unwrap(), 3_670_016);
        assert_eq!(parse_size("1 GiB").unwrap(), 1 << 30);
        assert_eq!(parse_size("2T").unwrap(), 2 << 40);
    }

    #[test]
    fn test_parse_size_errors() {
        for bad in ["", "K", "-5", "4X", "1.2.3M", "abc"] {
            assert!(
                matches!(parse_size(bad), Err(ProbeError::Config(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(parse_size("9223372036854775808").is_err());
        assert!(parse_size("9000000T").is_err());
    }

    #[test]
    fn test_parse_count_max() {
        assert_eq!(parse_count_max("-1").unwrap(), u64::MAX);
        assert_eq!(parse_count_max("16384").unwrap(), 16384);
        assert!(parse_count_max("-2").is_err());
        assert!(parse_count_max("lots").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(1000), "1000B");
        assert_eq!(format_bytes(4096), "4K");
        assert_eq!(format_bytes(1536), "1.5K");
        assert_eq!(format_bytes(3_670_016), "3.5M");
        assert_eq!(format_bytes(16 << 30), "16G");
        assert_eq!(format_bytes(u64::MAX), "16E");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(3)), "3s");
        assert_eq!(format_duration(Duration::from_secs(123)), "2m 3s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }
}
