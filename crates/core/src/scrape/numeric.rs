//! Locale-formatted cell values: the quotes table uses spaces (including
//! NBSP variants) as thousands separators, a decimal comma, and `-`/`0`/empty
//! as "no value" markers.

fn is_placeholder(trimmed: &str) -> bool {
    matches!(trimmed, "" | "-" | "0")
}

/// Parses a decimal cell. Placeholder tokens mean absence, not zero, and
/// malformed content never aborts the row.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if is_placeholder(trimmed) {
        return None;
    }

    // char::is_whitespace covers U+00A0 and U+202F, both seen in the wild.
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    cleaned.parse::<f64>().ok()
}

/// Parses a volume cell. Placeholders and garbage collapse to 0; volumes are
/// never negative.
pub fn parse_volume(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if is_placeholder(trimmed) {
        return 0;
    }

    let cleaned: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    cleaned.parse::<i64>().ok().filter(|v| *v >= 0).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locale_formatted_decimal() {
        assert_eq!(parse_decimal("1 234,56"), Some(1234.56));
        assert_eq!(parse_decimal("1\u{a0}020,50"), Some(1020.5));
        assert_eq!(parse_decimal("7 500"), Some(7500.0));
        assert_eq!(parse_decimal("-1,25"), Some(-1.25));
    }

    #[test]
    fn placeholders_are_absence_for_decimals() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal(" - "), None);
        assert_eq!(parse_decimal("0"), None);
    }

    #[test]
    fn garbage_is_absence_not_error() {
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal("12,34,56"), None);
    }

    #[test]
    fn parses_volume_with_separators() {
        assert_eq!(parse_volume("12 500"), 12_500);
        assert_eq!(parse_volume("12\u{202f}500"), 12_500);
    }

    #[test]
    fn placeholders_and_garbage_are_zero_for_volume() {
        assert_eq!(parse_volume(""), 0);
        assert_eq!(parse_volume("-"), 0);
        assert_eq!(parse_volume("0"), 0);
        assert_eq!(parse_volume("abc"), 0);
        assert_eq!(parse_volume("-42"), 0);
    }
}
