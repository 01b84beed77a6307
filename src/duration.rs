//! Interval-spec parsing and humanized duration formatting.
//!
//! Grounded in `backup-btrfs`'s use of `chrono` for time arithmetic; the INI
//! grammar itself has no corpus precedent and is trivial enough to hand-roll
//! per the original spec's guidance.

const SECONDS_IN_HOUR: u64 = 3_600;
const SECONDS_IN_DAY: u64 = 24 * SECONDS_IN_HOUR;
const SECONDS_IN_WEEK: u64 = 7 * SECONDS_IN_DAY;
// 30.44 days, matching the spec's "week ≈ 30.44d" definition for a month.
const SECONDS_IN_MONTH: u64 = 2_630_016;

/// Parse a suffixed interval string into a number of seconds.
///
/// `<integer><suffix>` with suffixes `h`/`d`/`w`/`M` (hour/day/week/month); a
/// bare integer means hours; the literal `never` means zero. Any string that
/// doesn't parse cleanly yields zero rather than an error — the caller
/// cannot distinguish "explicitly disabled" from "garbage config value", and
/// the spec treats both identically.
pub fn parse_duration(spec: &str) -> u64 {
    let spec = spec.trim();

    if spec.eq_ignore_ascii_case("never") {
        return 0;
    }

    if spec.is_empty() {
        return 0;
    }

    let (number_part, suffix) = match spec.chars().last() {
        Some(c) if c.is_ascii_digit() => (spec, None),
        Some(c) => (&spec[..spec.len() - c.len_utf8()], Some(c)),
        None => return 0,
    };

    let value: u64 = match number_part.parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };

    let multiplier = match suffix {
        None => SECONDS_IN_HOUR,
        Some('h') => SECONDS_IN_HOUR,
        Some('d') => SECONDS_IN_DAY,
        Some('w') => SECONDS_IN_WEEK,
        Some('M') => SECONDS_IN_MONTH,
        Some(_) => return 0,
    };

    value.saturating_mul(multiplier)
}

/// Render a duration in seconds as a short, human-readable string composed
/// of at most the two largest non-zero units (e.g. "1 day 1 hour").
pub fn humanize_duration(total_seconds: u64) -> String {
    if total_seconds == 0 {
        return "0 seconds".to_string();
    }

    let months = total_seconds / SECONDS_IN_MONTH;
    let rem = total_seconds % SECONDS_IN_MONTH;
    let days = rem / SECONDS_IN_DAY;
    let rem = rem % SECONDS_IN_DAY;
    let hours = rem / SECONDS_IN_HOUR;
    let rem = rem % SECONDS_IN_HOUR;
    let minutes = rem / 60;
    let seconds = rem % 60;

    let units: [(u64, &str); 5] = [
        (months, "month"),
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(value, _)| *value > 0)
        .take(2)
        .map(|(value, unit)| pluralize(*value, unit))
        .collect();

    parts.join(" ")
}

fn pluralize(value: u64, unit: &str) -> String {
    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_suffix() {
        assert_eq!(parse_duration("1h"), 3_600);
    }

    #[test]
    fn bare_integer_means_hours() {
        assert_eq!(parse_duration("3"), 10_800);
    }

    #[test]
    fn parses_month_suffix() {
        assert_eq!(parse_duration("1M"), 2_630_016);
    }

    #[test]
    fn invalid_string_yields_zero() {
        assert_eq!(parse_duration("notvalid"), 0);
    }

    #[test]
    fn unknown_suffix_yields_zero() {
        assert_eq!(parse_duration("2u"), 0);
    }

    #[test]
    fn never_literal_yields_zero() {
        assert_eq!(parse_duration("never"), 0);
    }

    #[test]
    fn day_and_week_suffixes() {
        assert_eq!(parse_duration("1d"), SECONDS_IN_DAY);
        assert_eq!(parse_duration("2w"), 2 * SECONDS_IN_WEEK);
    }

    #[test]
    fn parse_duration_is_never_negative() {
        for spec in ["0", "never", "garbage", "", "1Z"] {
            assert!(parse_duration(spec) < u64::MAX);
        }
    }

    #[test]
    fn humanize_single_second() {
        assert_eq!(humanize_duration(1), "1 second");
    }

    #[test]
    fn humanize_minute_and_seconds() {
        assert_eq!(humanize_duration(70), "1 minute 10 seconds");
    }

    #[test]
    fn humanize_hour_and_minute() {
        assert_eq!(humanize_duration(3_660), "1 hour 1 minute");
    }

    #[test]
    fn humanize_day_and_hour() {
        assert_eq!(humanize_duration(SECONDS_IN_DAY + SECONDS_IN_HOUR), "1 day 1 hour");
    }

    #[test]
    fn humanize_month_and_day() {
        assert_eq!(
            humanize_duration(SECONDS_IN_MONTH + SECONDS_IN_DAY),
            "1 month 1 day"
        );
    }
}
