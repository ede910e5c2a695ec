//! Quiet-hours gate (§4.10-b): pure wall-clock comparison, no I/O.

use chrono::{DateTime, NaiveTime, Utc};
use tracing::warn;

/// True if `now` falls in `[start, end)` in the campaign's wall-clock zone.
/// `start > end` means the window wraps midnight. `timezone` is an IANA
/// name pulled from the recipient's `timezone` attribute; `None` means
/// server UTC, the spec's default.
pub fn in_quiet_hours(start: &str, end: &str, now: DateTime<Utc>, timezone: Option<&str>) -> bool {
    let (Some(start), Some(end)) = (parse_hhmm(start), parse_hhmm(end)) else {
        warn!(start, end, "invalid quiet hours format, treating as no quiet hours");
        return false;
    };

    let current = match timezone.and_then(resolve_tz) {
        Some(tz) => now.with_timezone(&tz).time(),
        None => now.time(),
    };

    if start > end {
        current >= start || current < end
    } else {
        current >= start && current < end
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

fn resolve_tz(name: &str) -> Option<chrono_tz::Tz> {
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, min, 0).unwrap()
    }

    #[test]
    fn non_wrapping_window() {
        assert!(in_quiet_hours("13:00", "14:00", at(13, 30), None));
        assert!(!in_quiet_hours("13:00", "14:00", at(14, 0), None));
        assert!(!in_quiet_hours("13:00", "14:00", at(12, 59), None));
    }

    #[test]
    fn wrapping_window_spans_midnight() {
        assert!(in_quiet_hours("22:00", "06:00", at(23, 30), None));
        assert!(in_quiet_hours("22:00", "06:00", at(2, 0), None));
        assert!(!in_quiet_hours("22:00", "06:00", at(12, 0), None));
    }

    #[test]
    fn invalid_format_is_never_quiet() {
        assert!(!in_quiet_hours("garbage", "06:00", at(23, 30), None));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert!(in_quiet_hours("22:00", "06:00", at(23, 30), Some("Not/AZone")));
    }

    #[test]
    fn known_timezone_shifts_the_boundary() {
        // 22:00 UTC is 14:00 in America/Los_Angeles (PST, UTC-8) in January.
        assert!(!in_quiet_hours(
            "22:00",
            "06:00",
            at(22, 0),
            Some("America/Los_Angeles")
        ));
    }
}
