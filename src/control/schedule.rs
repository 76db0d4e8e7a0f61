//! Scheduled-start time matching
//!
//! The schedule target is a time of day at minute granularity. The engine
//! ticks once a second and fires when the current wall clock lands in the
//! target minute; the target is cleared before starting so it cannot re-fire
//! during the remainder of that minute.

use chrono::{NaiveTime, Timelike};

/// Parse a "HH:MM" time-of-day string
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Whether `now` falls within the target minute
pub fn is_due(target: NaiveTime, now: NaiveTime) -> bool {
    target.hour() == now.hour() && target.minute() == now.minute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(
            parse_hhmm("07:30"),
            Some(NaiveTime::from_hms_opt(7, 30, 0).unwrap())
        );
        assert_eq!(parse_hhmm(" 23:59 "), NaiveTime::from_hms_opt(23, 59, 0));
        assert!(parse_hhmm("7:3pm").is_none());
        assert!(parse_hhmm("25:00").is_none());
        assert!(parse_hhmm("").is_none());
    }

    #[test]
    fn test_is_due_matches_any_second_in_target_minute() {
        let target = NaiveTime::from_hms_opt(7, 30, 0).unwrap();
        assert!(is_due(target, NaiveTime::from_hms_opt(7, 30, 0).unwrap()));
        assert!(is_due(target, NaiveTime::from_hms_opt(7, 30, 59).unwrap()));
    }

    #[test]
    fn test_is_due_rejects_other_minutes() {
        let target = NaiveTime::from_hms_opt(7, 30, 0).unwrap();
        assert!(!is_due(target, NaiveTime::from_hms_opt(7, 29, 59).unwrap()));
        assert!(!is_due(target, NaiveTime::from_hms_opt(7, 31, 0).unwrap()));
        assert!(!is_due(target, NaiveTime::from_hms_opt(8, 30, 0).unwrap()));
    }
}
