use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Formats tried in order when parsing a user supplied date.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];

/// Parse a date string such as `2020-06-30`, `August 19, 2022` or `08/19/2022`
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Unix timestamp of midnight UTC on the given date
pub fn to_unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Convert a Unix timestamp to the calendar date seen by the exchange.
/// Falls back to UTC when the timezone name is missing or unknown.
pub fn unix_to_exchange_date(timestamp: i64, timezone: Option<&str>) -> Option<NaiveDate> {
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
    match timezone.and_then(|name| name.parse::<Tz>().ok()) {
        Some(tz) => Some(utc.with_timezone(&tz).date_naive()),
        None => Some(utc.date_naive()),
    }
}

pub fn unix_to_utc_date(timestamp: i64) -> Option<NaiveDate> {
    unix_to_exchange_date(timestamp, None)
}

/// Format a date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Format duration for logging
pub fn format_duration(duration_ms: f64) -> String {
    if duration_ms < 1000.0 {
        format!("{:.1}ms", duration_ms)
    } else if duration_ms < 60000.0 {
        format!("{:.1}s", duration_ms / 1000.0)
    } else {
        let minutes = (duration_ms / 60000.0).floor();
        let seconds = (duration_ms % 60000.0) / 1000.0;
        format!("{}m{:.1}s", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2020-06-30"), Some(ymd(2020, 6, 30)));
        assert_eq!(parse_date("August 19, 2022"), Some(ymd(2022, 8, 19)));
        assert_eq!(parse_date("Aug 19, 2022"), Some(ymd(2022, 8, 19)));
        assert_eq!(parse_date(" 08/19/2022 "), Some(ymd(2022, 8, 19)));
        assert_eq!(parse_date("19.08.2022"), None);
        assert_eq!(parse_date("2022-02-30"), None);
    }

    #[test]
    fn test_to_unix_midnight() {
        assert_eq!(to_unix_midnight(ymd(1970, 1, 2)), 86_400);
        assert_eq!(to_unix_midnight(ymd(2022, 8, 19)), 1_660_867_200);
    }

    #[test]
    fn test_exchange_date_uses_timezone() {
        // 2020-06-30 02:00 UTC is still June 29 in New York
        let ts = 1_593_482_400;
        assert_eq!(unix_to_exchange_date(ts, None), Some(ymd(2020, 6, 30)));
        assert_eq!(
            unix_to_exchange_date(ts, Some("America/New_York")),
            Some(ymd(2020, 6, 29))
        );
        assert_eq!(
            unix_to_exchange_date(ts, Some("Not/AZone")),
            Some(ymd(2020, 6, 30))
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(12.34), "12.3ms");
        assert_eq!(format_duration(1500.0), "1.5s");
        assert_eq!(format_duration(90000.0), "1m30.0s");
    }
}
